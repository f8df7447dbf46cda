use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::{
    dispatch::{DispatchReply, IncomingMessage, IncomingPayload, parse_payload},
    error::{JsonRpcError, JsonRpcErrorObject, JsonRpcTransportError},
    notification::JsonRpcNotification,
    request::{JsonRpcRequest, RequestParams},
    response::{JsonRpcMessage, ResponseResult},
};

/// Where server-initiated notifications for a session go
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_notification(
        &self,
        session_id: &str,
        notification: JsonRpcNotification,
    ) -> Result<(), JsonRpcTransportError>;
}

/// Per-call view of the session a message arrived on
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub metadata: HashMap<String, Value>,
    pub notifier: Option<Arc<dyn NotificationSink>>,
    /// Unix milliseconds at which the payload was received
    pub timestamp: u64,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            session_id: session_id.into(),
            metadata: HashMap::new(),
            notifier: None,
            timestamp,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Push a notification onto this session's outbound stream
    pub async fn notify(
        &self,
        notification: JsonRpcNotification,
    ) -> Result<(), JsonRpcTransportError> {
        match &self.notifier {
            Some(notifier) => {
                notifier
                    .send_notification(&self.session_id, notification)
                    .await
            }
            None => Err(JsonRpcTransportError::SessionUnavailable(format!(
                "no notification channel for session {}",
                self.session_id
            ))),
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("session_id", &self.session_id)
            .field("metadata", &self.metadata)
            .field("has_notifier", &self.notifier.is_some())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// Trait for handling JSON-RPC method calls
#[async_trait]
pub trait JsonRpcHandler: Send + Sync {
    /// Domain error; the dispatcher converts it through [`ToJsonRpcError`]
    type Error: std::error::Error + Send + Sync + 'static;

    async fn handle(
        &self,
        method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> Result<Value, Self::Error>;

    /// Default implementation ignores notifications
    async fn handle_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
        session_context: Option<SessionContext>,
    ) -> Result<(), Self::Error> {
        let _ = (method, params, session_context);
        Ok(())
    }

    fn supported_methods(&self) -> Vec<String> {
        vec![]
    }
}

/// Trait for errors that can be converted to JSON-RPC error objects
pub trait ToJsonRpcError: std::error::Error + Send + Sync + 'static {
    fn to_error_object(&self) -> JsonRpcErrorObject;
}

/// Runs before every handler; an error short-circuits the call.
///
/// Applies to notifications too, but a rejected notification is only logged.
#[async_trait]
pub trait DispatchMiddleware: Send + Sync {
    type Error: ToJsonRpcError;

    async fn before_dispatch(
        &self,
        method: &str,
        session_context: &SessionContext,
    ) -> Result<(), Self::Error>;
}

/// Method table plus middleware chain
pub struct JsonRpcDispatcher<E>
where
    E: ToJsonRpcError,
{
    handlers: HashMap<String, Arc<dyn JsonRpcHandler<Error = E>>>,
    default_handler: Option<Arc<dyn JsonRpcHandler<Error = E>>>,
    middleware: Vec<Arc<dyn DispatchMiddleware<Error = E>>>,
}

impl<E> Default for JsonRpcDispatcher<E>
where
    E: ToJsonRpcError,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> JsonRpcDispatcher<E>
where
    E: ToJsonRpcError,
{
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: None,
            middleware: Vec::new(),
        }
    }

    pub fn register_method<H>(&mut self, method: impl Into<String>, handler: H)
    where
        H: JsonRpcHandler<Error = E> + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
    }

    /// Register one shared handler under each of its `supported_methods`
    pub fn register_shared(&mut self, handler: Arc<dyn JsonRpcHandler<Error = E>>) {
        for method in handler.supported_methods() {
            self.handlers.insert(method, handler.clone());
        }
    }

    pub fn set_default_handler<H>(&mut self, handler: H)
    where
        H: JsonRpcHandler<Error = E> + 'static,
    {
        self.default_handler = Some(Arc::new(handler));
    }

    pub fn add_middleware(&mut self, middleware: Arc<dyn DispatchMiddleware<Error = E>>) {
        self.middleware.push(middleware);
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn registered_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.handlers.keys().cloned().collect();
        methods.sort();
        methods
    }

    fn handler_for(&self, method: &str) -> Option<&Arc<dyn JsonRpcHandler<Error = E>>> {
        self.handlers.get(method).or(self.default_handler.as_ref())
    }

    async fn run_middleware(&self, method: &str, context: &SessionContext) -> Result<(), E> {
        for middleware in &self.middleware {
            middleware.before_dispatch(method, context).await?;
        }
        Ok(())
    }

    /// Parse and dispatch a raw body
    pub async fn handle_raw(&self, body: &[u8], session_context: SessionContext) -> DispatchReply {
        match parse_payload(body) {
            Ok(payload) => self.handle_payload(payload, session_context).await,
            Err(error) => error.into(),
        }
    }

    /// Dispatch a parsed payload. Batch members run concurrently; replies keep request order.
    pub async fn handle_payload(
        &self,
        payload: IncomingPayload,
        session_context: SessionContext,
    ) -> DispatchReply {
        match payload {
            IncomingPayload::Single(message) => {
                match self.handle_message(message, session_context).await {
                    Some(reply) => DispatchReply::Single(reply),
                    None => DispatchReply::Empty,
                }
            }
            IncomingPayload::Batch(messages) => {
                let replies: Vec<JsonRpcMessage> = join_all(
                    messages
                        .into_iter()
                        .map(|message| self.handle_message(message, session_context.clone())),
                )
                .await
                .into_iter()
                .flatten()
                .collect();

                if replies.is_empty() {
                    DispatchReply::Empty
                } else {
                    DispatchReply::Batch(replies)
                }
            }
        }
    }

    pub async fn handle_message(
        &self,
        message: IncomingMessage,
        session_context: SessionContext,
    ) -> Option<JsonRpcMessage> {
        match message {
            IncomingMessage::Request(request) => {
                Some(self.handle_request_with_context(request, session_context).await)
            }
            IncomingMessage::Notification(notification) => {
                self.handle_notification_with_context(notification, session_context)
                    .await;
                None
            }
            IncomingMessage::Response(value) => {
                debug!(
                    "Ignoring client response on session {}: id={}",
                    session_context.session_id, value["id"]
                );
                None
            }
            IncomingMessage::Invalid { id, error } => {
                Some(JsonRpcMessage::error(JsonRpcError::new(id, error)))
            }
            IncomingMessage::Discarded { method, reason } => {
                warn!(
                    "Dropping malformed notification '{}' on session {}: {}",
                    method, session_context.session_id, reason
                );
                None
            }
        }
    }

    /// Always produces exactly one reply carrying the request id
    pub async fn handle_request_with_context(
        &self,
        request: JsonRpcRequest,
        session_context: SessionContext,
    ) -> JsonRpcMessage {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        if let Err(rejection) = self.run_middleware(&method, &session_context).await {
            debug!("Request '{}' rejected before dispatch: {}", method, rejection);
            return JsonRpcMessage::error(JsonRpcError::new(
                Some(id),
                rejection.to_error_object(),
            ));
        }

        let Some(handler) = self.handler_for(&method) else {
            return JsonRpcMessage::error(JsonRpcError::method_not_found(id, &method));
        };

        let outcome = AssertUnwindSafe(handler.handle(&method, params, Some(session_context)))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(result)) => JsonRpcMessage::success(id, ResponseResult::from(result)),
            Ok(Err(domain_error)) => {
                let error_object = domain_error.to_error_object();
                if error_object.code == crate::error_codes::INTERNAL_ERROR {
                    error!("Request '{}' (id {}) failed: {}", method, id, domain_error);
                } else {
                    debug!("Request '{}' (id {}) failed: {}", method, id, domain_error);
                }
                JsonRpcMessage::error(JsonRpcError::new(Some(id), error_object))
            }
            Err(panic) => {
                error!(
                    "Handler for '{}' panicked (request id {}): {}",
                    method,
                    id,
                    panic_message(panic.as_ref())
                );
                JsonRpcMessage::error(JsonRpcError::internal_error(Some(id), None))
            }
        }
    }

    /// Never produces a reply; failures are logged
    pub async fn handle_notification_with_context(
        &self,
        notification: JsonRpcNotification,
        session_context: SessionContext,
    ) {
        let JsonRpcNotification { method, params, .. } = notification;
        let session_id = session_context.session_id.clone();

        if let Err(rejection) = self.run_middleware(&method, &session_context).await {
            debug!(
                "Notification '{}' on session {} rejected: {}",
                method, session_id, rejection
            );
            return;
        }

        let Some(handler) = self.handler_for(&method) else {
            debug!("No handler for notification '{}'", method);
            return;
        };

        let outcome = AssertUnwindSafe(handler.handle_notification(
            &method,
            params,
            Some(session_context),
        ))
        .catch_unwind()
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Notification '{}' on session {} failed: {}",
                method, session_id, e
            ),
            Err(panic) => error!(
                "Notification handler for '{}' panicked: {}",
                method,
                panic_message(panic.as_ref())
            ),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
