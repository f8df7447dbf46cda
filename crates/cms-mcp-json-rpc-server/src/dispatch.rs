//! Payload classification.
//!
//! A raw body is either one JSON-RPC object or a non-empty array of them. Each element is
//! classified independently so that one malformed member of a batch does not poison the rest.

use serde_json::{Map, Value, json};

use crate::error::{JsonRpcError, JsonRpcErrorObject};
use crate::notification::JsonRpcNotification;
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::JsonRpcMessage;
use crate::types::RequestId;

/// One classified element of an inbound payload
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    /// A client reply to a server-initiated request. Accepted and ignored.
    Response(Value),
    /// Structurally invalid; answered with `-32600`
    Invalid {
        id: Option<RequestId>,
        error: JsonRpcErrorObject,
    },
    /// A malformed notification. Notifications are never answered, so it is only logged.
    Discarded { method: String, reason: String },
}

impl IncomingMessage {
    pub fn classify(value: Value) -> Self {
        let Value::Object(mut object) = value else {
            return Self::invalid(None, "request must be a JSON object");
        };

        let id_member = object.remove("id");
        let id = id_member.as_ref().and_then(RequestId::from_value);

        let notification_method = match (&id_member, object.get("method")) {
            (None, Some(Value::String(method))) => Some(method.clone()),
            _ => None,
        };
        let reject = |reason: &str| match &notification_method {
            Some(method) => IncomingMessage::Discarded {
                method: method.clone(),
                reason: reason.to_string(),
            },
            None => Self::invalid(id.clone(), reason),
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(crate::JSONRPC_VERSION) {
            return reject("jsonrpc must be \"2.0\"");
        }

        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            None if id.is_some() && is_response_shape(&object) => {
                if let Some(id_member) = id_member {
                    object.insert("id".to_string(), id_member);
                }
                return IncomingMessage::Response(Value::Object(object));
            }
            _ => return Self::invalid(id, "method must be a string"),
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => None,
            Some(value) => match RequestParams::from_value(value) {
                Some(params) => Some(params),
                None => return reject("params must be an object or array"),
            },
        };

        match (id_member, id) {
            (None, _) => IncomingMessage::Notification(JsonRpcNotification::new(method, params)),
            (Some(_), Some(id)) => IncomingMessage::Request(JsonRpcRequest::new(id, method, params)),
            (Some(_), None) => Self::invalid(None, "id must be a string or integer"),
        }
    }

    fn invalid(id: Option<RequestId>, reason: &str) -> Self {
        IncomingMessage::Invalid {
            id,
            error: JsonRpcErrorObject::invalid_request(Some(json!({ "reason": reason }))),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            IncomingMessage::Request(request) => Some(&request.method),
            IncomingMessage::Notification(notification) => Some(&notification.method),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            IncomingMessage::Request(request) => Some(&request.id),
            IncomingMessage::Invalid { id, .. } => id.as_ref(),
            _ => None,
        }
    }

    /// Whether this element will produce a reply
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            IncomingMessage::Request(_) | IncomingMessage::Invalid { .. }
        )
    }
}

fn is_response_shape(object: &Map<String, Value>) -> bool {
    object.contains_key("result") ^ object.contains_key("error")
}

/// A parsed inbound body
#[derive(Debug, Clone)]
pub enum IncomingPayload {
    Single(IncomingMessage),
    Batch(Vec<IncomingMessage>),
}

impl IncomingPayload {
    pub fn messages(&self) -> impl Iterator<Item = &IncomingMessage> {
        let slice: &[IncomingMessage] = match self {
            IncomingPayload::Single(message) => std::slice::from_ref(message),
            IncomingPayload::Batch(messages) => messages,
        };
        slice.iter()
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, IncomingPayload::Batch(_))
    }

    pub fn contains_method(&self, method: &str) -> bool {
        self.messages().any(|m| m.method() == Some(method))
    }

    /// True when every element is a notification or client response
    pub fn is_fire_and_forget(&self) -> bool {
        !self.messages().any(IncomingMessage::expects_reply)
    }

    /// The first request id, used to key transport-level error bodies
    pub fn first_request_id(&self) -> Option<RequestId> {
        self.messages().find_map(|m| m.request_id().cloned())
    }
}

/// Parse a raw body. The error variant is the reply to send: a parse error for malformed JSON
/// or an invalid request for an empty batch or a scalar body.
pub fn parse_payload(body: &[u8]) -> Result<IncomingPayload, JsonRpcError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejecting malformed JSON-RPC payload: {}", e);
        JsonRpcError::parse_error()
    })?;

    match value {
        Value::Array(items) if items.is_empty() => Err(JsonRpcError::invalid_request(None)),
        Value::Array(items) => Ok(IncomingPayload::Batch(
            items.into_iter().map(IncomingMessage::classify).collect(),
        )),
        Value::Object(_) => Ok(IncomingPayload::Single(IncomingMessage::classify(value))),
        _ => Err(JsonRpcError::invalid_request(None)),
    }
}

/// What the transport should send back for one payload
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchReply {
    /// Notifications only
    Empty,
    Single(JsonRpcMessage),
    /// Replies in the order their requests appeared
    Batch(Vec<JsonRpcMessage>),
}

impl DispatchReply {
    pub fn is_empty(&self) -> bool {
        match self {
            DispatchReply::Empty => true,
            DispatchReply::Single(_) => false,
            DispatchReply::Batch(messages) => messages.is_empty(),
        }
    }

    pub fn into_messages(self) -> Vec<JsonRpcMessage> {
        match self {
            DispatchReply::Empty => Vec::new(),
            DispatchReply::Single(message) => vec![message],
            DispatchReply::Batch(messages) => messages,
        }
    }

    /// The HTTP body for a direct reply, or `None` when nothing is owed
    pub fn to_value(&self) -> Option<Value> {
        match self {
            DispatchReply::Empty => None,
            DispatchReply::Single(message) => Some(message.to_value()),
            DispatchReply::Batch(messages) if messages.is_empty() => None,
            DispatchReply::Batch(messages) => Some(Value::Array(
                messages.iter().map(JsonRpcMessage::to_value).collect(),
            )),
        }
    }
}

impl From<JsonRpcError> for DispatchReply {
    fn from(error: JsonRpcError) -> Self {
        DispatchReply::Single(JsonRpcMessage::Error(error))
    }
}
