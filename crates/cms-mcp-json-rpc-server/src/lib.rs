//! # JSON-RPC 2.0 for the CMS MCP engine
//!
//! Envelope types, payload classification (single and batch) and an async method dispatcher.
//! Nothing in this crate knows about HTTP or sessions beyond the opaque [`SessionContext`]
//! handed to handlers.
//!
//! ## Features
//! - Request, response, error and notification envelopes with `"jsonrpc": "2.0"`
//! - Batch payloads with order-preserving replies
//! - Notifications never produce a reply, even on error
//! - `async` feature: [`JsonRpcDispatcher`] with handler and middleware traits

pub mod dispatch;
pub mod error;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

#[cfg(feature = "async")]
pub mod r#async;

pub use dispatch::{DispatchReply, IncomingMessage, IncomingPayload, parse_payload};
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject, JsonRpcTransportError};
pub use notification::JsonRpcNotification;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::{JsonRpcMessage, JsonRpcResponse, ResponseResult};
pub use types::{JsonRpcVersion, RequestId};

#[cfg(feature = "async")]
pub use r#async::{
    DispatchMiddleware, JsonRpcDispatcher, JsonRpcHandler, NotificationSink, SessionContext,
    ToJsonRpcError,
};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
