//! # CMS MCP protocol types
//!
//! Handshake, tool and notification payloads, plus [`McpError`]: the domain error taxonomy and
//! its mapping onto JSON-RPC error objects.

pub mod initialize;
pub mod notifications;
pub mod tools;
pub mod version;

pub use initialize::{
    ClientCapabilities, Implementation, InitializeRequest, InitializeResult, ServerCapabilities,
};
pub use notifications::{LoggingLevel, LoggingMessageNotification, ProgressNotification};
pub use tools::{CallToolRequest, CallToolResult, ContentBlock, ListToolsResult, Tool};
pub use version::McpVersion;

use cms_mcp_json_rpc_server::{JsonRpcErrorObject, ToJsonRpcError};
use serde_json::json;

/// Method names handled by the engine itself
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Server-range codes (-32000 to -32099)
pub mod error_codes {
    pub const SESSION_NOT_FOUND: i64 = -32001;
    pub const SESSION_NOT_INITIALIZED: i64 = -32002;
    pub const NOT_FOUND: i64 = -32004;
    pub const TOOL_EXECUTION: i64 = -32010;
    pub const VALIDATION: i64 = -32020;
    pub const VERSION_MISMATCH: i64 = -32022;
    pub const CONFIGURATION: i64 = -32030;
}

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Unsupported protocol version {requested}; supported: {supported}")]
    VersionMismatch { requested: String, supported: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session not initialized: {0}")]
    SessionNotInitialized(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Decode/validation failure of request params; the string is the assembled violation list
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },

    /// Domain rule rejected the operation (slug taken, draft already published)
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// The tool ran but could not complete (save failure)
    #[error("Tool execution failed: {0}")]
    ToolExecutionError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Anything unexpected. The cause is logged server-side and never sent to the client.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl McpError {
    pub fn not_found(kind: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            kind: kind.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    pub fn tool_execution(message: impl Into<String>) -> Self {
        Self::ToolExecutionError(message.into())
    }

    pub fn internal(cause: impl Into<String>) -> Self {
        Self::Internal(cause.into())
    }

    /// Failures a tool reports to the model inside a `tools/call` result rather than as a
    /// protocol error
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            McpError::NotFound { .. } | McpError::ValidationError(_) | McpError::ToolExecutionError(_)
        )
    }

    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        use error_codes::*;

        match self {
            McpError::InvalidParameters(details) => JsonRpcErrorObject::invalid_params(details),
            McpError::ToolNotFound(name) => JsonRpcErrorObject::method_not_found(name),
            McpError::VersionMismatch { requested, supported } => JsonRpcErrorObject::server_error(
                VERSION_MISMATCH,
                &self.to_string(),
                Some(json!({ "requested": requested, "supported": supported })),
            ),
            McpError::SessionNotFound(_) => {
                JsonRpcErrorObject::server_error(SESSION_NOT_FOUND, "Session not found", None)
            }
            McpError::SessionNotInitialized(_) => JsonRpcErrorObject::server_error(
                SESSION_NOT_INITIALIZED,
                "Session not initialized",
                None,
            ),
            McpError::NotFound { kind, id } => JsonRpcErrorObject::server_error(
                NOT_FOUND,
                &self.to_string(),
                Some(json!({ "kind": kind, "id": id })),
            ),
            McpError::ValidationError(_) => {
                JsonRpcErrorObject::server_error(VALIDATION, &self.to_string(), None)
            }
            McpError::ToolExecutionError(_) => {
                JsonRpcErrorObject::server_error(TOOL_EXECUTION, &self.to_string(), None)
            }
            McpError::ConfigurationError(_) => {
                JsonRpcErrorObject::server_error(CONFIGURATION, &self.to_string(), None)
            }
            McpError::Internal(_) | McpError::SerializationError(_) => {
                JsonRpcErrorObject::internal_error(None)
            }
        }
    }
}

impl ToJsonRpcError for McpError {
    fn to_error_object(&self) -> JsonRpcErrorObject {
        McpError::to_error_object(self)
    }
}
