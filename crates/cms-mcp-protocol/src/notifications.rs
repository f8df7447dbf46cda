//! Notification method names and server-to-client notification payloads.

use cms_mcp_json_rpc_server::JsonRpcNotification;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod methods {
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const CANCELLED: &str = "notifications/cancelled";
    pub const PROGRESS: &str = "notifications/progress";
    pub const MESSAGE: &str = "notifications/message";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// `notifications/progress`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    pub progress_token: Value,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressNotification {
    pub fn new(progress_token: impl Into<Value>, progress: f64) -> Self {
        Self {
            progress_token: progress_token.into(),
            progress,
            total: None,
            message: None,
        }
    }

    pub fn with_total(mut self, total: f64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// `notifications/message`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageNotification {
    pub level: LoggingLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

impl LoggingMessageNotification {
    pub fn new(level: LoggingLevel, data: impl Into<Value>) -> Self {
        Self {
            level,
            logger: None,
            data: data.into(),
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}

impl From<ProgressNotification> for JsonRpcNotification {
    fn from(notification: ProgressNotification) -> Self {
        JsonRpcNotification::with_value(
            methods::PROGRESS,
            serde_json::to_value(notification).unwrap_or(Value::Null),
        )
    }
}

impl From<LoggingMessageNotification> for JsonRpcNotification {
    fn from(notification: LoggingMessageNotification) -> Self {
        JsonRpcNotification::with_value(
            methods::MESSAGE,
            serde_json::to_value(notification).unwrap_or(Value::Null),
        )
    }
}
