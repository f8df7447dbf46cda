//! Protocol revisions this server can speak.
//!
//! - **2024-11-05**: HTTP+SSE (two-endpoint) transport
//! - **2025-03-26**: Streamable HTTP
//! - **2025-06-18**: `MCP-Protocol-Version` header on every post-handshake request

use serde::{Deserialize, Serialize};

use crate::{McpError, McpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum McpVersion {
    #[serde(rename = "2024-11-05")]
    V2024_11_05,
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl McpVersion {
    pub const LATEST: McpVersion = McpVersion::V2025_06_18;

    /// Oldest first
    pub const SUPPORTED: [McpVersion; 3] = [
        McpVersion::V2024_11_05,
        McpVersion::V2025_03_26,
        McpVersion::V2025_06_18,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::SUPPORTED.into_iter().find(|v| v.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            McpVersion::V2024_11_05 => "2024-11-05",
            McpVersion::V2025_03_26 => "2025-03-26",
            McpVersion::V2025_06_18 => "2025-06-18",
        }
    }

    /// Pick the revision to answer an `initialize` with.
    ///
    /// A supported revision is echoed back. A well-formed revision newer than anything we know
    /// is answered with [`McpVersion::LATEST`] so the client can decide whether to continue.
    /// Anything else is a mismatch.
    pub fn negotiate(requested: &str) -> McpResult<McpVersion> {
        if let Some(version) = Self::parse(requested) {
            return Ok(version);
        }
        if is_revision_date(requested) && requested > Self::LATEST.as_str() {
            return Ok(Self::LATEST);
        }
        Err(McpError::VersionMismatch {
            requested: requested.to_string(),
            supported: Self::SUPPORTED.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", "),
        })
    }
}

/// `YYYY-MM-DD`
fn is_revision_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

impl std::fmt::Display for McpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Default for McpVersion {
    fn default() -> Self {
        Self::LATEST
    }
}
