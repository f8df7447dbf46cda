//! Server-level tests: handshake gate, tool surface and notification ordering

mod support;
