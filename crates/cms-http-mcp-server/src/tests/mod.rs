//! Transport tests that drive the router with in-memory requests

mod support;
