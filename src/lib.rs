//! GitHub App bridge: repository operations exposed as MCP tools and as a
//! small HTTP API, plus a read-only Figma passthrough.
//!
//! Both transports authenticate as a GitHub App and resolve an
//! installation-scoped client per request, defaulting to the first
//! installation when the caller does not name one.

pub mod config;
pub mod error;
pub mod figma;
pub mod http;
pub mod installation;
pub mod operations;
pub mod server;
pub mod validate;
