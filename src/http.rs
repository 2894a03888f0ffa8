//! HTTP transport for the remote identity service.

pub mod client;
pub mod endpoint;
