//! HTTP API: routing, the authorization gate and request/response mapping.

pub mod app;
pub mod authz;
pub mod config;
pub mod middleware;
