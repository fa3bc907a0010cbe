//! # HTTP 服务模块

pub mod handlers;
pub mod response;
pub mod routes;
pub mod server;

pub use server::{AppState, GatewayServer};
