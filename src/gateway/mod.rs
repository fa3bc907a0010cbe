//! # 网关模块

pub mod failover;

pub use failover::{CONNECTION_TEST_PROMPT, FailoverGateway};
