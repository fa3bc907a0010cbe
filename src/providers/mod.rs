//! # 上游服务适配模块
//!
//! Gemini `generateContent` 调用、错误分类与请求/响应类型

pub mod classifier;
pub mod gemini;
pub mod traits;
pub mod types;

pub use classifier::{CLASSIFICATION_RULES, ErrorClass, ErrorClassifier};
pub use gemini::{GeminiClient, GeminiUpstream, build_request_body};
pub use traits::UpstreamCaller;
pub use types::{
    FailureKind, GenerationOutcome, GenerationRequest, GenerationResponse, UpstreamFailure,
};
