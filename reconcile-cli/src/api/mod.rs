//! Remote API plumbing
//!
//! HTTP transport, rate-limit bookkeeping and the write operations used by the
//! generic API target.

pub mod client;
pub mod operations;
pub mod rate_limit;

pub use client::{CallConfig, HttpCaller, HttpResponse, ReqwestCaller, RequestBody};
pub use operations::{Operation, OperationResult};
pub use rate_limit::RateLimitState;
