pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod server;
pub mod sse;


pub use error::ApiError;
pub use rate_limit::RateLimiter;
pub use server::{build_router, run, serve};
