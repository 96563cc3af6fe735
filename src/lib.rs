pub mod ai_action;
pub mod classification;
pub mod concurrency;
pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod job_store;
pub mod json_extract;
pub mod middleware;
pub mod openai;
pub mod parallel;
pub mod prompts;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod tokens;
pub mod validation;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use gateway::{AiGateway, ModelCaller};
pub use rate_limiter::{AdmissionMode, RpmLimiter};
pub use server::{build_state, create_app};
