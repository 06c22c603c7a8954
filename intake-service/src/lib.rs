pub mod config;
pub mod extractor;
pub mod literature;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod reply;
pub mod service;
pub mod telemetry;

pub use config::ServiceConfig;
pub use models::*;
pub use service::{AppState, build_router, create_app};
