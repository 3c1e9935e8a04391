pub mod config;
pub mod models;
pub mod seed;
pub mod service;
pub mod telemetry;

pub use config::{LogFormat, ServerConfig};
pub use service::{AppState, build_router, create_app};
