//! Service wiring for the price pipeline.

pub mod app;
pub mod config;
pub mod error;
pub mod http;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
