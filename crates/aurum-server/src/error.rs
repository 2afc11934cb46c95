//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(#[from] aurum_provider::ProviderError),

    #[error("Benchmark error: {0}")]
    Benchmark(#[from] aurum_benchmark::BenchmarkError),

    #[error("Reference error: {0}")]
    Reference(#[from] aurum_reference::ReferenceError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] aurum_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] aurum_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
