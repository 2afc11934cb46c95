use thiserror::Error;

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("payload error: {0}")]
    Payload(String),

    #[error("value not found in response: {0}")]
    ValueNotFound(&'static str),

    #[error("decimal parse failed: {0}")]
    Decimal(#[from] rust_decimal::Error),
}

pub type BenchmarkResult<T> = Result<T, BenchmarkError>;
