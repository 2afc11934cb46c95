//! Derived read models: cross-provider statistics and daily reference
//! prices, both behind short TTL caches so a burst of HTTP reads does not
//! hammer the store.

mod cache;
mod error;
mod service;

pub use cache::TtlCache;
pub use error::{ReferenceError, ReferenceResult};
pub use service::{ProviderQuote, ReferenceConfig, ReferenceService, Statistics};
