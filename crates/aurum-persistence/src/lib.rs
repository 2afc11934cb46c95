//! Price history gateway.
//!
//! The pipeline core never talks to a storage engine directly; everything
//! goes through the `PriceStore` trait. This crate ships an in-memory
//! implementation with bounded retention plus an append-only JSON Lines
//! journal for offline inspection.

pub mod error;
pub mod journal;
pub mod store;

pub use error::{PersistenceError, PersistenceResult};
pub use journal::JsonLinesJournal;
pub use store::{
    MemoryStore, PriceRecord, PriceStore, ReferencePrices, ReferenceWindows,
};
