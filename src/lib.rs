//! jService: trivia clue archive import and query API.
//!
//! The import pipeline turns a tab-separated clue archive into deduplicated
//! categories and clues and upserts them in batches; the API serves them back.
pub mod api;
pub mod database_ops;
pub mod model;
pub mod normalization;
pub mod pipeline;
pub mod query;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use database_ops::{ClueStore, Db, MemoryStore, Snapshot};
pub use model::{Category, Clue};
pub use pipeline::{ImportConfig, Prepared};
