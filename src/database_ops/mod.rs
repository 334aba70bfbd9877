pub mod db;
pub mod memory;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use db::Db;
pub use memory::{MemoryStore, Snapshot};
pub use store::{ClueFilter, ClueStore, StoreError, StoreStats};
