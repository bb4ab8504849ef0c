pub mod kv;
pub mod store;

pub use kv::{KvStore, MemoryKv};
pub use store::AlertStore;
