//! PromptFlam Core: configuration, the error enum and the key-value store.

pub mod config;
pub mod error;
pub mod store;

pub use config::{DataPaths, PromptFlamConfig};
pub use error::{Error, Result};
pub use store::{FileStore, KeyValueStore, MemoryStore, StorageUsage};
