//! Disposable read-model storage.

mod store;

pub use store::{InMemoryReadModelStore, ReadModelStore};
