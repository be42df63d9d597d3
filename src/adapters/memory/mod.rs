//! In-memory adapters for the remote store ports.

mod faults;
mod store;

pub use faults::StoreOperation;
pub use store::InMemoryStore;
