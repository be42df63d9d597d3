//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the sync core to external systems:
//! - `memory` - In-process remote store with change feed and fault injection
//! - `postgres` - PostgreSQL remote store with a LISTEN/NOTIFY change feed
//! - `auth` - Identity providers (static, mock)
//! - `ai` - LLM providers and the LLM-backed expense extractor

pub mod ai;
pub mod auth;
pub mod memory;
pub mod postgres;

pub use ai::{LlmExpenseExtractor, OpenAIProvider, UnconfiguredExtractor};
pub use auth::{MockIdentityProvider, StaticIdentity};
pub use memory::{InMemoryStore, StoreOperation};
pub use postgres::PostgresStore;
