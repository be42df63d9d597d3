//! PostgreSQL adapters - Database implementation of the remote store ports.
//!
//! - `PostgresStore` - Groups, budgets and expenses over a `PgPool`, plus a
//!   `LISTEN/NOTIFY` change feed driven by the schema trigger in
//!   `migrations/`.

mod budgets;
mod change_feed;
mod expenses;
mod rows;
mod store;

pub use store::PostgresStore;
