//! Identity adapters.
//!
//! Implementations of the `IdentityProvider` port:
//!
//! - `static_identity` - A user fixed at startup (configuration, CLI)
//! - `mock` - Switchable test implementation

mod mock;
mod static_identity;

pub use mock::MockIdentityProvider;
pub use static_identity::StaticIdentity;
