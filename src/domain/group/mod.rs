//! Group domain module.
//!
//! Groups are the sharing boundary for budgets. Each has one owner and any
//! number of members.

mod aggregate;
mod role;

pub use aggregate::{first_owned_group, Group, GroupMembership, Membership};
pub use role::Role;
