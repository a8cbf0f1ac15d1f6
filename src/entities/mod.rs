//! Entity Registry
//!
//! Tenants (districts, nonprofits, businesses) and the role bindings that
//! gate every read and write against their governance data.

pub mod registry;
pub mod types;

pub use registry::EntityRegistry;
pub use types::*;
