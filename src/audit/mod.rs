//! Audit Trail
//!
//! Append-only governance event log and the SHA256 hash-chain primitives
//! used by the approval log.

pub mod chain;
pub mod events;

pub use chain::{sha256_prefixed, ChainVerification, GENESIS_HASH};
pub use events::{log_event, recent_events, GovernanceEvent};
