pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod entities;
pub mod error;
pub mod governance;

pub use error::GovernanceError;
