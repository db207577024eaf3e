//! Mercato Core — domain models, collaborator contracts, and shared
//! error types for the marketplace token authority.

pub mod error;
pub mod models;
pub mod store;

pub use error::{CoreError, CoreResult};
