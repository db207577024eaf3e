//! Domain models for Mercato.
//!
//! These are the core types shared across all crates.

pub mod user;
