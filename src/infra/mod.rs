//! Infrastructure layer for cross-cutting concerns.
//!
//! - Configuration persistence and validation
//! - Error taxonomy and result type

pub mod config;
pub mod error;
