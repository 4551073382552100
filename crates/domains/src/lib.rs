//! # domains
//!
//! Entity models, the caller-visible error taxonomy, and the port traits the
//! moderation engine consumes. Nothing in here performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
