//! # In-memory adapters
//!
//! Process-local implementations of every port, used by the scenario tests.

mod collaborators;
mod store;

pub use collaborators::{
    MemoryAuditLog, MemoryCache, MemoryFiles, MemoryObjectStore, RecordingFirewall,
    StaticAuthorizer,
};
pub use store::{MemoryStore, MemoryTransaction};
