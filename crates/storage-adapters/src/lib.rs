//! # storage-adapters
//!
//! Implementations of the `domains` ports. Production backends are behind
//! cargo features so a binary only links what it uses:
//!
//! | feature           | adapter                                   |
//! |-------------------|-------------------------------------------|
//! | `db-postgres`     | store, transactions, audit, authorizer    |
//! | `redis`           | page cache invalidation                   |
//! | `media-s3`        | object storage                            |
//! | `edge-cloudflare` | IP blocks at the CDN                      |
//!
//! The local media mirror and the in-memory adapters are always built.

pub mod local_fs;
pub mod memory;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "media-s3")]
pub mod s3;

#[cfg(feature = "edge-cloudflare")]
pub mod cloudflare;

pub use local_fs::LocalMediaFiles;
