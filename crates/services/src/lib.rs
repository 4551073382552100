//! # services
//!
//! The moderation-action consistency engine. For every privileged action it
//! resolves current state, applies the mutation (with cascades), invalidates
//! stale cache keys, returns a result, and records an audit entry. Purges
//! additionally reclaim removed media in the background.

pub mod audit_log;
pub mod background;
pub mod moderation;

pub use audit_log::AuditLogService;
pub use background::BackgroundPool;
pub use moderation::{
    Action, ActionKind, ActionOutcome, EngineSettings, MediaLayout, ModerationDeps,
    ModerationService, ReclaimReport, TagLimits,
};
