//! # Audit Recorder
//!
//! Best-effort append of one audit row per successful action. Submission runs
//! on the background pool; a failure is logged and dropped.

use std::sync::Arc;

use tracing::error;

use domains::{AuditEntry, AuditSink};

use super::action::{Command, Target};
use crate::background::BackgroundPool;

pub const BANNED_IP: &str = "Banned IP";
pub const BANNED_FILE: &str = "Banned File";
pub const CLOSED_THREAD: &str = "Closed Thread";
pub const OPENED_THREAD: &str = "Opened Thread";
pub const STICKIED_THREAD: &str = "Stickied Thread";
pub const UNSTICKIED_THREAD: &str = "Unstickied Thread";
pub const DELETED_THREAD: &str = "Deleted Thread";
pub const RESTORED_THREAD: &str = "Restored Thread";
pub const DELETED_POST: &str = "Deleted Post";
pub const RESTORED_POST: &str = "Restored Post";
pub const PURGED_THREAD: &str = "Purged Thread";
pub const PURGED_POST: &str = "Purged Post";
pub const DELETED_TAG: &str = "Deleted Tag";
pub const DELETED_IMAGE_TAG: &str = "Deleted Image Tag";
pub const UPDATED_TAG: &str = "Updated Tag";

/// Audit label and human-readable detail for a committed command.
/// The label doubles as the success message.
pub(crate) fn describe(command: &Command, target: &Target) -> (&'static str, String) {
    let subject = target.subject();
    match command {
        Command::BanIp(ban) => (BANNED_IP, ban.reason.clone()),
        Command::BanFile(ban) => (BANNED_FILE, ban.reason.clone()),
        Command::SetClosed { closed, .. } => {
            (if *closed { CLOSED_THREAD } else { OPENED_THREAD }, subject.to_string())
        }
        Command::SetSticky { sticky, .. } => {
            (if *sticky { STICKIED_THREAD } else { UNSTICKIED_THREAD }, subject.to_string())
        }
        Command::SetThreadDeleted { deleted, .. } => {
            (if *deleted { DELETED_THREAD } else { RESTORED_THREAD }, subject.to_string())
        }
        Command::SetPostDeleted { at, deleted } => (
            if *deleted { DELETED_POST } else { RESTORED_POST },
            format!("{subject}/{}", at.post),
        ),
        Command::PurgeThread { .. } => (PURGED_THREAD, subject.to_string()),
        Command::PurgePost { at } => (PURGED_POST, format!("{subject}/{}", at.post)),
        Command::DeleteTag { .. } => (DELETED_TAG, subject.to_string()),
        Command::DeleteImageTag { at } => (DELETED_IMAGE_TAG, format!("{}/{subject}", at.image)),
        Command::UpdateTag { name, .. } => (UPDATED_TAG, name.clone()),
    }
}

#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
    pool: BackgroundPool,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, pool: BackgroundPool) -> Self {
        Self { sink, pool }
    }

    /// Never fails from the caller's point of view.
    pub fn record(&self, entry: AuditEntry) {
        let sink = Arc::clone(&self.sink);
        self.pool.spawn("audit_submit", async move {
            if let Err(e) = sink.submit(&entry).await {
                error!(
                    error = %e,
                    board = entry.board_id,
                    actor = entry.actor,
                    action = %entry.action,
                    "audit submit failed"
                );
            }
        });
    }
}
