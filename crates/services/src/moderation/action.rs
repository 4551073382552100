//! The closed set of moderation actions and the per-action configuration
//! table (cache key template, audit category).

use serde::{Deserialize, Serialize};

use domains::{
    Actor, AuditCategory, BannedFile, BannedIp, BoardId, DomainError, ImageId, PostNum,
    PostStatus, Result, Tag, TagId, Thread, ThreadId, ANONYMOUS_USER,
};

use super::cache_keys::KeyFamily;
use super::sanitize::{sanitize_tag_name, TagLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    BanIp,
    BanFile,
    CloseThread,
    StickyThread,
    DeleteThread,
    DeletePost,
    DeleteTag,
    DeleteImageTag,
    PurgeThread,
    PurgePost,
    UpdateTag,
}

/// Static per-action configuration.
#[derive(Debug)]
pub struct ActionProfile {
    pub kind: ActionKind,
    /// Cache families that go stale when this action succeeds
    pub stale: &'static [KeyFamily],
    pub category: AuditCategory,
}

const THREAD_TOGGLE_KEYS: &[KeyFamily] =
    &[KeyFamily::Index, KeyFamily::Directory, KeyFamily::Thread];

const THREAD_CONTENT_KEYS: &[KeyFamily] = &[
    KeyFamily::Index,
    KeyFamily::Directory,
    KeyFamily::Thread,
    KeyFamily::Post,
    KeyFamily::Tags,
    KeyFamily::Image,
    KeyFamily::New,
    KeyFamily::Popular,
    KeyFamily::Favorited,
];

const TAG_KEYS: &[KeyFamily] = &[KeyFamily::Tags, KeyFamily::Tag, KeyFamily::Image];

const PROFILES: [ActionProfile; 11] = [
    ActionProfile { kind: ActionKind::BanIp, stale: &[], category: AuditCategory::ModLog },
    ActionProfile { kind: ActionKind::BanFile, stale: &[], category: AuditCategory::ModLog },
    ActionProfile {
        kind: ActionKind::CloseThread,
        stale: THREAD_TOGGLE_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile {
        kind: ActionKind::StickyThread,
        stale: THREAD_TOGGLE_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile {
        kind: ActionKind::DeleteThread,
        stale: THREAD_CONTENT_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile {
        kind: ActionKind::DeletePost,
        stale: THREAD_CONTENT_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile { kind: ActionKind::DeleteTag, stale: TAG_KEYS, category: AuditCategory::UserLog },
    ActionProfile {
        kind: ActionKind::DeleteImageTag,
        stale: TAG_KEYS,
        category: AuditCategory::UserLog,
    },
    ActionProfile {
        kind: ActionKind::PurgeThread,
        stale: THREAD_CONTENT_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile {
        kind: ActionKind::PurgePost,
        stale: THREAD_CONTENT_KEYS,
        category: AuditCategory::ModLog,
    },
    ActionProfile { kind: ActionKind::UpdateTag, stale: TAG_KEYS, category: AuditCategory::UserLog },
];

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        Self::BanIp,
        Self::BanFile,
        Self::CloseThread,
        Self::StickyThread,
        Self::DeleteThread,
        Self::DeletePost,
        Self::DeleteTag,
        Self::DeleteImageTag,
        Self::PurgeThread,
        Self::PurgePost,
        Self::UpdateTag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BanIp => "ban-ip",
            Self::BanFile => "ban-file",
            Self::CloseThread => "close-thread",
            Self::StickyThread => "sticky-thread",
            Self::DeleteThread => "delete-thread",
            Self::DeletePost => "delete-post",
            Self::DeleteTag => "delete-tag",
            Self::DeleteImageTag => "delete-image-tag",
            Self::PurgeThread => "purge-thread",
            Self::PurgePost => "purge-post",
            Self::UpdateTag => "update-tag",
        }
    }

    pub fn profile(self) -> &'static ActionProfile {
        // PROFILES is declared in the same order as ALL
        &PROFILES[self as usize]
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub board: BoardId,
    pub thread: ThreadId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub board: BoardId,
    pub thread: ThreadId,
    pub post: PostNum,
}

/// A ban targets whatever the referenced post carries (its address or its
/// file hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRequest {
    pub post: PostRef,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRef {
    pub board: BoardId,
    pub tag: TagId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageTagRef {
    pub board: BoardId,
    pub image: ImageId,
    pub tag: TagId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUpdate {
    pub board: BoardId,
    pub tag: TagId,
    pub name: String,
    pub tag_type: i64,
}

/// One privileged request. Each variant runs the same pipeline with its own
/// resolver query, mutation, cache template and audit label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    BanIp(BanRequest),
    BanFile(BanRequest),
    CloseThread(ThreadRef),
    StickyThread(ThreadRef),
    DeleteThread(ThreadRef),
    DeletePost(PostRef),
    DeleteTag(TagRef),
    DeleteImageTag(ImageTagRef),
    PurgeThread(ThreadRef),
    PurgePost(PostRef),
    UpdateTag(TagUpdate),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::BanIp(_) => ActionKind::BanIp,
            Self::BanFile(_) => ActionKind::BanFile,
            Self::CloseThread(_) => ActionKind::CloseThread,
            Self::StickyThread(_) => ActionKind::StickyThread,
            Self::DeleteThread(_) => ActionKind::DeleteThread,
            Self::DeletePost(_) => ActionKind::DeletePost,
            Self::DeleteTag(_) => ActionKind::DeleteTag,
            Self::DeleteImageTag(_) => ActionKind::DeleteImageTag,
            Self::PurgeThread(_) => ActionKind::PurgeThread,
            Self::PurgePost(_) => ActionKind::PurgePost,
            Self::UpdateTag(_) => ActionKind::UpdateTag,
        }
    }

    pub fn board(&self) -> BoardId {
        match self {
            Self::BanIp(ban) | Self::BanFile(ban) => ban.post.board,
            Self::CloseThread(t)
            | Self::StickyThread(t)
            | Self::DeleteThread(t)
            | Self::PurgeThread(t) => t.board,
            Self::DeletePost(p) | Self::PurgePost(p) => p.board,
            Self::DeleteTag(t) => t.board,
            Self::DeleteImageTag(m) => m.board,
            Self::UpdateTag(u) => u.board,
        }
    }

    /// Thread the action touches, if any
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            Self::BanIp(ban) | Self::BanFile(ban) => Some(ban.post.thread),
            Self::CloseThread(t)
            | Self::StickyThread(t)
            | Self::DeleteThread(t)
            | Self::PurgeThread(t) => Some(t.thread),
            Self::DeletePost(p) | Self::PurgePost(p) => Some(p.thread),
            _ => None,
        }
    }

    /// Tag the action touches, if any
    pub fn tag(&self) -> Option<TagId> {
        match self {
            Self::DeleteTag(t) => Some(t.tag),
            Self::DeleteImageTag(m) => Some(m.tag),
            Self::UpdateTag(u) => Some(u.tag),
            _ => None,
        }
    }

    /// Structural check of the request itself: identity fields non-zero,
    /// required strings non-empty. Never performs I/O.
    pub fn validate(&self, actor: &Actor, limits: &TagLimits) -> Result<()> {
        match self {
            Self::BanIp(ban) | Self::BanFile(ban) => {
                check_post_ref(&ban.post)?;
                if actor.user_id <= 0 || actor.user_id == ANONYMOUS_USER {
                    return Err(DomainError::Validation("bans require a registered actor".into()));
                }
                require_text("reason", &ban.reason)
            }
            Self::CloseThread(t)
            | Self::StickyThread(t)
            | Self::DeleteThread(t)
            | Self::PurgeThread(t) => {
                require_id("board", t.board)?;
                require_id("thread", t.thread)
            }
            Self::DeletePost(p) | Self::PurgePost(p) => check_post_ref(p),
            Self::DeleteTag(t) => {
                require_id("board", t.board)?;
                require_id("tag", t.tag)
            }
            Self::DeleteImageTag(m) => {
                require_id("board", m.board)?;
                require_id("image", m.image)?;
                require_id("tag", m.tag)
            }
            Self::UpdateTag(u) => {
                require_id("board", u.board)?;
                require_id("tag", u.tag)?;
                if u.tag_type == 0 {
                    return Err(DomainError::Validation("tag type is required".into()));
                }
                sanitize_tag_name(&u.name, limits).map(drop)
            }
        }
    }

    /// Translates a validated action into its store command using the
    /// resolved state. Toggles flip whatever was read.
    pub(crate) fn command(
        &self,
        target: &Target,
        actor: &Actor,
        limits: &TagLimits,
    ) -> Result<Command> {
        match (self, target) {
            (Self::BanIp(ban), Target::Address(ip)) => {
                require_text("ip", ip)?;
                Ok(Command::BanIp(BannedIp {
                    board_id: ban.post.board,
                    ip: ip.clone(),
                    reason: ban.reason.clone(),
                    actor: actor.user_id,
                }))
            }
            (Self::BanFile(ban), Target::FileHash(hash)) => {
                require_text("file hash", hash)?;
                Ok(Command::BanFile(BannedFile {
                    board_id: ban.post.board,
                    hash: hash.clone(),
                    reason: ban.reason.clone(),
                    actor: actor.user_id,
                }))
            }
            (Self::CloseThread(t), Target::Thread(thread)) => {
                require_text("thread title", &thread.title)?;
                Ok(Command::SetClosed { at: *t, closed: !thread.closed })
            }
            (Self::StickyThread(t), Target::Thread(thread)) => {
                require_text("thread title", &thread.title)?;
                Ok(Command::SetSticky { at: *t, sticky: !thread.sticky })
            }
            (Self::DeleteThread(t), Target::Thread(thread)) => {
                require_text("thread title", &thread.title)?;
                Ok(Command::SetThreadDeleted { at: *t, deleted: !thread.deleted })
            }
            (Self::PurgeThread(t), Target::Thread(thread)) => {
                require_text("thread title", &thread.title)?;
                Ok(Command::PurgeThread { at: *t })
            }
            (Self::DeletePost(p), Target::Post(status)) => {
                require_text("thread title", &status.thread_title)?;
                Ok(Command::SetPostDeleted { at: *p, deleted: !status.deleted })
            }
            (Self::PurgePost(p), Target::Post(status)) => {
                require_text("thread title", &status.thread_title)?;
                Ok(Command::PurgePost { at: *p })
            }
            (Self::DeleteTag(t), Target::Tag(tag)) => {
                require_text("tag name", &tag.name)?;
                Ok(Command::DeleteTag { at: *t })
            }
            (Self::DeleteImageTag(m), Target::Tag(tag)) => {
                require_text("tag name", &tag.name)?;
                Ok(Command::DeleteImageTag { at: *m })
            }
            (Self::UpdateTag(u), Target::Tag(_)) => Ok(Command::UpdateTag {
                at: TagRef { board: u.board, tag: u.tag },
                name: sanitize_tag_name(&u.name, limits)?,
                tag_type: u.tag_type,
            }),
            (action, _) => Err(DomainError::Internal(format!(
                "resolved target does not match {}",
                action.kind()
            ))),
        }
    }
}

/// Current persisted state of an action's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Thread(Thread),
    Post(PostStatus),
    Address(String),
    FileHash(String),
    Tag(Tag),
}

impl Target {
    /// Human-readable name used in audit details.
    pub fn subject(&self) -> &str {
        match self {
            Self::Thread(thread) => &thread.title,
            Self::Post(status) => &status.thread_title,
            Self::Address(ip) => ip,
            Self::FileHash(hash) => hash,
            Self::Tag(tag) => &tag.name,
        }
    }
}

/// A validated store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    BanIp(BannedIp),
    BanFile(BannedFile),
    SetClosed { at: ThreadRef, closed: bool },
    SetSticky { at: ThreadRef, sticky: bool },
    SetThreadDeleted { at: ThreadRef, deleted: bool },
    SetPostDeleted { at: PostRef, deleted: bool },
    PurgeThread { at: ThreadRef },
    PurgePost { at: PostRef },
    DeleteTag { at: TagRef },
    DeleteImageTag { at: ImageTagRef },
    UpdateTag { at: TagRef, name: String, tag_type: i64 },
}

fn require_id(field: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(DomainError::Validation(format!("{field} id is required")));
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn check_post_ref(at: &PostRef) -> Result<()> {
    require_id("board", at.board)?;
    require_id("thread", at.thread)?;
    require_id("post", at.post)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(title: &str) -> Thread {
        Thread {
            board_id: 1,
            thread_id: 7,
            title: title.into(),
            deleted: false,
            closed: true,
            sticky: false,
            last_post: None,
        }
    }

    fn limits() -> TagLimits {
        TagLimits { min_length: 3, max_length: 20 }
    }

    #[test]
    fn profile_table_matches_kind_order() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.profile().kind, kind);
        }
    }

    #[test]
    fn bans_have_no_cache_template() {
        assert!(ActionKind::BanIp.profile().stale.is_empty());
        assert!(ActionKind::BanFile.profile().stale.is_empty());
    }

    #[test]
    fn close_flips_the_resolved_flag() {
        let action = Action::CloseThread(ThreadRef { board: 1, thread: 7 });
        let cmd = action
            .command(&Target::Thread(thread("hello")), &Actor::new(2), &limits())
            .unwrap();
        assert_eq!(cmd, Command::SetClosed { at: ThreadRef { board: 1, thread: 7 }, closed: false });
    }

    #[test]
    fn zero_identity_is_a_validation_error() {
        let action = Action::StickyThread(ThreadRef { board: 0, thread: 7 });
        let err = action.validate(&Actor::new(2), &limits()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn empty_title_is_a_validation_error() {
        let action = Action::DeleteThread(ThreadRef { board: 1, thread: 7 });
        let err = action
            .command(&Target::Thread(thread("")), &Actor::new(2), &limits())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn anonymous_actor_cannot_ban() {
        let action = Action::BanIp(BanRequest {
            post: PostRef { board: 1, thread: 7, post: 3 },
            reason: "spam".into(),
        });
        for user in [0, ANONYMOUS_USER] {
            let err = action.validate(&Actor::new(user), &limits()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
        assert!(action.validate(&Actor::new(2), &limits()).is_ok());
    }

    #[test]
    fn ban_requires_reason() {
        let action = Action::BanFile(BanRequest {
            post: PostRef { board: 1, thread: 7, post: 3 },
            reason: "  ".into(),
        });
        let err = action.validate(&Actor::new(2), &limits()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn update_tag_requires_type_and_sanitizes_name() {
        let tag = Target::Tag(Tag { tag_id: 4, board_id: 1, name: "old".into(), tag_type: 1 });
        let untyped = Action::UpdateTag(TagUpdate {
            board: 1,
            tag: 4,
            name: "scenery".into(),
            tag_type: 0,
        });
        assert!(matches!(
            untyped.validate(&Actor::new(2), &limits()),
            Err(DomainError::Validation(_))
        ));

        let dirty = Action::UpdateTag(TagUpdate {
            board: 1,
            tag: 4,
            name: "<b>scenery</b><script>alert(1)</script>".into(),
            tag_type: 2,
        });
        dirty.validate(&Actor::new(2), &limits()).unwrap();
        let cmd = dirty.command(&tag, &Actor::new(2), &limits()).unwrap();
        assert_eq!(
            cmd,
            Command::UpdateTag { at: TagRef { board: 1, tag: 4 }, name: "scenery".into(), tag_type: 2 }
        );
    }

    #[test]
    fn mismatched_target_is_internal() {
        let action = Action::DeletePost(PostRef { board: 1, thread: 7, post: 3 });
        let err = action
            .command(&Target::Address("10.0.0.1".into()), &Actor::new(2), &limits())
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn serde_tag_matches_kind_name() {
        let action = Action::PurgePost(PostRef { board: 1, thread: 9, post: 1 });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], action.kind().name());
        assert_eq!(json["thread"], 9);
    }
}
