//! # Moderation
//!
//! The action orchestrator and its stages. Every action runs the same fixed
//! pipeline:
//!
//! 1. validate the request (no I/O)
//! 2. resolve the target's current state
//! 3. consume the external authorization verdict
//! 4. apply the mutation (with its cascade, if any)
//! 5. hand purged media to the reclaimer
//! 6. invalidate stale cache keys
//! 7. produce the result
//! 8. record the audit entry in the background
//!
//! Once step 7 is reached the action cannot fail any more. Audit and media
//! cleanup failures are logged only. A cache failure fails the action even
//! though the mutation already committed, so the caller knows to retry.

pub mod action;
pub mod audit;
pub mod cache_keys;
pub mod executor;
pub mod invalidator;
pub mod reclaimer;
pub mod resolver;
pub mod sanitize;

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use domains::{
    Actor, AuditEntry, AuditSink, Authorizer, BoardId, CacheStore, DomainError, EdgeFirewall,
    LocalFiles, ModerationStore, ObjectStore, Result,
};

pub use action::{
    Action, ActionKind, ActionProfile, BanRequest, ImageTagRef, PostRef, TagRef, TagUpdate,
    ThreadRef,
};
pub use cache_keys::{CacheKey, CacheKeySet, KeyFamily};
pub use reclaimer::{BlobReclaimer, MediaLayout, ReclaimReport};
pub use sanitize::TagLimits;

use crate::background::BackgroundPool;
use action::{Command, Target};
use audit::AuditRecorder;
use executor::MutationExecutor;
use invalidator::CacheInvalidator;
use resolver::EntityResolver;

/// Collaborators the engine is built from. Constructed once at process start.
#[derive(Clone)]
pub struct ModerationDeps {
    pub store: Arc<dyn ModerationStore>,
    pub cache: Arc<dyn CacheStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub files: Arc<dyn LocalFiles>,
    pub authorizer: Arc<dyn Authorizer>,
    pub audit: Arc<dyn AuditSink>,
    /// Optional CDN firewall for address bans
    pub firewall: Option<Arc<dyn EdgeFirewall>>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub media: MediaLayout,
    pub tag_limits: TagLimits,
    pub max_background_jobs: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            media: MediaLayout::default(),
            tag_limits: TagLimits::default(),
            max_background_jobs: 8,
        }
    }
}

/// What the caller gets back once the mutation committed and the cache was
/// invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub action: ActionKind,
    pub board_id: BoardId,
    /// Same text as the audit label
    pub message: String,
    /// A post delete also deleted its thread
    pub thread_deleted: bool,
    /// Blobs handed to the background reclaimer
    pub reclaimed_blobs: usize,
    pub invalidated_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validating,
    Resolving,
    Authorizing,
    Mutating,
    Invalidating,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Authorizing => "authorizing",
            Self::Mutating => "mutating",
            Self::Invalidating => "invalidating",
        }
    }
}

/// Logs a stage failure at a level matching its class and hands it back.
fn failed(stage: Stage, err: DomainError) -> DomainError {
    if err.is_internal() {
        error!(stage = stage.as_str(), error = %err, "moderation action failed");
    } else {
        warn!(stage = stage.as_str(), error = %err, "moderation action rejected");
    }
    err
}

pub struct ModerationService {
    resolver: EntityResolver,
    executor: MutationExecutor,
    invalidator: CacheInvalidator,
    reclaimer: BlobReclaimer,
    recorder: AuditRecorder,
    authorizer: Arc<dyn Authorizer>,
    firewall: Option<Arc<dyn EdgeFirewall>>,
    tag_limits: TagLimits,
    pool: BackgroundPool,
}

impl ModerationService {
    pub fn new(deps: ModerationDeps, settings: EngineSettings) -> Self {
        let pool = BackgroundPool::new(settings.max_background_jobs);
        Self {
            resolver: EntityResolver::new(Arc::clone(&deps.store)),
            executor: MutationExecutor::new(deps.store),
            invalidator: CacheInvalidator::new(deps.cache),
            reclaimer: BlobReclaimer::new(deps.objects, deps.files, settings.media, pool.clone()),
            recorder: AuditRecorder::new(deps.audit, pool.clone()),
            authorizer: deps.authorizer,
            firewall: deps.firewall,
            tag_limits: settings.tag_limits,
            pool,
        }
    }

    /// Background pool shared by reclamation, audit and firewall jobs.
    pub fn pool(&self) -> &BackgroundPool {
        &self.pool
    }

    /// Media deletions finished by reclaim jobs so far.
    pub fn reclaim_totals(&self) -> ReclaimReport {
        self.reclaimer.totals()
    }

    pub async fn execute(&self, actor: &Actor, action: Action) -> Result<ActionOutcome> {
        let span = info_span!(
            "moderation_action",
            action_id = %Uuid::new_v4(),
            action = %action.kind(),
            board = action.board(),
            actor = actor.user_id,
        );
        self.run(actor, &action).instrument(span).await
    }

    async fn run(&self, actor: &Actor, action: &Action) -> Result<ActionOutcome> {
        let kind = action.kind();
        let board = action.board();

        action
            .validate(actor, &self.tag_limits)
            .map_err(|e| failed(Stage::Validating, e))?;

        let target = self.resolver.resolve(action).await.map_err(|e| failed(Stage::Resolving, e))?;

        match self.authorizer.check(actor.user_id, board).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(failed(
                    Stage::Authorizing,
                    DomainError::Forbidden(format!("not allowed to moderate board {board}")),
                ))
            }
            Err(e) => {
                let err = match e {
                    DomainError::Internal(_) => e,
                    other => DomainError::internal(format!("authorizer: {other}")),
                };
                return Err(failed(Stage::Authorizing, err));
            }
        }

        let command = action
            .command(&target, actor, &self.tag_limits)
            .map_err(|e| failed(Stage::Mutating, e))?;
        let effect = self.executor.apply(&command).await.map_err(|e| failed(Stage::Mutating, e))?;

        // The rows are gone for good at this point; the media follows even if
        // the cache call below fails.
        let reclaimed_blobs = self.reclaimer.dispatch(effect.blobs);

        let keys = cache_keys::derive(action, effect.cascaded_thread_delete);
        let invalidated_keys = self
            .invalidator
            .invalidate(&keys)
            .await
            .map_err(|e| failed(Stage::Invalidating, e))?;

        let (label, detail) = audit::describe(&command, &target);
        let outcome = ActionOutcome {
            action: kind,
            board_id: board,
            message: label.to_string(),
            thread_deleted: effect.cascaded_thread_delete,
            reclaimed_blobs,
            invalidated_keys,
        };
        info!(label, inserted = effect.inserted, "moderation action applied");

        self.recorder.record(AuditEntry {
            actor: actor.user_id,
            board_id: board,
            category: kind.profile().category,
            ip: actor.ip.clone(),
            timestamp: Utc::now(),
            action: label.to_string(),
            detail,
        });

        if let (Command::BanIp(ban), Some(firewall)) = (&command, &self.firewall) {
            self.block_at_edge(Arc::clone(firewall), &target, ban.reason.clone());
        }

        Ok(outcome)
    }

    fn block_at_edge(&self, firewall: Arc<dyn EdgeFirewall>, target: &Target, note: String) {
        let ip = target.subject().to_string();
        self.pool.spawn("edge_block", async move {
            if let Err(e) = firewall.block_ip(&ip, &note).await {
                error!(ip = %ip, error = %e, "edge firewall block failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{
        MockAuditSink, MockAuthorizer, MockCacheStore, MockEdgeFirewall, MockLocalFiles,
        MockModerationStore, MockObjectStore, PostStatus, Thread,
    };
    use mockall::predicate::eq;

    struct Mocks {
        store: MockModerationStore,
        cache: MockCacheStore,
        objects: MockObjectStore,
        files: MockLocalFiles,
        authorizer: MockAuthorizer,
        audit: MockAuditSink,
        firewall: Option<MockEdgeFirewall>,
    }

    impl Mocks {
        fn new() -> Self {
            let mut authorizer = MockAuthorizer::new();
            authorizer.expect_check().returning(|_, _| Ok(true));
            Self {
                store: MockModerationStore::new(),
                cache: MockCacheStore::new(),
                objects: MockObjectStore::new(),
                files: MockLocalFiles::new(),
                authorizer,
                audit: MockAuditSink::new(),
                firewall: None,
            }
        }

        fn build(self) -> ModerationService {
            let deps = ModerationDeps {
                store: Arc::new(self.store),
                cache: Arc::new(self.cache),
                objects: Arc::new(self.objects),
                files: Arc::new(self.files),
                authorizer: Arc::new(self.authorizer),
                audit: Arc::new(self.audit),
                firewall: self.firewall.map(|f| Arc::new(f) as Arc<dyn EdgeFirewall>),
            };
            ModerationService::new(deps, EngineSettings::default())
        }
    }

    fn open_thread() -> Thread {
        Thread {
            board_id: 1,
            thread_id: 7,
            title: "hello".into(),
            deleted: false,
            closed: false,
            sticky: false,
            last_post: None,
        }
    }

    #[tokio::test]
    async fn close_thread_runs_the_whole_pipeline() {
        let mut mocks = Mocks::new();
        mocks.store.expect_thread().returning(|_, _| Ok(Some(open_thread())));
        mocks
            .store
            .expect_set_thread_closed()
            .with(eq(1), eq(7), eq(true))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks.cache.expect_delete().times(1).returning(|_| Ok(()));
        mocks
            .audit
            .expect_submit()
            .withf(|entry| entry.action == "Closed Thread" && entry.detail == "hello")
            .times(1)
            .returning(|_| Ok(()));

        let service = mocks.build();
        let outcome = service
            .execute(&Actor::new(2), Action::CloseThread(ThreadRef { board: 1, thread: 7 }))
            .await
            .unwrap();
        service.pool().wait_idle().await;

        assert_eq!(outcome.message, "Closed Thread");
        assert_eq!(outcome.invalidated_keys, vec!["index:1", "directory:1", "thread:1:7"]);
    }

    #[tokio::test]
    async fn forbidden_actor_never_mutates() {
        let mut mocks = Mocks::new();
        mocks.authorizer = MockAuthorizer::new();
        mocks.authorizer.expect_check().returning(|_, _| Ok(false));
        mocks.store.expect_thread().returning(|_, _| Ok(Some(open_thread())));
        mocks.store.expect_set_thread_sticky().never();
        mocks.cache.expect_delete().never();
        mocks.audit.expect_submit().never();

        let service = mocks.build();
        let err = service
            .execute(&Actor::new(2), Action::StickyThread(ThreadRef { board: 1, thread: 7 }))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
    }

    #[tokio::test]
    async fn authorizer_error_is_internal() {
        let mut mocks = Mocks::new();
        mocks.authorizer = MockAuthorizer::new();
        mocks
            .authorizer
            .expect_check()
            .returning(|_, _| Err(DomainError::NotFound("session".into())));
        mocks.store.expect_thread().returning(|_, _| Ok(Some(open_thread())));

        let service = mocks.build();
        let err = service
            .execute(&Actor::new(2), Action::StickyThread(ThreadRef { board: 1, thread: 7 }))
            .await
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn invalid_request_performs_no_io() {
        let mut mocks = Mocks::new();
        mocks.authorizer = MockAuthorizer::new();
        mocks.authorizer.expect_check().never();
        mocks.store.expect_post_status().never();

        let service = mocks.build();
        let err = service
            .execute(&Actor::new(2), Action::DeletePost(PostRef { board: 1, thread: 0, post: 3 }))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn cache_failure_fails_the_action_after_commit() {
        let mut mocks = Mocks::new();
        mocks.store.expect_thread().returning(|_, _| Ok(Some(open_thread())));
        mocks.store.expect_set_thread_deleted().times(1).returning(|_, _, _| Ok(()));
        mocks.cache.expect_delete().returning(|_| Err(DomainError::internal("redis down")));
        mocks.audit.expect_submit().never();

        let service = mocks.build();
        let err = service
            .execute(&Actor::new(2), Action::DeleteThread(ThreadRef { board: 1, thread: 7 }))
            .await
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_the_action() {
        let mut mocks = Mocks::new();
        mocks.store.expect_post_status().returning(|_, _, _| {
            Ok(Some(PostStatus { thread_title: "hello".into(), deleted: true }))
        });
        mocks.store.expect_begin().returning(|| {
            let mut tx = domains::MockStoreTransaction::new();
            tx.expect_lock_thread().returning(|_, _| Ok(true));
            tx.expect_post_deleted().returning(|_, _| Ok(Some(true)));
            tx.expect_set_post_deleted().with(eq(7), eq(3), eq(false)).returning(|_, _, _| Ok(()));
            tx.expect_refresh_last_post().returning(|_, _, _| Ok(()));
            tx.expect_commit().returning(|| Ok(()));
            Ok(Box::new(tx) as Box<dyn domains::StoreTransaction>)
        });
        mocks.cache.expect_delete().returning(|_| Ok(()));
        mocks.audit.expect_submit().returning(|_| Err(DomainError::internal("audit table locked")));

        let service = mocks.build();
        let outcome = service
            .execute(&Actor::new(2), Action::DeletePost(PostRef { board: 1, thread: 7, post: 3 }))
            .await
            .unwrap();
        service.pool().wait_idle().await;
        assert_eq!(outcome.message, "Restored Post");
        assert!(!outcome.thread_deleted);
    }

    #[tokio::test]
    async fn address_ban_reaches_the_edge_firewall() {
        let mut mocks = Mocks::new();
        mocks.store.expect_post_ip().returning(|_, _, _| Ok(Some("203.0.113.9".into())));
        mocks.store.expect_insert_banned_ip().returning(|_| Ok(true));
        mocks.cache.expect_delete().never();
        mocks.audit.expect_submit().returning(|_| Ok(()));
        let mut firewall = MockEdgeFirewall::new();
        firewall
            .expect_block_ip()
            .withf(|ip, note| ip == "203.0.113.9" && note == "spam")
            .times(1)
            .returning(|_, _| Ok(()));
        mocks.firewall = Some(firewall);

        let service = mocks.build();
        let outcome = service
            .execute(
                &Actor::new(2),
                Action::BanIp(BanRequest {
                    post: PostRef { board: 1, thread: 7, post: 3 },
                    reason: "spam".into(),
                }),
            )
            .await
            .unwrap();
        service.pool().wait_idle().await;
        assert_eq!(outcome.message, "Banned IP");
        assert!(outcome.invalidated_keys.is_empty());
    }
}
