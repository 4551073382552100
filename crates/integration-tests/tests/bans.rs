mod common;

use common::{image, moderator, post, seed_thread, Harness, BOARD, MODERATOR};
use domains::{Actor, AuditCategory, DomainError, Post, ANONYMOUS_USER};
use services::moderation::{BanRequest, PostRef};
use services::Action;
use tokio_test::{assert_err, assert_ok};

fn ban(thread: i64, num: i64, reason: &str) -> BanRequest {
    BanRequest { post: PostRef { board: BOARD, thread, post: num }, reason: reason.to_string() }
}

fn spam() -> Action {
    Action::BanIp(ban(7, 2, "spam"))
}

#[tokio::test]
async fn banning_the_same_address_twice_is_accepted() {
    let h = Harness::new();
    seed_thread(&h.store, 7, "spam", 2).await;

    let first = assert_ok!(h.engine.execute(&moderator(), spam()).await);
    let again = assert_ok!(h.engine.execute(&moderator(), spam()).await);
    h.settle().await;

    assert_eq!(first.message, "Banned IP");
    assert_eq!(again.message, "Banned IP");
    assert!(first.invalidated_keys.is_empty());
    assert!(h.cache.delete_batches().is_empty());

    let rows = h.store.banned_ips().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(h.store.writes(), 1);
    assert_eq!(rows[0].ip, "198.51.100.2");
    assert_eq!(rows[0].actor, MODERATOR);
    assert_eq!(rows[0].reason, "spam");

    let entries = h.audit.submitted();
    assert!(entries.iter().all(|e| e.category == AuditCategory::ModLog));
    assert!(entries.iter().all(|e| e.detail == "spam"));
}

#[tokio::test]
async fn address_ban_is_pushed_to_the_edge() {
    let h = Harness::new();
    seed_thread(&h.store, 7, "spam", 1).await;

    assert_ok!(h.engine.execute(&moderator(), Action::BanIp(ban(7, 1, "flooding"))).await);
    h.settle().await;

    assert_eq!(h.firewall.blocked(), vec![("198.51.100.1".to_string(), "flooding".to_string())]);
}

#[tokio::test]
async fn file_ban_keys_on_the_content_hash() {
    let h = Harness::new();
    seed_thread(&h.store, 7, "spam", 1).await;
    h.store.insert_post(Post { image: Some(image(40)), ..post(7, 2) }).await;

    let outcome =
        assert_ok!(h.engine.execute(&moderator(), Action::BanFile(ban(7, 2, "gore"))).await);
    assert_ok!(h.engine.execute(&moderator(), Action::BanFile(ban(7, 2, "gore"))).await);
    h.settle().await;

    assert_eq!(outcome.message, "Banned File");
    let rows = h.store.banned_files().await;
    assert_eq!(rows.len(), 1);
    assert_eq!(h.store.writes(), 1);
    assert_eq!(rows[0].hash, "sha256-40");
    assert!(h.firewall.blocked().is_empty());
}

#[tokio::test]
async fn file_ban_on_a_post_without_media_is_not_found() {
    let h = Harness::new();
    seed_thread(&h.store, 7, "spam", 1).await;

    let action = Action::BanFile(ban(7, 1, "gore"));
    let err = assert_err!(h.engine.execute(&moderator(), action).await);

    assert!(matches!(err, DomainError::NotFound(_)));
    assert!(h.store.banned_files().await.is_empty());
}

#[tokio::test]
async fn bans_need_a_reason_and_a_real_actor() {
    let h = Harness::new();
    seed_thread(&h.store, 7, "spam", 1).await;

    let err = assert_err!(h.engine.execute(&moderator(), Action::BanIp(ban(7, 1, "  "))).await);
    assert!(matches!(err, DomainError::Validation(_)));

    let anonymous = Actor::new(ANONYMOUS_USER);
    let err = assert_err!(h.engine.execute(&anonymous, Action::BanIp(ban(7, 1, "spam"))).await);
    assert!(matches!(err, DomainError::Validation(_)));

    assert!(h.store.banned_ips().await.is_empty());
    assert_eq!(h.store.writes(), 0);
}
