use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tigris_sentinel::{
    AppContext,
    config::Settings,
    error::PlatformError,
    executor::{Outcome, SkipReason},
    model::{AuditAction, AuditEntry, MemberEvent, MessageEvent, WebhookInfo, WebhooksEvent},
    testing::{Call, MockPlatform},
};

const G: u64 = 1;
const BOT: u64 = 99;
const OWNER: u64 = 7;

fn settings() -> Settings {
    let mut s = Settings::defaults("test");
    s.guard.correlator.delay_ms = 50;
    s.guard.correlator.queries_per_second = 1000;
    s
}

fn ctx() -> (Arc<MockPlatform>, Arc<AppContext>) {
    let api = Arc::new(MockPlatform::new(BOT).with_owner(G, OWNER));
    let ctx = AppContext::new_testing(settings(), api.clone());
    (api, ctx)
}

fn message(author: u64, id: u64, content: &str, at: DateTime<Utc>) -> MessageEvent {
    MessageEvent {
        guild_id: G,
        channel_id: 10,
        message_id: id,
        author_id: author,
        author_is_bot: false,
        content: content.into(),
        mentions_everyone: false,
        user_mentions: 0,
        role_mentions: vec![],
        at,
    }
}

#[tokio::test]
async fn invite_burst_deletes_all_and_kicks_once() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let t0 = Utc::now();
    for i in 0..5 {
        s.on_message(&message(5, i, "wbijaj discord.gg/abc", t0 + Duration::seconds(i as i64 * 2)))
            .await;
    }
    assert_eq!(api.deleted_messages().len(), 5);
    assert_eq!(api.kicks(), vec![(G, 5)]);

    // okno wyczyszczone: szósty link liczy się od zera
    s.on_message(&message(5, 5, "discord.gg/abc", t0 + Duration::seconds(10))).await;
    assert_eq!(api.deleted_messages().len(), 6);
    assert_eq!(api.kicks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn moderator_kicking_three_members_is_kicked_once() {
    const MODERATOR: u64 = 40;
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let t0 = Utc::now();

    let kick = |target: u64, at: DateTime<Utc>| {
        api.push_audit(
            G,
            AuditAction::MemberKick,
            AuditEntry { acting_user_id: MODERATOR, target_id: Some(target), created_at: at },
        );
        MemberEvent { guild_id: G, user_id: target, is_bot: false, at }
    };

    for (i, target) in [100, 101, 102].into_iter().enumerate() {
        let ev = kick(target, t0 + Duration::seconds(i as i64 * 15));
        s.on_member_remove(&ev).await;
    }
    assert_eq!(api.kicks(), vec![(G, MODERATOR)]);

    let late = kick(103, t0 + Duration::minutes(5));
    assert!(s.on_member_remove(&late).await.is_empty());
    assert_eq!(api.kicks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn webhook_strikes_delete_every_hook_and_kick_on_third() {
    const CREATOR: u64 = 21;
    const CH: u64 = 70;
    let (api, ctx) = ctx();
    let s = ctx.sentinel();

    let mut hooks = Vec::new();
    for (i, id) in [501u64, 502, 503].into_iter().enumerate() {
        // dowolnie rozłożone w czasie: strike'i nie wygasają
        tokio::time::advance(StdDuration::from_secs(3600 * i as u64)).await;
        let at = Utc::now();
        hooks.push(WebhookInfo { id, channel_id: Some(CH), name: Some(format!("hook{i}")), url: None });
        api.set_webhooks(G, CH, hooks.clone());
        api.push_audit(
            G,
            AuditAction::WebhookCreate,
            AuditEntry { acting_user_id: CREATOR, target_id: Some(id), created_at: at },
        );
        s.on_webhooks_update(&WebhooksEvent { guild_id: G, channel_id: CH, at }).await;
        assert_eq!(api.deleted_webhooks().len(), i + 1);
    }

    assert_eq!(api.deleted_webhooks(), vec![501, 502, 503]);
    assert_eq!(api.kicks(), vec![(G, CREATOR)]);
    assert_eq!(s.webhook_strikes(G, CREATOR), 0);
}

#[tokio::test]
async fn owner_flood_never_reaches_the_platform() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let t0 = Utc::now();
    for i in 0..10 {
        let outcomes = s
            .on_message(&message(OWNER, i, "spam spam", t0 + Duration::milliseconds(i as i64 * 200)))
            .await;
        assert!(outcomes.iter().all(|o| *o == Outcome::Skipped(SkipReason::Protected)));
    }
    assert!(api.mutating_calls().is_empty());
    assert!(s.stats().enforcement.skipped_protected > 0);
}

#[tokio::test(start_paused = true)]
async fn unattributed_channel_delete_resolves_without_enforcement() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let outcomes = tokio::time::timeout(
        StdDuration::from_secs(30),
        s.on_channel_delete(G, 800, Utc::now()),
    )
    .await
    .expect("attribution must not hang");
    assert!(outcomes.is_empty());
    assert_eq!(api.audit_queries(), 1);
    assert!(api.mutating_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn high_ranked_role_deleter_is_left_alone() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let at = Utc::now();
    api.set_position(G, 45, 50);
    api.push_audit(
        G,
        AuditAction::RoleDelete,
        AuditEntry { acting_user_id: 45, target_id: Some(900), created_at: at },
    );
    assert!(s.on_role_delete(G, 900, at).await.is_empty());

    api.push_audit(
        G,
        AuditAction::RoleDelete,
        AuditEntry { acting_user_id: 46, target_id: Some(901), created_at: at },
    );
    let outcomes = s.on_role_delete(G, 901, at).await;
    assert_eq!(outcomes, vec![Outcome::Applied]);
    assert_eq!(api.kicks(), vec![(G, 46)]);
}

#[tokio::test(start_paused = true)]
async fn bot_added_by_stranger_is_kicked_with_inviter() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    let at = Utc::now();
    api.push_audit(
        G,
        AuditAction::BotAdd,
        AuditEntry { acting_user_id: 33, target_id: Some(700), created_at: at },
    );
    s.on_member_join(&MemberEvent { guild_id: G, user_id: 700, is_bot: true, at }).await;
    assert_eq!(api.kicks(), vec![(G, 700), (G, 33)]);
}

#[tokio::test]
async fn failed_enforcement_is_logged_and_abandoned() {
    let (api, ctx) = ctx();
    let s = ctx.sentinel();
    api.fail_writes(Some(PlatformError::PermissionDenied));
    let outcomes = s.on_message(&message(5, 1, "discord.gg/x", Utc::now())).await;
    assert_eq!(outcomes, vec![Outcome::Failed(PlatformError::PermissionDenied)]);
    assert!(api.mutating_calls().is_empty());
    assert!(
        api.calls()
            .iter()
            .any(|c| matches!(c, Call::NotifyLog { text, .. } if text.contains("delete_message")))
    );

    api.fail_writes(None);
    let outcomes = s.on_message(&message(5, 2, "discord.gg/x", Utc::now())).await;
    assert_eq!(outcomes, vec![Outcome::Applied]);
    assert_eq!(s.stats().enforcement.failed, 1);
}
