//! Silnik: cały stan (okna, strike'i, whitelisty, deduplikacja) w jednym obiekcie,
//! tworzonym przy starcie i przekazywanym dalej jako `Arc<Sentinel>`.
//! Dla każdego rodzaju zdarzenia jest jedna metoda `on_*`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GuardConfig;
use crate::correlator::AuditCorrelator;
use crate::detectors::{
    BotInviteDetector, DetectorCtx, InviteDetector, MentionDetector, MessageFloodDetector,
    ModerationBurstDetector, StructureDetector, WebhookDetector,
};
use crate::executor::{Executor, ExecutorStats, Outcome};
use crate::model::{
    AuditAction, MemberEvent, MessageEvent, StructureEvent, StructureKind, Verdict, WebhookInfo,
    WebhookRef, WebhooksEvent,
};
use crate::platform::Platform;
use crate::trust::TrustRegistry;

const RESTART_NOTICE: &str = "🔄 Tigris Sentinel został uruchomiony ponownie. Whitelista i blacklista \
są trzymane tylko w pamięci, sprawdź je i w razie potrzeby dodaj wpisy ponownie (`/sentinel`).";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SentinelStats {
    pub enforcement: ExecutorStats,
    pub scheduled_webhook_expiries: usize,
    pub guilds_notified: usize,
}

pub struct Sentinel {
    cfg: GuardConfig,
    api: Arc<dyn Platform>,
    trust: TrustRegistry,
    correlator: AuditCorrelator,
    executor: Executor,

    invite: InviteDetector,
    flood: MessageFloodDetector,
    mention: MentionDetector,
    moderation: ModerationBurstDetector,
    structure: StructureDetector,
    bots: BotInviteDetector,
    webhooks: WebhookDetector,

    notified: DashSet<u64>,
    expiries: Arc<DashMap<u64, CancellationToken>>,
    shutdown: CancellationToken,
}

impl Sentinel {
    pub fn new(cfg: GuardConfig, api: Arc<dyn Platform>) -> Self {
        Self {
            trust: TrustRegistry::new(),
            correlator: AuditCorrelator::new(&cfg.correlator),
            executor: Executor::new(cfg.dedupe_seconds, cfg.log_channel.is_some()),
            invite: InviteDetector::new(cfg.invite),
            flood: MessageFloodDetector::new(cfg.flood.clone(), cfg.command_prefix.clone()),
            mention: MentionDetector::new(cfg.mention.clone()),
            moderation: ModerationBurstDetector::new(cfg.moderation),
            structure: StructureDetector,
            bots: BotInviteDetector::new(cfg.bots.clone()),
            webhooks: WebhookDetector::new(cfg.webhook.strike_limit),
            notified: DashSet::new(),
            expiries: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
            api,
            cfg,
        }
    }

    pub fn trust(&self) -> &TrustRegistry {
        &self.trust
    }

    pub fn api(&self) -> &dyn Platform {
        self.api.as_ref()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.cfg
    }

    pub fn stats(&self) -> SentinelStats {
        SentinelStats {
            enforcement: self.executor.stats(),
            scheduled_webhook_expiries: self.expiries.len(),
            guilds_notified: self.notified.len(),
        }
    }

    fn ctx(&self) -> DetectorCtx<'_> {
        DetectorCtx {
            api: self.api.as_ref(),
            trust: &self.trust,
            correlator: &self.correlator,
            cancel: &self.shutdown,
        }
    }

    async fn enforce(&self, verdicts: Vec<Verdict>) -> Vec<Outcome> {
        if verdicts.is_empty() {
            return Vec::new();
        }
        self.executor.apply_all(self.api.as_ref(), &self.trust, verdicts).await
    }

    /* ==============================
       Zdarzenia
       ============================== */

    pub async fn on_message(&self, ev: &MessageEvent) -> Vec<Outcome> {
        if ev.author_is_bot || ev.author_id == self.api.self_id() {
            return Vec::new();
        }
        let mut verdicts = self.invite.handle(&self.trust, ev);
        verdicts.extend(self.mention.handle(&self.trust, ev));
        verdicts.extend(self.flood.handle(&self.trust, ev));
        self.enforce(verdicts).await
    }

    pub async fn on_member_join(&self, ev: &MemberEvent) -> Vec<Outcome> {
        if !ev.is_bot || ev.user_id == self.api.self_id() {
            return Vec::new();
        }
        let verdicts = self.bots.handle(self.ctx(), ev).await;
        self.enforce(verdicts).await
    }

    /// Wyjście członka: liczy się tylko, jeśli dziennik audytu pokaże kicka.
    pub async fn on_member_remove(&self, ev: &MemberEvent) -> Vec<Outcome> {
        let verdicts = self.moderation.handle(self.ctx(), ev, AuditAction::MemberKick).await;
        self.enforce(verdicts).await
    }

    pub async fn on_member_ban(&self, ev: &MemberEvent) -> Vec<Outcome> {
        let verdicts = self.moderation.handle(self.ctx(), ev, AuditAction::MemberBanAdd).await;
        self.enforce(verdicts).await
    }

    pub async fn on_webhooks_update(&self, ev: &WebhooksEvent) -> Vec<Outcome> {
        let verdicts = self.webhooks.handle(self.ctx(), ev).await;
        self.enforce(verdicts).await
    }

    pub async fn on_structure_change(&self, ev: &StructureEvent) -> Vec<Outcome> {
        let verdicts = self.structure.handle(self.ctx(), ev).await;
        self.enforce(verdicts).await
    }

    pub async fn on_channel_create(&self, guild_id: u64, channel_id: u64, at: DateTime<Utc>) -> Vec<Outcome> {
        self.on_structure_change(&StructureEvent { guild_id, target_id: channel_id, kind: StructureKind::ChannelCreate, at })
            .await
    }

    pub async fn on_channel_delete(&self, guild_id: u64, channel_id: u64, at: DateTime<Utc>) -> Vec<Outcome> {
        self.on_structure_change(&StructureEvent { guild_id, target_id: channel_id, kind: StructureKind::ChannelDelete, at })
            .await
    }

    pub async fn on_role_create(&self, guild_id: u64, role_id: u64, at: DateTime<Utc>) -> Vec<Outcome> {
        self.on_structure_change(&StructureEvent { guild_id, target_id: role_id, kind: StructureKind::RoleCreate, at })
            .await
    }

    pub async fn on_role_delete(&self, guild_id: u64, role_id: u64, at: DateTime<Utc>) -> Vec<Outcome> {
        self.on_structure_change(&StructureEvent { guild_id, target_id: role_id, kind: StructureKind::RoleDelete, at })
            .await
    }

    /// Pierwsza dostępność gildii po starcie: jednorazowy DM do właściciela.
    /// Zwraca `true`, jeśli wiadomość została wysłana.
    pub async fn on_guild_available(&self, guild_id: u64) -> bool {
        if !self.cfg.notify_owners_on_start || !self.notified.insert(guild_id) {
            return false;
        }
        match self.api.notify_owner(guild_id, RESTART_NOTICE).await {
            Ok(()) => {
                info!(guild_id, "restart notice sent to guild owner");
                true
            }
            Err(e) => {
                warn!(guild_id, error = ?e, "restart notice failed");
                false
            }
        }
    }

    /* ==============================
       Webhooki na żądanie
       ============================== */

    /// Tworzy webhook dla zaufanego wywołującego i planuje jego usunięcie po `retention_days`.
    pub async fn create_webhook(&self, guild_id: u64, channel_id: u64, caller_id: u64, name: &str) -> Result<WebhookInfo> {
        if !self.trust.is_whitelisted(guild_id, caller_id) {
            bail!("caller {caller_id} is not whitelisted in guild {guild_id}");
        }
        let hook = self.api.create_webhook(guild_id, channel_id, name).await?;
        // nasz własny webhook nie może wyglądać na "nowy" przy najbliższym webhooks_update
        self.webhooks.mark_seen(guild_id, hook.id);
        let retention = Duration::from_secs(self.cfg.webhook.retention_days.saturating_mul(86_400));
        self.schedule_webhook_expiry(guild_id, hook.webhook_ref(), retention);
        info!(guild_id, channel_id, caller_id, webhook_id = hook.id, "on-demand webhook created");
        Ok(hook)
    }

    pub fn schedule_webhook_expiry(&self, guild_id: u64, webhook: WebhookRef, after: Duration) {
        let token = self.shutdown.child_token();
        if let Some(old) = self.expiries.insert(webhook.webhook_id, token.clone()) {
            old.cancel();
        }
        let api = Arc::clone(&self.api);
        let expiries = Arc::clone(&self.expiries);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(guild_id, webhook_id = webhook.webhook_id, "webhook expiry cancelled");
                    return;
                }
                _ = tokio::time::sleep(after) => {}
            }
            expiries.remove(&webhook.webhook_id);
            match api.delete_webhook(webhook, "[Tigris Sentinel] Wygasł okres ważności webhooka").await {
                Ok(()) => info!(guild_id, webhook_id = webhook.webhook_id, "expired webhook deleted"),
                Err(e) => warn!(guild_id, webhook_id = webhook.webhook_id, error = ?e, "expired webhook delete failed"),
            }
        });
    }

    /// `true`, jeśli było co anulować.
    pub fn cancel_webhook_expiry(&self, webhook_id: u64) -> bool {
        match self.expiries.remove(&webhook_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn compact_seen_webhooks(&self, guild_id: u64, live_ids: &[u64]) -> usize {
        self.webhooks.compact_seen(guild_id, live_ids)
    }

    pub fn webhook_strikes(&self, guild_id: u64, actor_id: u64) -> u32 {
        self.webhooks.strikes(guild_id, actor_id)
    }

    /// Anuluje czekające korelacje i zaplanowane wygaśnięcia.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockPlatform};

    const G: u64 = 1;
    const BOT: u64 = 99;
    const OWNER: u64 = 7;

    fn sentinel() -> (Arc<MockPlatform>, Sentinel) {
        let api = Arc::new(MockPlatform::new(BOT).with_owner(G, OWNER));
        let s = Sentinel::new(GuardConfig::default(), api.clone());
        (api, s)
    }

    fn msg(author: u64, is_bot: bool) -> MessageEvent {
        MessageEvent {
            guild_id: G,
            channel_id: 3,
            message_id: 4,
            author_id: author,
            author_is_bot: is_bot,
            content: "discord.gg/spam".into(),
            mentions_everyone: true,
            user_mentions: 0,
            role_mentions: vec![],
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn bot_and_self_messages_are_ignored() {
        let (api, s) = sentinel();
        assert!(s.on_message(&msg(BOT, true)).await.is_empty());
        assert!(s.on_message(&msg(55, true)).await.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn invite_and_mention_on_one_message_delete_once() {
        let (api, s) = sentinel();
        let mut m = msg(5, false);
        m.user_mentions = 8;
        let outcomes = s.on_message(&m).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(api.deleted_messages().len(), 1);
        assert_eq!(s.stats().enforcement.skipped_duplicate, 1);
    }

    #[tokio::test]
    async fn restart_notice_goes_out_once_per_guild() {
        let (api, s) = sentinel();
        assert!(s.on_guild_available(G).await);
        assert!(!s.on_guild_available(G).await);
        let dms = api.calls().into_iter().filter(|c| matches!(c, Call::NotifyOwner { .. })).count();
        assert_eq!(dms, 1);
        assert_eq!(s.stats().guilds_notified, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_webhook_expires_after_retention() {
        let (api, s) = sentinel();
        assert!(s.create_webhook(G, 3, 20, "relay").await.is_err());

        s.trust().add_to_whitelist(G, 20);
        let hook = s.create_webhook(G, 3, 20, "relay").await.unwrap();
        assert_eq!(s.stats().scheduled_webhook_expiries, 1);

        tokio::time::sleep(Duration::from_secs(6 * 86_400)).await;
        assert!(api.deleted_webhooks().is_empty());
        tokio::time::sleep(Duration::from_secs(86_400 + 1)).await;
        assert_eq!(api.deleted_webhooks(), vec![hook.id]);
        assert_eq!(s.stats().scheduled_webhook_expiries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_expiry_keeps_the_webhook() {
        let (api, s) = sentinel();
        s.trust().add_to_whitelist(G, 20);
        let hook = s.create_webhook(G, 3, 20, "relay").await.unwrap();
        assert!(s.cancel_webhook_expiry(hook.id));
        assert!(!s.cancel_webhook_expiry(hook.id));
        tokio::time::sleep(Duration::from_secs(8 * 86_400)).await;
        assert!(api.deleted_webhooks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn own_webhook_is_not_treated_as_new() {
        let (api, s) = sentinel();
        s.trust().add_to_whitelist(G, 20);
        s.create_webhook(G, 3, 20, "relay").await.unwrap();
        let outcomes = s.on_webhooks_update(&WebhooksEvent { guild_id: G, channel_id: 3, at: Utc::now() }).await;
        assert!(outcomes.is_empty());
        assert_eq!(api.audit_queries(), 0);
    }
}
