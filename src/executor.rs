//! Wykonanie werdyktów na platformie.
//!
//! Kolejność przed każdym wywołaniem: twarda blokada na samego bota, ponowne sprawdzenie
//! ochrony, deduplikacja. Potem dokładnie jedno wywołanie API, bez ponowień i bez
//! eskalacji do innej akcji.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::model::{Action, Verdict};
use crate::platform::Platform;
use crate::trust::TrustRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Whitelist, właściciel, wyższa rola albo sam bot.
    Protected,
    /// Akcja na członku wymierzona w bota.
    Enforcer,
    /// Ta sama (lub mocniejsza) akcja już wykonana w horyzoncie deduplikacji.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
    Failed(PlatformError),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ObjectKey {
    Message(u64, u64),
    Webhook(u64),
}

/// Co zarezerwowano przed wywołaniem; przy błędzie cofamy dokładnie to.
#[derive(Debug, Clone, Copy)]
enum Reservation {
    Object(ObjectKey),
    Member {
        key: (u64, u64),
        slot: (u8, Instant),
        previous: Option<(u8, Instant)>,
    },
}

#[derive(Debug, Default)]
struct Counters {
    applied: AtomicU64,
    skipped_protected: AtomicU64,
    skipped_enforcer: AtomicU64,
    skipped_duplicate: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub applied: u64,
    pub skipped_protected: u64,
    pub skipped_enforcer: u64,
    pub skipped_duplicate: u64,
    pub failed: u64,
}

pub struct Executor {
    dedupe: Duration,
    member_actions: Cache<(u64, u64), (u8, Instant)>,
    object_deletes: Cache<ObjectKey, ()>,
    counters: Counters,
    log_to_channel: bool,
}

impl Executor {
    pub fn new(dedupe_seconds: u64, log_to_channel: bool) -> Self {
        let dedupe = Duration::from_secs(dedupe_seconds.max(1));
        Self {
            dedupe,
            member_actions: Cache::builder()
                .time_to_live(dedupe)
                .max_capacity(100_000)
                .build(),
            object_deletes: Cache::builder()
                .time_to_live(dedupe)
                .max_capacity(100_000)
                .build(),
            counters: Counters::default(),
            log_to_channel,
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        let c = &self.counters;
        ExecutorStats {
            applied: c.applied.load(Ordering::Relaxed),
            skipped_protected: c.skipped_protected.load(Ordering::Relaxed),
            skipped_enforcer: c.skipped_enforcer.load(Ordering::Relaxed),
            skipped_duplicate: c.skipped_duplicate.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
        }
    }

    /// Usunięcia przed akcjami na członkach (po kicku nie da się już sprzątać jego wiadomości).
    pub async fn apply_all(&self, api: &dyn Platform, trust: &TrustRegistry, mut verdicts: Vec<Verdict>) -> Vec<Outcome> {
        verdicts.sort_by_key(|v| v.action.member_severity().is_some());
        let mut out = Vec::with_capacity(verdicts.len());
        for v in &verdicts {
            out.push(self.apply(api, trust, v).await);
        }
        out
    }

    pub async fn apply(&self, api: &dyn Platform, trust: &TrustRegistry, verdict: &Verdict) -> Outcome {
        let Verdict { guild_id, actor_id, action, reason } = verdict;
        let (guild_id, actor_id) = (*guild_id, *actor_id);

        if action.member_severity().is_some() && actor_id == api.self_id() {
            self.counters.skipped_enforcer.fetch_add(1, Ordering::Relaxed);
            warn!(guild_id, actor_id, action = action.name(), "refusing member action against the bot itself");
            return Outcome::Skipped(SkipReason::Enforcer);
        }

        if trust.is_protected(api, guild_id, actor_id).await {
            self.counters.skipped_protected.fetch_add(1, Ordering::Relaxed);
            info!(guild_id, actor_id, action = action.name(), %reason, "actor protected, verdict dropped");
            return Outcome::Skipped(SkipReason::Protected);
        }

        let Some(reservation) = self.reserve(guild_id, actor_id, action) else {
            self.counters.skipped_duplicate.fetch_add(1, Ordering::Relaxed);
            debug!(guild_id, actor_id, action = action.name(), "duplicate enforcement skipped");
            return Outcome::Skipped(SkipReason::Duplicate);
        };

        let audit_reason = format!("[Tigris Sentinel] {reason}");
        let res = match action {
            Action::DeleteMessage { message } => api.delete_message(*message).await,
            Action::Kick => api.kick(guild_id, actor_id, &audit_reason).await,
            Action::Ban { purge_days } => api.ban(guild_id, actor_id, &audit_reason, *purge_days).await,
            Action::Timeout { until } => api.timeout(guild_id, actor_id, *until, &audit_reason).await,
            Action::DeleteWebhook { webhook } => api.delete_webhook(*webhook, &audit_reason).await,
        };

        match res {
            Ok(()) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                info!(guild_id, actor_id, action = action.name(), %reason, "enforcement applied");
                if !matches!(action, Action::DeleteMessage { .. }) {
                    self.log(api, guild_id, format!("🛡️ `{}` → <@{}> | Powód: {}", action.name(), actor_id, reason))
                        .await;
                }
                Outcome::Applied
            }
            Err(e) => {
                self.release(reservation);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(guild_id, actor_id, action = action.name(), %reason, error = ?e, "enforcement failed");
                self.log(
                    api,
                    guild_id,
                    format!("⚠️ Nie udało się wykonać `{}` na <@{}> ({}) | Powód: {}", action.name(), actor_id, e, reason),
                )
                .await;
                Outcome::Failed(e)
            }
        }
    }

    fn object_key(action: &Action) -> Option<ObjectKey> {
        match action {
            Action::DeleteMessage { message } => Some(ObjectKey::Message(message.channel_id, message.message_id)),
            Action::DeleteWebhook { webhook } => Some(ObjectKey::Webhook(webhook.webhook_id)),
            _ => None,
        }
    }

    /// Rezerwuje akcję; `None` = duplikat.
    fn reserve(&self, guild_id: u64, actor_id: u64, action: &Action) -> Option<Reservation> {
        if let Some(key) = Self::object_key(action) {
            return self
                .object_deletes
                .entry(key)
                .or_insert(())
                .is_fresh()
                .then_some(Reservation::Object(key));
        }
        let severity = action.member_severity().unwrap_or(0);
        let key = (guild_id, actor_id);
        let slot = (severity, Instant::now());
        let mut previous = None;
        // sprawdzenie i zapis w jednym kroku na wpisie cache
        let res = self.member_actions.entry(key).and_compute_with(|current| {
            let current = current.map(|e| e.into_value());
            if let Some((prev, at)) = current {
                if prev >= severity && slot.1.duration_since(at) < self.dedupe {
                    return Op::Nop;
                }
            }
            previous = current;
            Op::Put(slot)
        });
        match res {
            CompResult::Inserted(_) | CompResult::ReplacedWith(_) => {
                Some(Reservation::Member { key, slot, previous })
            }
            _ => None,
        }
    }

    /// Cofa rezerwację nieudanej akcji; wcześniejsza udana akcja zostaje w mocy.
    fn release(&self, reservation: Reservation) {
        match reservation {
            Reservation::Object(key) => self.object_deletes.invalidate(&key),
            Reservation::Member { key, slot, previous } => {
                let _ = self.member_actions.entry(key).and_compute_with(|current| {
                    // ktoś zdążył zarezerwować nowszą akcję: nie ruszamy
                    if current.map(|e| e.into_value()) != Some(slot) {
                        return Op::Nop;
                    }
                    match previous {
                        Some(prev) if slot.1.duration_since(prev.1) < self.dedupe => Op::Put(prev),
                        _ => Op::Remove,
                    }
                });
            }
        }
    }

    /// Liczba aktywnych wpisów deduplikacji akcji na członkach (po sprzątnięciu wygasłych).
    pub fn tracked_member_actions(&self) -> u64 {
        self.member_actions.run_pending_tasks();
        self.member_actions.entry_count()
    }

    async fn log(&self, api: &dyn Platform, guild_id: u64, text: String) {
        if !self.log_to_channel {
            return;
        }
        if let Err(e) = api.notify_log(guild_id, &text).await {
            debug!(guild_id, error = ?e, "security log post failed");
        }
    }
}
