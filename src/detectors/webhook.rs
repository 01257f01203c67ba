//! Tworzenie webhooków: każdy nowy webhook od niezaufanego twórcy jest usuwany od razu,
//! a twórca zbiera strike'i (bez okna). Po K strike'ach: kick i reset licznika.
//!
//! "Nowy" = id nieobecne w zbiorze widzianych dla gildii. Zbiór rośnie z każdym
//! webhookiem; [`WebhookDetector::compact_seen`] pozwala go przyciąć z zewnątrz.

use std::collections::HashSet;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::correlator::PendingAttribution;
use crate::model::{Action, AuditAction, Verdict, WebhookInfo, WebhooksEvent};

use super::DetectorCtx;

pub struct WebhookDetector {
    strike_limit: u32,
    seen: DashMap<u64, HashSet<u64>>,
    strikes: DashMap<(u64, u64), u32>,
}

impl WebhookDetector {
    pub fn new(strike_limit: u32) -> Self {
        Self {
            strike_limit: strike_limit.max(1),
            seen: DashMap::new(),
            strikes: DashMap::new(),
        }
    }

    /// Oznacza webhook jako widziany. `true` jeśli wcześniej go nie było.
    pub fn mark_seen(&self, guild_id: u64, webhook_id: u64) -> bool {
        self.seen.entry(guild_id).or_default().insert(webhook_id)
    }

    pub fn seen_count(&self, guild_id: u64) -> usize {
        self.seen.get(&guild_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Zostawia tylko id z `live`. Zwraca liczbę usuniętych wpisów.
    pub fn compact_seen(&self, guild_id: u64, live: &[u64]) -> usize {
        let Some(mut set) = self.seen.get_mut(&guild_id) else {
            return 0;
        };
        let before = set.len();
        let live: HashSet<u64> = live.iter().copied().collect();
        set.retain(|id| live.contains(id));
        before - set.len()
    }

    pub fn strikes(&self, guild_id: u64, actor_id: u64) -> u32 {
        self.strikes.get(&(guild_id, actor_id)).map(|s| *s).unwrap_or(0)
    }

    /// +1 strike; `true` gdy osiągnięto limit (licznik wraca do zera).
    fn strike(&self, guild_id: u64, actor_id: u64) -> bool {
        let mut s = self.strikes.entry((guild_id, actor_id)).or_insert(0);
        *s += 1;
        if *s >= self.strike_limit {
            *s = 0;
            true
        } else {
            false
        }
    }

    pub async fn handle(&self, ctx: DetectorCtx<'_>, ev: &WebhooksEvent) -> Vec<Verdict> {
        let hooks = match ctx.api.list_channel_webhooks(ev.guild_id, ev.channel_id).await {
            Ok(h) => h,
            Err(e) => {
                warn!(guild_id = ev.guild_id, channel_id = ev.channel_id, error = ?e, "webhook listing failed");
                return Vec::new();
            }
        };

        let fresh: Vec<WebhookInfo> = hooks
            .into_iter()
            .filter(|h| self.mark_seen(ev.guild_id, h.id))
            .collect();

        let mut out = Vec::new();
        for hook in fresh {
            let req = PendingAttribution {
                guild_id: ev.guild_id,
                target_id: Some(hook.id),
                action: AuditAction::WebhookCreate,
                observed_at: ev.at,
            };
            // brak świeżego wpisu = webhook sprzed naszej obserwacji albo twórca nieznany
            let Some(creator) = ctx.attribute(req).await else {
                debug!(guild_id = ev.guild_id, webhook_id = hook.id, "webhook creator unknown, skipping");
                continue;
            };
            if ctx.trust.is_protected(ctx.api, ev.guild_id, creator).await {
                continue;
            }

            out.push(Verdict::new(
                ev.guild_id,
                creator,
                Action::DeleteWebhook { webhook: hook.webhook_ref() },
                "Nieautoryzowany webhook",
            ));
            if self.strike(ev.guild_id, creator) {
                out.push(Verdict::new(
                    ev.guild_id,
                    creator,
                    Action::Kick,
                    format!("Tworzenie webhooków ({} strike'ów)", self.strike_limit),
                ));
            }
        }
        out
    }
}
