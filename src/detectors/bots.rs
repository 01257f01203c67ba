//! Zaproszenie bota przez kogoś bez uprawnień: kick bota i zapraszającego.

use tracing::{debug, warn};

use crate::config::BotConfig;
use crate::correlator::PendingAttribution;
use crate::model::{Action, AuditAction, MemberEvent, Verdict};

use super::DetectorCtx;

pub struct BotInviteDetector {
    cfg: BotConfig,
}

impl BotInviteDetector {
    pub fn new(cfg: BotConfig) -> Self {
        Self { cfg }
    }

    pub async fn handle(&self, ctx: DetectorCtx<'_>, ev: &MemberEvent) -> Vec<Verdict> {
        if !ev.is_bot {
            return Vec::new();
        }
        let req = PendingAttribution {
            guild_id: ev.guild_id,
            target_id: Some(ev.user_id),
            action: AuditAction::BotAdd,
            observed_at: ev.at,
        };
        let Some(inviter) = ctx.attribute(req).await else {
            if self.cfg.kick_unattributed {
                return vec![Verdict::new(ev.guild_id, ev.user_id, Action::Kick, "Bot bez ustalonego zapraszającego")];
            }
            debug!(guild_id = ev.guild_id, bot_id = ev.user_id, "bot inviter unknown, leaving bot alone");
            return Vec::new();
        };

        if self.is_authorized(ctx, ev.guild_id, inviter).await {
            return Vec::new();
        }

        let reason = format!("Nieautoryzowane dodanie bota (zaprosił {inviter})");
        vec![
            Verdict::new(ev.guild_id, ev.user_id, Action::Kick, reason.clone()),
            Verdict::new(ev.guild_id, inviter, Action::Kick, reason),
        ]
    }

    async fn is_authorized(&self, ctx: DetectorCtx<'_>, guild_id: u64, inviter: u64) -> bool {
        if ctx.trust.is_protected(ctx.api, guild_id, inviter).await {
            return true;
        }
        if self.cfg.allowed_inviter_roles.is_empty() {
            return false;
        }
        match ctx.api.member_roles(guild_id, inviter).await {
            Ok(roles) => roles.iter().any(|r| self.cfg.allowed_inviter_roles.contains(r)),
            Err(e) => {
                // bez danych o rolach nie karzemy
                warn!(guild_id, inviter, error = ?e, "inviter roles lookup failed");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{Fixture, G};
    use crate::model::AuditEntry;
    use chrono::Utc;

    const NEW_BOT: u64 = 600;
    const INVITER: u64 = 20;

    fn bot_joined(f: &Fixture, inviter: Option<u64>) -> MemberEvent {
        let at = Utc::now();
        if let Some(inviter) = inviter {
            f.api.push_audit(
                G,
                AuditAction::BotAdd,
                AuditEntry { acting_user_id: inviter, target_id: Some(NEW_BOT), created_at: at },
            );
        }
        MemberEvent { guild_id: G, user_id: NEW_BOT, is_bot: true, at }
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_inviter_and_bot_are_kicked() {
        let f = Fixture::new();
        let v = BotInviteDetector::new(BotConfig::default()).handle(f.ctx(), &bot_joined(&f, Some(INVITER))).await;
        let targets: Vec<u64> = v.iter().map(|v| v.actor_id).collect();
        assert_eq!(targets, vec![NEW_BOT, INVITER]);
        assert!(v.iter().all(|v| v.action == Action::Kick));
    }

    #[tokio::test(start_paused = true)]
    async fn allowed_role_or_whitelist_authorizes() {
        let f = Fixture::new();
        let d = BotInviteDetector::new(BotConfig { allowed_inviter_roles: vec![444], kick_unattributed: false });
        f.api.set_roles(G, INVITER, vec![1, 444]);
        assert!(d.handle(f.ctx(), &bot_joined(&f, Some(INVITER))).await.is_empty());

        f.api.set_roles(G, INVITER, vec![]);
        f.trust.add_to_whitelist(G, INVITER);
        assert!(d.handle(f.ctx(), &bot_joined(&f, Some(INVITER))).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_inviter_follows_config() {
        let f = Fixture::new();
        let lenient = BotInviteDetector::new(BotConfig::default());
        assert!(lenient.handle(f.ctx(), &bot_joined(&f, None)).await.is_empty());

        let strict = BotInviteDetector::new(BotConfig { allowed_inviter_roles: vec![], kick_unattributed: true });
        let v = strict.handle(f.ctx(), &bot_joined(&f, None)).await;
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].actor_id, NEW_BOT);
    }

    #[tokio::test]
    async fn humans_are_ignored() {
        let f = Fixture::new();
        let ev = MemberEvent { guild_id: G, user_id: 5, is_bot: false, at: Utc::now() };
        assert!(BotInviteDetector::new(BotConfig::default()).handle(f.ctx(), &ev).await.is_empty());
        assert_eq!(f.api.audit_queries(), 0);
    }
}
