//! Nieautoryzowane zmiany struktury (kanały, role): jednorazowo, bez okna.

use crate::correlator::PendingAttribution;
use crate::model::{Action, StructureEvent, Verdict};

use super::DetectorCtx;

#[derive(Debug, Default)]
pub struct StructureDetector;

impl StructureDetector {
    pub async fn handle(&self, ctx: DetectorCtx<'_>, ev: &StructureEvent) -> Vec<Verdict> {
        let req = PendingAttribution {
            guild_id: ev.guild_id,
            target_id: Some(ev.target_id),
            action: ev.kind.audit_action(),
            observed_at: ev.at,
        };
        let Some(actor) = ctx.attribute(req).await else {
            return Vec::new();
        };
        if ctx.trust.is_protected(ctx.api, ev.guild_id, actor).await {
            return Vec::new();
        }
        vec![Verdict::new(
            ev.guild_id,
            actor,
            Action::Kick,
            format!("Nieautoryzowane {} ({})", ev.kind.label(), ev.target_id),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{Fixture, G, OWNER};
    use crate::model::{AuditAction, AuditEntry, StructureKind};
    use chrono::Utc;

    fn deleted_channel(f: &Fixture, actor: u64, channel: u64) -> StructureEvent {
        let at = Utc::now();
        f.api.push_audit(
            G,
            AuditAction::ChannelDelete,
            AuditEntry { acting_user_id: actor, target_id: Some(channel), created_at: at },
        );
        StructureEvent { guild_id: G, target_id: channel, kind: StructureKind::ChannelDelete, at }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_actor_is_kicked() {
        let f = Fixture::new();
        let ev = deleted_channel(&f, 30, 500);
        let v = StructureDetector.handle(f.ctx(), &ev).await;
        assert_eq!(v.len(), 1);
        assert_eq!((v[0].actor_id, &v[0].action), (30, &Action::Kick));
    }

    #[tokio::test(start_paused = true)]
    async fn trusted_actors_pass() {
        let f = Fixture::new();
        f.trust.add_to_whitelist(G, 31);
        let ev = deleted_channel(&f, 31, 501);
        assert!(StructureDetector.handle(f.ctx(), &ev).await.is_empty());
        let ev = deleted_channel(&f, OWNER, 502);
        assert!(StructureDetector.handle(f.ctx(), &ev).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn role_create_uses_role_audit_entries() {
        let f = Fixture::new();
        let at = Utc::now();
        f.api.push_audit(
            G,
            AuditAction::RoleCreate,
            AuditEntry { acting_user_id: 32, target_id: Some(900), created_at: at },
        );
        let ev = StructureEvent { guild_id: G, target_id: 900, kind: StructureKind::RoleCreate, at };
        let v = StructureDetector.handle(f.ctx(), &ev).await;
        assert_eq!(v[0].actor_id, 32);

        // wpis dla kanału o tym samym id nie pasuje
        let ev = StructureEvent { guild_id: G, target_id: 900, kind: StructureKind::ChannelCreate, at };
        assert!(StructureDetector.handle(f.ctx(), &ev).await.is_empty());
    }
}
