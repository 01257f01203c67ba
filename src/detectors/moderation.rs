//! Seria banów/kicków: sprawcę ustalamy z dziennika audytu, okno liczymy na moderatorze.

use crate::config::WindowRule;
use crate::correlator::PendingAttribution;
use crate::model::{Action, AuditAction, MemberEvent, SignalKind, Verdict};
use crate::window::{WindowKey, WindowTracker};

use super::DetectorCtx;

pub struct ModerationBurstDetector {
    rule: WindowRule,
    window: WindowTracker,
}

impl ModerationBurstDetector {
    pub fn new(rule: WindowRule) -> Self {
        Self { rule, window: WindowTracker::new(rule) }
    }

    /// `action`: [`AuditAction::MemberKick`] dla wyjścia członka, [`AuditAction::MemberBanAdd`] dla bana.
    pub async fn handle(&self, ctx: DetectorCtx<'_>, ev: &MemberEvent, action: AuditAction) -> Vec<Verdict> {
        let req = PendingAttribution {
            guild_id: ev.guild_id,
            target_id: Some(ev.user_id),
            action,
            observed_at: ev.at,
        };
        // zwykłe wyjście z serwera nie ma wpisu kick -> None
        let Some(moderator) = ctx.attribute(req).await else {
            return Vec::new();
        };
        if ctx.trust.is_protected(ctx.api, ev.guild_id, moderator).await {
            return Vec::new();
        }

        let key = WindowKey::new(ev.guild_id, moderator, SignalKind::Moderation);
        match self.window.record_and_drain(key, ev.at, (), self.rule.threshold) {
            Some(_) => vec![Verdict::new(
                ev.guild_id,
                moderator,
                Action::Kick,
                format!(
                    "Masowe bany/kicki ({} w {} s)",
                    self.rule.threshold, self.rule.window_seconds
                ),
            )],
            None => Vec::new(),
        }
    }
}
