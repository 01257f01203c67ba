//! Masowe wzmianki: @everyone/@here, wzmianka roli albo za dużo wzmianek użytkowników
//! w jednej wiadomości. Po N takich wiadomościach w oknie: kick + usunięcie WSZYSTKICH
//! oflagowanych wiadomości z okna.

use crate::config::MentionConfig;
use crate::model::{Action, MessageEvent, MessageRef, SignalKind, Verdict};
use crate::trust::TrustRegistry;
use crate::window::{WindowKey, WindowTracker};

pub struct MentionDetector {
    cfg: MentionConfig,
    window: WindowTracker<MessageRef>,
}

impl MentionDetector {
    pub fn new(cfg: MentionConfig) -> Self {
        Self { window: WindowTracker::new(cfg.rule), cfg }
    }

    fn over_cap(&self, ev: &MessageEvent) -> bool {
        self.cfg.max_mentions_per_message > 0 && ev.user_mentions >= self.cfg.max_mentions_per_message
    }

    pub fn handle(&self, trust: &TrustRegistry, ev: &MessageEvent) -> Vec<Verdict> {
        let over_cap = self.over_cap(ev);
        let flagged = ev.mentions_everyone || !ev.role_mentions.is_empty() || over_cap;
        if !flagged || trust.is_whitelisted(ev.guild_id, ev.author_id) {
            return Vec::new();
        }

        let mut out = Vec::new();
        if over_cap {
            out.push(Verdict::new(
                ev.guild_id,
                ev.author_id,
                Action::DeleteMessage { message: ev.message_ref() },
                format!("Za dużo wzmianek w jednej wiadomości ({})", ev.user_mentions),
            ));
        }

        let key = WindowKey::new(ev.guild_id, ev.author_id, SignalKind::Mention);
        if let Some(burst) = self
            .window
            .record_and_drain(key, ev.at, ev.message_ref(), self.cfg.rule.threshold)
        {
            let reason = format!(
                "Masowe wzmianki ({} w {} s)",
                self.cfg.rule.threshold, self.cfg.rule.window_seconds
            );
            for (_, message) in burst {
                if over_cap && message == ev.message_ref() {
                    continue;
                }
                out.push(Verdict::new(
                    ev.guild_id,
                    ev.author_id,
                    Action::DeleteMessage { message },
                    reason.clone(),
                ));
            }
            out.push(Verdict::new(ev.guild_id, ev.author_id, Action::Kick, reason));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WindowRule;
    use chrono::{Duration, Utc};

    fn msg(id: u64, at: chrono::DateTime<Utc>) -> MessageEvent {
        MessageEvent {
            guild_id: 1,
            channel_id: 10,
            message_id: id,
            author_id: 5,
            author_is_bot: false,
            content: "@everyone".into(),
            mentions_everyone: true,
            user_mentions: 0,
            role_mentions: vec![],
            at,
        }
    }

    fn deleted(v: &[Verdict]) -> Vec<u64> {
        v.iter()
            .filter_map(|v| match v.action {
                Action::DeleteMessage { message } => Some(message.message_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn threshold_deletes_every_flagged_message() {
        let d = MentionDetector::new(MentionConfig::default());
        let trust = TrustRegistry::new();
        let t0 = Utc::now();
        assert!(d.handle(&trust, &msg(1, t0)).is_empty());
        assert!(d.handle(&trust, &msg(2, t0 + Duration::seconds(5))).is_empty());
        let v = d.handle(&trust, &msg(3, t0 + Duration::seconds(9)));
        assert_eq!(deleted(&v), vec![1, 2, 3]);
        assert_eq!(v.last().map(|v| &v.action), Some(&Action::Kick));
    }

    #[test]
    fn plain_messages_are_ignored_and_role_pings_count() {
        let d = MentionDetector::new(MentionConfig { rule: WindowRule::new(1, 30), ..Default::default() });
        let trust = TrustRegistry::new();
        let mut plain = msg(1, Utc::now());
        plain.mentions_everyone = false;
        assert!(d.handle(&trust, &plain).is_empty());

        let mut role = plain.clone();
        role.role_mentions = vec![77];
        let v = d.handle(&trust, &role);
        assert_eq!(deleted(&v), vec![1]);
    }

    #[test]
    fn mention_cap_deletes_immediately_once() {
        let d = MentionDetector::new(MentionConfig { rule: WindowRule::new(2, 30), max_mentions_per_message: 5 });
        let trust = TrustRegistry::new();
        let t0 = Utc::now();
        let mut m = msg(1, t0);
        m.mentions_everyone = false;
        m.user_mentions = 6;
        assert_eq!(deleted(&d.handle(&trust, &m)), vec![1]);

        m.message_id = 2;
        let v = d.handle(&trust, &m);
        assert_eq!(deleted(&v), vec![2, 1]);
        assert_eq!(v.iter().filter(|v| v.action == Action::Kick).count(), 1);
    }
}
