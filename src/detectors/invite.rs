//! Spam zaproszeniami: każda wiadomość z linkiem do zaproszenia leci do kosza,
//! a po N takich wiadomościach w oknie autor dostaje kicka.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::WindowRule;
use crate::model::{Action, MessageEvent, SignalKind, Verdict};
use crate::trust::TrustRegistry;
use crate::window::{WindowKey, WindowTracker};

static INVITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:discord(?:app)?\.com/invite|discord\.gg|dsc\.gg)/[a-z0-9-]+").unwrap()
});

pub fn contains_invite(content: &str) -> bool {
    INVITE_RE.is_match(content)
}

pub struct InviteDetector {
    rule: WindowRule,
    window: WindowTracker,
}

impl InviteDetector {
    pub fn new(rule: WindowRule) -> Self {
        Self { rule, window: WindowTracker::new(rule) }
    }

    pub fn handle(&self, trust: &TrustRegistry, ev: &MessageEvent) -> Vec<Verdict> {
        if !contains_invite(&ev.content) || trust.is_whitelisted(ev.guild_id, ev.author_id) {
            return Vec::new();
        }

        let mut out = vec![Verdict::new(
            ev.guild_id,
            ev.author_id,
            Action::DeleteMessage { message: ev.message_ref() },
            "Link z zaproszeniem",
        )];

        let key = WindowKey::new(ev.guild_id, ev.author_id, SignalKind::Invite);
        if self
            .window
            .record_and_drain(key, ev.at, (), self.rule.threshold)
            .is_some()
        {
            out.push(Verdict::new(
                ev.guild_id,
                ev.author_id,
                Action::Kick,
                format!(
                    "Spam zaproszeniami ({} w {} s)",
                    self.rule.threshold, self.rule.window_seconds
                ),
            ));
        }
        out
    }

    pub fn pending(&self, guild_id: u64, actor_id: u64, now: chrono::DateTime<chrono::Utc>) -> usize {
        self.window
            .peek(&WindowKey::new(guild_id, actor_id, SignalKind::Invite), now)
            .len()
    }
}
