//! Flood wiadomości: N wiadomości (bez komend) w oknie -> usunięcie ostatniej + timeout albo kick.

use chrono::Duration;

use crate::config::{FloodConfig, FloodPolicy};
use crate::model::{Action, MessageEvent, SignalKind, Verdict};
use crate::trust::TrustRegistry;
use crate::window::{WindowKey, WindowTracker};

pub struct MessageFloodDetector {
    cfg: FloodConfig,
    command_prefix: String,
    window: WindowTracker,
}

impl MessageFloodDetector {
    pub fn new(cfg: FloodConfig, command_prefix: impl Into<String>) -> Self {
        Self {
            window: WindowTracker::new(cfg.rule),
            cfg,
            command_prefix: command_prefix.into(),
        }
    }

    fn is_command(&self, content: &str) -> bool {
        !self.command_prefix.is_empty() && content.trim_start().starts_with(&self.command_prefix)
    }

    pub fn handle(&self, trust: &TrustRegistry, ev: &MessageEvent) -> Vec<Verdict> {
        if self.is_command(&ev.content) || trust.is_whitelisted(ev.guild_id, ev.author_id) {
            return Vec::new();
        }

        let key = WindowKey::new(ev.guild_id, ev.author_id, SignalKind::Message);
        if self
            .window
            .record_and_drain(key, ev.at, (), self.cfg.rule.threshold)
            .is_none()
        {
            return Vec::new();
        }

        let reason = format!(
            "Flood wiadomości ({} w {} s)",
            self.cfg.rule.threshold, self.cfg.rule.window_seconds
        );
        let action = match self.cfg.policy {
            FloodPolicy::Timeout => Action::Timeout {
                until: ev.at + Duration::minutes(self.cfg.timeout_minutes as i64),
            },
            FloodPolicy::Kick => Action::Kick,
        };
        vec![
            Verdict::new(
                ev.guild_id,
                ev.author_id,
                Action::DeleteMessage { message: ev.message_ref() },
                reason.clone(),
            ),
            Verdict::new(ev.guild_id, ev.author_id, action, reason),
        ]
    }
}
