//! Znormalizowane zdarzenia platformy, werdykty i wpisy dziennika audytu.
//! Identyfikatory (gildie, użytkownicy, kanały) to surowe `u64` – tak jak w API Discorda.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/* ==============================
   Referencje do obiektów
   ============================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookRef {
    pub webhook_id: u64,
    pub channel_id: Option<u64>,
}

/// Rodzaj sygnału liczonego w oknie czasowym (jedno okno na detektor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Invite,
    Message,
    Mention,
    Moderation,
}

/* ==============================
   Werdykty
   ============================== */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    DeleteMessage { message: MessageRef },
    Kick,
    Ban { purge_days: u8 },
    Timeout { until: DateTime<Utc> },
    DeleteWebhook { webhook: WebhookRef },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::DeleteMessage { .. } => "delete_message",
            Action::Kick => "kick",
            Action::Ban { .. } => "ban",
            Action::Timeout { .. } => "timeout",
            Action::DeleteWebhook { .. } => "delete_webhook",
        }
    }

    /// Siła akcji wobec członka (timeout < kick < ban). `None` dla usuwania obiektów.
    pub fn member_severity(&self) -> Option<u8> {
        match self {
            Action::Timeout { .. } => Some(1),
            Action::Kick => Some(2),
            Action::Ban { .. } => Some(3),
            Action::DeleteMessage { .. } | Action::DeleteWebhook { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub guild_id: u64,
    pub actor_id: u64,
    pub action: Action,
    pub reason: String,
}

impl Verdict {
    pub fn new(guild_id: u64, actor_id: u64, action: Action, reason: impl Into<String>) -> Self {
        Self {
            guild_id,
            actor_id,
            action,
            reason: reason.into(),
        }
    }
}

/* ==============================
   Dziennik audytu
   ============================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    ChannelCreate,
    ChannelDelete,
    RoleCreate,
    RoleDelete,
    MemberKick,
    MemberBanAdd,
    WebhookCreate,
    BotAdd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub acting_user_id: u64,
    pub target_id: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/* ==============================
   Zdarzenia
   ============================== */

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_is_bot: bool,
    pub content: String,
    pub mentions_everyone: bool,
    pub user_mentions: usize,
    pub role_mentions: Vec<u64>,
    pub at: DateTime<Utc>,
}

impl MessageEvent {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id,
            message_id: self.message_id,
        }
    }
}

/// Dołączenie / wyjście / ban członka.
#[derive(Debug, Clone, Copy)]
pub struct MemberEvent {
    pub guild_id: u64,
    pub user_id: u64,
    pub is_bot: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct WebhooksEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    ChannelCreate,
    ChannelDelete,
    RoleCreate,
    RoleDelete,
}

impl StructureKind {
    pub fn audit_action(self) -> AuditAction {
        match self {
            StructureKind::ChannelCreate => AuditAction::ChannelCreate,
            StructureKind::ChannelDelete => AuditAction::ChannelDelete,
            StructureKind::RoleCreate => AuditAction::RoleCreate,
            StructureKind::RoleDelete => AuditAction::RoleDelete,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StructureKind::ChannelCreate => "utworzenie kanału",
            StructureKind::ChannelDelete => "usunięcie kanału",
            StructureKind::RoleCreate => "utworzenie roli",
            StructureKind::RoleDelete => "usunięcie roli",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StructureEvent {
    pub guild_id: u64,
    pub target_id: u64,
    pub kind: StructureKind,
    pub at: DateTime<Utc>,
}

/// Webhook widziany przez platformę.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookInfo {
    pub id: u64,
    pub channel_id: Option<u64>,
    pub name: Option<String>,
    pub url: Option<String>,
}

impl WebhookInfo {
    pub fn webhook_ref(&self) -> WebhookRef {
        WebhookRef {
            webhook_id: self.id,
            channel_id: self.channel_id,
        }
    }
}
