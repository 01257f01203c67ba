//! `Platform` na serenity (REST). Statusy HTTP mapujemy na [`PlatformError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::all::{
    ChannelId, ChannelType, Colour, CreateChannel, CreateEmbed, CreateMessage, CreateWebhook,
    EditMember, GuildId, Http, MessageId, Timestamp, UserId, WebhookId,
};
use serenity::async_trait;
use serenity::model::guild::audit_log::{
    Action as AuditLogAction, ChannelAction, MemberAction, RoleAction, WebhookAction,
};
use tracing::{debug, warn};

use crate::error::{PlatformError, PlatformResult};
use crate::model::{AuditAction, AuditEntry, MessageRef, WebhookInfo, WebhookRef};
use crate::platform::Platform;

const DISCORD_EPOCH_MS: u64 = 1_420_070_400_000;

/// Czas utworzenia obiektu zakodowany w snowflake'u.
pub fn snowflake_time(id: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(((id >> 22) + DISCORD_EPOCH_MS) as i64).unwrap_or_else(Utc::now)
}

pub fn classify(err: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(http_err) = &err {
        match http_err.status_code().map(|s| s.as_u16()) {
            Some(401 | 403) => return PlatformError::PermissionDenied,
            Some(404) => return PlatformError::NotFound,
            Some(429) => return PlatformError::RateLimited,
            Some(408 | 504) => return PlatformError::Timeout,
            _ => {}
        }
    }
    PlatformError::Transport(err.to_string())
}

fn audit_log_action(action: AuditAction) -> AuditLogAction {
    match action {
        AuditAction::ChannelCreate => AuditLogAction::Channel(ChannelAction::Create),
        AuditAction::ChannelDelete => AuditLogAction::Channel(ChannelAction::Delete),
        AuditAction::RoleCreate => AuditLogAction::Role(RoleAction::Create),
        AuditAction::RoleDelete => AuditLogAction::Role(RoleAction::Delete),
        AuditAction::MemberKick => AuditLogAction::Member(MemberAction::Kick),
        AuditAction::MemberBanAdd => AuditLogAction::Member(MemberAction::BanAdd),
        AuditAction::BotAdd => AuditLogAction::Member(MemberAction::BotAdd),
        AuditAction::WebhookCreate => AuditLogAction::Webhook(WebhookAction::Create),
    }
}

pub struct SerenityApi {
    http: Arc<Http>,
    self_id: AtomicU64,
    log_channel: Option<String>,
    log_channels: DashMap<u64, ChannelId>,
}

impl SerenityApi {
    pub fn new(token: &str, log_channel: Option<String>) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            self_id: AtomicU64::new(0),
            log_channel: log_channel.filter(|n| !n.trim().is_empty()),
            log_channels: DashMap::new(),
        }
    }

    /// Ustawiane w `ready`, gdy znamy już własne id.
    pub fn set_self_id(&self, id: u64) {
        self.self_id.store(id, Ordering::Relaxed);
    }

    /// Kanał logów gildii; tworzony, jeśli go nie ma.
    async fn log_channel_id(&self, guild_id: u64) -> PlatformResult<Option<ChannelId>> {
        let Some(name) = self.log_channel.as_deref() else {
            return Ok(None);
        };
        if let Some(id) = self.log_channels.get(&guild_id) {
            return Ok(Some(*id));
        }

        let gid = GuildId::new(guild_id);
        let channels = gid.channels(&self.http).await.map_err(classify)?;
        let existing = channels
            .values()
            .find(|c| c.kind == ChannelType::Text && c.name == name)
            .map(|c| c.id);

        let id = match existing {
            Some(id) => id,
            None => {
                let created = gid
                    .create_channel(&self.http, CreateChannel::new(name).kind(ChannelType::Text))
                    .await
                    .map_err(classify)?;
                debug!(guild_id, channel = %created.id, "security log channel created");
                created.id
            }
        };
        self.log_channels.insert(guild_id, id);
        Ok(Some(id))
    }
}

#[async_trait]
impl Platform for SerenityApi {
    fn self_id(&self) -> u64 {
        self.self_id.load(Ordering::Relaxed)
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        ChannelId::new(message.channel_id)
            .delete_message(&self.http, MessageId::new(message.message_id))
            .await
            .map_err(classify)
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> PlatformResult<()> {
        GuildId::new(guild_id)
            .kick_with_reason(&self.http, UserId::new(user_id), reason)
            .await
            .map_err(classify)
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str, purge_days: u8) -> PlatformResult<()> {
        GuildId::new(guild_id)
            .ban_with_reason(&self.http, UserId::new(user_id), purge_days.min(7), reason)
            .await
            .map_err(classify)
    }

    async fn timeout(&self, guild_id: u64, user_id: u64, until: DateTime<Utc>, reason: &str) -> PlatformResult<()> {
        let until = Timestamp::from_unix_timestamp(until.timestamp())
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        GuildId::new(guild_id)
            .edit_member(
                &self.http,
                UserId::new(user_id),
                EditMember::new()
                    .disable_communication_until_datetime(until)
                    .audit_log_reason(reason),
            )
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn delete_webhook(&self, webhook: WebhookRef, reason: &str) -> PlatformResult<()> {
        self.http
            .delete_webhook(WebhookId::new(webhook.webhook_id), Some(reason))
            .await
            .map_err(classify)
    }

    async fn query_audit_log(&self, guild_id: u64, action: AuditAction, limit: u8) -> PlatformResult<Vec<AuditEntry>> {
        let logs = GuildId::new(guild_id)
            .audit_logs(&self.http, Some(audit_log_action(action)), None, None, Some(limit))
            .await
            .map_err(classify)?;
        Ok(logs
            .entries
            .into_iter()
            .map(|e| AuditEntry {
                acting_user_id: e.user_id.get(),
                target_id: e.target_id.map(|t| t.get()),
                created_at: snowflake_time(e.id.get()),
            })
            .collect())
    }

    async fn list_channel_webhooks(&self, _guild_id: u64, channel_id: u64) -> PlatformResult<Vec<WebhookInfo>> {
        let hooks = ChannelId::new(channel_id).webhooks(&self.http).await.map_err(classify)?;
        Ok(hooks
            .into_iter()
            .map(|h| WebhookInfo {
                id: h.id.get(),
                channel_id: h.channel_id.map(|c| c.get()),
                url: h.url().ok(),
                name: h.name,
            })
            .collect())
    }

    async fn create_webhook(&self, _guild_id: u64, channel_id: u64, name: &str) -> PlatformResult<WebhookInfo> {
        let h = ChannelId::new(channel_id)
            .create_webhook(&self.http, CreateWebhook::new(name))
            .await
            .map_err(classify)?;
        Ok(WebhookInfo {
            id: h.id.get(),
            channel_id: Some(channel_id),
            url: h.url().ok(),
            name: h.name,
        })
    }

    async fn guild_owner(&self, guild_id: u64) -> PlatformResult<u64> {
        let guild = GuildId::new(guild_id)
            .to_partial_guild(&self.http)
            .await
            .map_err(classify)?;
        Ok(guild.owner_id.get())
    }

    async fn top_role_position(&self, guild_id: u64, user_id: u64) -> PlatformResult<i64> {
        let gid = GuildId::new(guild_id);
        let member = gid.member(&self.http, UserId::new(user_id)).await.map_err(classify)?;
        let roles = gid.roles(&self.http).await.map_err(classify)?;
        Ok(member
            .roles
            .iter()
            .filter_map(|rid| roles.get(rid).map(|r| r.position))
            .max()
            .unwrap_or(0) as i64)
    }

    async fn member_roles(&self, guild_id: u64, user_id: u64) -> PlatformResult<Vec<u64>> {
        let member = GuildId::new(guild_id)
            .member(&self.http, UserId::new(user_id))
            .await
            .map_err(classify)?;
        Ok(member.roles.iter().map(|r| r.get()).collect())
    }

    async fn notify_log(&self, guild_id: u64, text: &str) -> PlatformResult<()> {
        let Some(channel) = self.log_channel_id(guild_id).await? else {
            return Ok(());
        };
        let embed = CreateEmbed::new()
            .title("🛡️ Tigris Sentinel")
            .colour(Colour::new(0xE67E22))
            .description(text)
            .timestamp(Timestamp::now());
        if let Err(e) = channel
            .send_message(&self.http, CreateMessage::new().add_embed(embed))
            .await
        {
            // kanał mógł zniknąć; następnym razem szukamy od nowa
            self.log_channels.remove(&guild_id);
            warn!(guild_id, error = ?e, "security log message failed");
            return Err(classify(e));
        }
        Ok(())
    }

    async fn notify_owner(&self, guild_id: u64, text: &str) -> PlatformResult<()> {
        let owner = self.guild_owner(guild_id).await?;
        UserId::new(owner)
            .direct_message(&self.http, CreateMessage::new().content(text))
            .await
            .map(|_| ())
            .map_err(classify)
    }
}
