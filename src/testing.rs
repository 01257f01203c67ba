//! Atrapa platformy do testów: trzyma stan gildii w pamięci i zapisuje każde wywołanie.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serenity::async_trait;

use crate::error::{PlatformError, PlatformResult};
use crate::model::{AuditAction, AuditEntry, MessageRef, WebhookInfo, WebhookRef};
use crate::platform::Platform;

/// Pozycja roli bota w atrapie (zwykli użytkownicy mają 0).
pub const MOCK_SELF_POSITION: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DeleteMessage(MessageRef),
    Kick { guild_id: u64, user_id: u64, reason: String },
    Ban { guild_id: u64, user_id: u64, reason: String, purge_days: u8 },
    Timeout { guild_id: u64, user_id: u64, until: DateTime<Utc> },
    DeleteWebhook(WebhookRef),
    CreateWebhook { guild_id: u64, channel_id: u64, name: String },
    NotifyLog { guild_id: u64, text: String },
    NotifyOwner { guild_id: u64, text: String },
}

impl Call {
    /// Czy wywołanie zmienia stan gildii (notyfikacje się nie liczą).
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::NotifyLog { .. } | Call::NotifyOwner { .. })
    }
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    self_id: u64,
    owners: Mutex<HashMap<u64, u64>>,
    positions: Mutex<HashMap<(u64, u64), i64>>,
    roles: Mutex<HashMap<(u64, u64), Vec<u64>>>,
    audit: Mutex<HashMap<(u64, AuditAction), Vec<AuditEntry>>>,
    webhooks: Mutex<HashMap<(u64, u64), Vec<WebhookInfo>>>,
    calls: Mutex<Vec<Call>>,
    write_error: Mutex<Option<PlatformError>>,
    read_error: Mutex<Option<PlatformError>>,
    audit_queries: AtomicUsize,
    next_id: AtomicU64,
}

impl MockPlatform {
    pub fn new(self_id: u64) -> Self {
        Self {
            self_id,
            next_id: AtomicU64::new(900_000),
            ..Default::default()
        }
    }

    pub fn with_owner(self, guild_id: u64, owner_id: u64) -> Self {
        self.owners.lock().unwrap().insert(guild_id, owner_id);
        self
    }

    pub fn set_position(&self, guild_id: u64, user_id: u64, position: i64) {
        self.positions.lock().unwrap().insert((guild_id, user_id), position);
    }

    pub fn set_roles(&self, guild_id: u64, user_id: u64, roles: Vec<u64>) {
        self.roles.lock().unwrap().insert((guild_id, user_id), roles);
    }

    /// Dopisuje wpis jako najnowszy.
    pub fn push_audit(&self, guild_id: u64, action: AuditAction, entry: AuditEntry) {
        self.audit
            .lock()
            .unwrap()
            .entry((guild_id, action))
            .or_default()
            .insert(0, entry);
    }

    pub fn set_webhooks(&self, guild_id: u64, channel_id: u64, hooks: Vec<WebhookInfo>) {
        self.webhooks.lock().unwrap().insert((guild_id, channel_id), hooks);
    }

    pub fn fail_writes(&self, err: Option<PlatformError>) {
        *self.write_error.lock().unwrap() = err;
    }

    pub fn fail_reads(&self, err: Option<PlatformError>) {
        *self.read_error.lock().unwrap() = err;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutating).collect()
    }

    pub fn kicks(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Kick { guild_id, user_id, .. } => Some((guild_id, user_id)),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_messages(&self) -> Vec<MessageRef> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteMessage(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_webhooks(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DeleteWebhook(w) => Some(w.webhook_id),
                _ => None,
            })
            .collect()
    }

    pub fn audit_queries(&self) -> usize {
        self.audit_queries.load(Ordering::SeqCst)
    }

    fn write(&self, call: Call) -> PlatformResult<()> {
        if let Some(err) = self.write_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }

    fn read_guard(&self) -> PlatformResult<()> {
        match self.read_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn self_id(&self) -> u64 {
        self.self_id
    }

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()> {
        self.write(Call::DeleteMessage(message))
    }

    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> PlatformResult<()> {
        self.write(Call::Kick { guild_id, user_id, reason: reason.to_string() })
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str, purge_days: u8) -> PlatformResult<()> {
        self.write(Call::Ban { guild_id, user_id, reason: reason.to_string(), purge_days })
    }

    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        _reason: &str,
    ) -> PlatformResult<()> {
        self.write(Call::Timeout { guild_id, user_id, until })
    }

    async fn delete_webhook(&self, webhook: WebhookRef, _reason: &str) -> PlatformResult<()> {
        self.write(Call::DeleteWebhook(webhook))?;
        for hooks in self.webhooks.lock().unwrap().values_mut() {
            hooks.retain(|h| h.id != webhook.webhook_id);
        }
        Ok(())
    }

    async fn query_audit_log(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> PlatformResult<Vec<AuditEntry>> {
        self.audit_queries.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(self
            .audit
            .lock()
            .unwrap()
            .get(&(guild_id, action))
            .map(|v| v.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_channel_webhooks(&self, guild_id: u64, channel_id: u64) -> PlatformResult<Vec<WebhookInfo>> {
        self.read_guard()?;
        Ok(self
            .webhooks
            .lock()
            .unwrap()
            .get(&(guild_id, channel_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn create_webhook(&self, guild_id: u64, channel_id: u64, name: &str) -> PlatformResult<WebhookInfo> {
        self.write(Call::CreateWebhook { guild_id, channel_id, name: name.to_string() })?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let hook = WebhookInfo {
            id,
            channel_id: Some(channel_id),
            name: Some(name.to_string()),
            url: Some(format!("https://discord.test/api/webhooks/{id}/token")),
        };
        self.webhooks
            .lock()
            .unwrap()
            .entry((guild_id, channel_id))
            .or_default()
            .push(hook.clone());
        Ok(hook)
    }

    async fn guild_owner(&self, guild_id: u64) -> PlatformResult<u64> {
        self.read_guard()?;
        self.owners
            .lock()
            .unwrap()
            .get(&guild_id)
            .copied()
            .ok_or(PlatformError::NotFound)
    }

    async fn top_role_position(&self, guild_id: u64, user_id: u64) -> PlatformResult<i64> {
        self.read_guard()?;
        if user_id == self.self_id {
            return Ok(MOCK_SELF_POSITION);
        }
        Ok(self
            .positions
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .copied()
            .unwrap_or(0))
    }

    async fn member_roles(&self, guild_id: u64, user_id: u64) -> PlatformResult<Vec<u64>> {
        self.read_guard()?;
        Ok(self
            .roles
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn notify_log(&self, guild_id: u64, text: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::NotifyLog { guild_id, text: text.to_string() });
        Ok(())
    }

    async fn notify_owner(&self, guild_id: u64, text: &str) -> PlatformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::NotifyOwner { guild_id, text: text.to_string() });
        Ok(())
    }
}
