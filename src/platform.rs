use chrono::{DateTime, Utc};
use serenity::async_trait;

use crate::error::PlatformResult;
use crate::model::{AuditAction, AuditEntry, MessageRef, WebhookInfo, WebhookRef};

/// Wszystko, czego silnik potrzebuje od API platformy.
/// Implementacja produkcyjna: [`crate::discord::api::SerenityApi`]; w testach: `testing::MockPlatform` (feature `test-utils`).
#[async_trait]
pub trait Platform: Send + Sync {
    /// Id tożsamości, w imieniu której wykonujemy akcje (bot). 0 = jeszcze nieznane.
    fn self_id(&self) -> u64;

    async fn delete_message(&self, message: MessageRef) -> PlatformResult<()>;
    async fn kick(&self, guild_id: u64, user_id: u64, reason: &str) -> PlatformResult<()>;
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str, purge_days: u8) -> PlatformResult<()>;
    async fn timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        until: DateTime<Utc>,
        reason: &str,
    ) -> PlatformResult<()>;
    async fn delete_webhook(&self, webhook: WebhookRef, reason: &str) -> PlatformResult<()>;

    /// Najnowsze wpisy danego typu, od najnowszego.
    async fn query_audit_log(
        &self,
        guild_id: u64,
        action: AuditAction,
        limit: u8,
    ) -> PlatformResult<Vec<AuditEntry>>;

    async fn list_channel_webhooks(&self, guild_id: u64, channel_id: u64) -> PlatformResult<Vec<WebhookInfo>>;
    async fn create_webhook(&self, guild_id: u64, channel_id: u64, name: &str) -> PlatformResult<WebhookInfo>;

    async fn guild_owner(&self, guild_id: u64) -> PlatformResult<u64>;
    /// Pozycja najwyższej roli członka (0 = tylko @everyone).
    async fn top_role_position(&self, guild_id: u64, user_id: u64) -> PlatformResult<i64>;
    async fn member_roles(&self, guild_id: u64, user_id: u64) -> PlatformResult<Vec<u64>>;

    /// Kanał logów bezpieczeństwa gildii.
    async fn notify_log(&self, guild_id: u64, text: &str) -> PlatformResult<()>;
    /// Prywatna wiadomość do właściciela gildii.
    async fn notify_owner(&self, guild_id: u64, text: &str) -> PlatformResult<()>;
}
