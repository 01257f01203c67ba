// src/discord/mod.rs
//! Klej serenity: zdarzenia gatewaya -> znormalizowane zdarzenia -> `Sentinel`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::executor::Outcome;
use crate::model::{MemberEvent, MessageEvent, WebhooksEvent};
use crate::sentinel::Sentinel;

pub mod api;
pub mod commands;

use api::{SerenityApi, snowflake_time};

pub struct Handler {
    pub app: Arc<AppContext>,
    pub api: Arc<SerenityApi>,
}

/// Panika w obsłudze jednego zdarzenia nie może zatrzymać strumienia.
async fn guarded<F>(event: &'static str, fut: F)
where
    F: Future<Output = Vec<Outcome>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcomes) if !outcomes.is_empty() => {
            let applied = outcomes.iter().filter(|o| o.is_applied()).count();
            tracing::debug!(event, verdicts = outcomes.len(), applied, "event handled");
        }
        Ok(_) => {}
        Err(_) => tracing::error!(event, "event handler panicked"),
    }
}

impl Handler {
    fn sentinel(&self) -> Arc<Sentinel> {
        self.app.sentinel()
    }
}

fn member_event(guild_id: GuildId, user: &User) -> MemberEvent {
    MemberEvent {
        guild_id: guild_id.get(),
        user_id: user.id.get(),
        is_bot: user.bot,
        at: Utc::now(),
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.api.set_self_id(ready.user.id.get());
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "Logged in");

        for g in ready.guilds {
            if let Err(e) = commands::register_commands(&ctx, g.id).await {
                tracing::warn!(error = ?e, gid = %g.id.get(), "register sentinel commands failed");
            }
        }
    }

    async fn guild_create(&self, _ctx: Context, guild: Guild, _is_new: Option<bool>) {
        let sentinel = self.sentinel();
        let gid = guild.id.get();
        let fut = async move {
            sentinel.on_guild_available(gid).await;
            Vec::new()
        };
        guarded("guild_create", fut).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let fut = async {
            commands::on_interaction(&ctx, &self.app, interaction).await;
            Vec::new()
        };
        guarded("interaction_create", fut).await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };
        let ev = MessageEvent {
            guild_id: gid.get(),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            author_is_bot: msg.author.bot,
            mentions_everyone: msg.mention_everyone,
            user_mentions: msg.mentions.len(),
            role_mentions: msg.mention_roles.iter().map(|r| r.get()).collect(),
            at: snowflake_time(msg.id.get()),
            content: msg.content,
        };
        let sentinel = self.sentinel();
        guarded("message", async move { sentinel.on_message(&ev).await }).await;
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        let ev = member_event(member.guild_id, &member.user);
        let sentinel = self.sentinel();
        guarded("guild_member_addition", async move { sentinel.on_member_join(&ev).await }).await;
    }

    async fn guild_member_removal(&self, _ctx: Context, guild_id: GuildId, user: User, _member: Option<Member>) {
        let ev = member_event(guild_id, &user);
        let sentinel = self.sentinel();
        guarded("guild_member_removal", async move { sentinel.on_member_remove(&ev).await }).await;
    }

    async fn guild_ban_addition(&self, _ctx: Context, guild_id: GuildId, banned_user: User) {
        let ev = member_event(guild_id, &banned_user);
        let sentinel = self.sentinel();
        guarded("guild_ban_addition", async move { sentinel.on_member_ban(&ev).await }).await;
    }

    async fn webhook_update(&self, _ctx: Context, guild_id: GuildId, belongs_to_channel_id: ChannelId) {
        let ev = WebhooksEvent {
            guild_id: guild_id.get(),
            channel_id: belongs_to_channel_id.get(),
            at: Utc::now(),
        };
        let sentinel = self.sentinel();
        guarded("webhook_update", async move { sentinel.on_webhooks_update(&ev).await }).await;
    }

    async fn channel_create(&self, _ctx: Context, channel: GuildChannel) {
        let sentinel = self.sentinel();
        let (gid, cid) = (channel.guild_id.get(), channel.id.get());
        guarded("channel_create", async move { sentinel.on_channel_create(gid, cid, Utc::now()).await }).await;
    }

    async fn channel_delete(&self, _ctx: Context, channel: GuildChannel, _messages: Option<Vec<Message>>) {
        let sentinel = self.sentinel();
        let (gid, cid) = (channel.guild_id.get(), channel.id.get());
        guarded("channel_delete", async move { sentinel.on_channel_delete(gid, cid, Utc::now()).await }).await;
    }

    async fn guild_role_create(&self, _ctx: Context, new: Role) {
        let sentinel = self.sentinel();
        let (gid, rid) = (new.guild_id.get(), new.id.get());
        guarded("guild_role_create", async move { sentinel.on_role_create(gid, rid, Utc::now()).await }).await;
    }

    async fn guild_role_delete(
        &self,
        _ctx: Context,
        guild_id: GuildId,
        removed_role_id: RoleId,
        _removed_role_data_if_available: Option<Role>,
    ) {
        let sentinel = self.sentinel();
        let (gid, rid) = (guild_id.get(), removed_role_id.get());
        guarded("guild_role_delete", async move { sentinel.on_role_delete(gid, rid, Utc::now()).await }).await;
    }
}

pub fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MODERATION" => i |= GatewayIntents::GUILD_MODERATION,
            "GUILD_WEBHOOKS" => i |= GatewayIntents::GUILD_WEBHOOKS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            other => tracing::warn!(intent = other, "unknown gateway intent in config, ignored"),
        }
    }
    i
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Brak tokenu Discord (TSN_DISCORD__TOKEN). Uzupełnij w .env.");
    }
    let Some(api) = ctx.discord_api() else {
        anyhow::bail!("AppContext bez klienta Discorda (kontekst testowy?)");
    };

    let mut intents = intents_from_settings(&ctx.settings.discord.intents);
    if intents.is_empty() {
        intents = crate::default_gateway_intents();
    }

    let handler = Handler { app: ctx.clone(), api };
    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    let shard_manager = client.shard_manager.clone();
    let sentinel = ctx.sentinel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C: shutting down");
            sentinel.shutdown();
            shard_manager.shutdown_all().await;
        }
    });

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}
