// src/lib.rs

pub mod api;
pub mod commands;
pub mod config;
pub mod correlator;
pub mod detectors;
pub mod discord;
pub mod error;
pub mod executor;
pub mod logging;
pub mod model;
pub mod platform;
pub mod sentinel;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod trust;
pub mod window;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::all::GatewayIntents;

use config::Settings;
use discord::api::SerenityApi;
use platform::Platform;
use sentinel::Sentinel;

/// Globalny kontekst aplikacji: konfiguracja + silnik + (w produkcji) klient REST Discorda.
pub struct AppContext {
    pub settings: Settings,
    sentinel: Arc<Sentinel>,
    discord: Option<Arc<SerenityApi>>,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - klient REST Discorda (implementacja `Platform`)
    /// - silnik ze stanem w pamięci
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        logging::init(&settings);

        let api = Arc::new(SerenityApi::new(
            &settings.discord.token,
            settings.guard.log_channel.clone(),
        ));
        let sentinel = Arc::new(Sentinel::new(settings.guard.clone(), api.clone()));

        tracing::info!(env = %settings.env, app = %settings.app.name, "bootstrap complete");
        Ok(Arc::new(Self {
            settings,
            sentinel,
            discord: Some(api),
        }))
    }

    /// Kontekst bez Discorda, z dowolną platformą (w testach atrapa z feature `test-utils`).
    pub fn new_testing(settings: Settings, api: Arc<dyn Platform>) -> Arc<Self> {
        let sentinel = Arc::new(Sentinel::new(settings.guard.clone(), api));
        Arc::new(Self {
            settings,
            sentinel,
            discord: None,
        })
    }

    pub fn sentinel(&self) -> Arc<Sentinel> {
        self.sentinel.clone()
    }

    pub fn discord_api(&self) -> Option<Arc<SerenityApi>> {
        self.discord.clone()
    }
}

/// Intents potrzebne detektorom:
/// - GUILDS (kanały, role), GUILD_MEMBERS (wejścia/wyjścia),
/// - GUILD_MODERATION (bany), GUILD_WEBHOOKS,
/// - GUILD_MESSAGES + MESSAGE_CONTENT (linki, wzmianki).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MODERATION
        | GatewayIntents::GUILD_WEBHOOKS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Serwer HTTP (jeśli `api.bind`) + klient Discorda.
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    if let Some(bind) = ctx.settings.api.bind.as_deref() {
        let addr: SocketAddr = bind
            .parse()
            .with_context(|| format!("invalid api.bind address: {bind}"))?;
        let sentinel = ctx.sentinel();
        tokio::spawn(async move {
            if let Err(e) = api::serve(addr, sentinel).await {
                tracing::warn!(error = ?e, "http api stopped");
            }
        });
    }
    discord::run_bot(ctx).await
}
