use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub guard: GuardConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub app_id: Option<String>,
    pub intents: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub level: Option<String>,
    pub ansi: Option<bool>,
}

/// Serwer HTTP (health + statystyki). Brak `bind` = serwer wyłączony.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ApiConfig {
    pub bind: Option<String>,
}

/// Próg + okno czasowe jednego detektora.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct WindowRule {
    pub threshold: u32,
    pub window_seconds: u64,
    /// Twardy limit wpisów w oknie (najstarsze wypadają pierwsze).
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl WindowRule {
    pub const fn new(threshold: u32, window_seconds: u64) -> Self {
        Self { threshold, window_seconds, capacity: None }
    }

    /// Limit wpisów poniżej progu sprawiłby, że detektor nigdy nie zadziała.
    pub fn validate(&self, name: &str) -> Result<()> {
        if let Some(cap) = self.capacity.filter(|c| *c > 0) {
            if cap < self.threshold.max(1) as usize {
                bail!("guard.{name}: capacity ({cap}) is below threshold ({})", self.threshold);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FloodPolicy {
    #[default]
    Timeout,
    Kick,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FloodConfig {
    pub rule: WindowRule,
    pub policy: FloodPolicy,
    pub timeout_minutes: u32,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            rule: WindowRule::new(5, 5),
            policy: FloodPolicy::Timeout,
            timeout_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MentionConfig {
    pub rule: WindowRule,
    /// Tyle (lub więcej) wzmianek użytkowników w jednej wiadomości = natychmiastowe usunięcie.
    pub max_mentions_per_message: usize,
}

impl Default for MentionConfig {
    fn default() -> Self {
        Self {
            rule: WindowRule::new(3, 30),
            max_mentions_per_message: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub strike_limit: u32,
    pub retention_days: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self { strike_limit: 3, retention_days: 7 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BotConfig {
    /// Role, których posiadacz może zapraszać boty (obok whitelisty).
    pub allowed_inviter_roles: Vec<u64>,
    /// Czy wyrzucać bota, którego zapraszającego nie udało się ustalić.
    pub kick_unattributed: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    pub delay_ms: u64,
    pub tolerance_seconds: u64,
    pub scan_limit: u8,
    pub queries_per_second: u32,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            tolerance_seconds: 10,
            scan_limit: 10,
            queries_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GuardConfig {
    pub super_admins: Vec<u64>,
    pub command_prefix: String,
    pub log_channel: Option<String>,
    pub notify_owners_on_start: bool,
    pub dedupe_seconds: u64,
    pub invite: WindowRule,
    pub flood: FloodConfig,
    pub mention: MentionConfig,
    pub moderation: WindowRule,
    pub webhook: WebhookConfig,
    pub bots: BotConfig,
    pub correlator: CorrelatorConfig,
}

impl GuardConfig {
    pub fn validate(&self) -> Result<()> {
        self.invite.validate("invite")?;
        self.flood.rule.validate("flood.rule")?;
        self.mention.rule.validate("mention.rule")?;
        self.moderation.validate("moderation")
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            super_admins: vec![],
            command_prefix: "!".into(),
            log_channel: Some("security-logs".into()),
            notify_owners_on_start: true,
            dedupe_seconds: 5,
            invite: WindowRule::new(5, 45),
            flood: FloodConfig::default(),
            mention: MentionConfig::default(),
            moderation: WindowRule::new(3, 60),
            webhook: WebhookConfig::default(),
            bots: BotConfig::default(),
            correlator: CorrelatorConfig::default(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("TSN_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        let defaults = Settings::defaults(&env);

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe TSN_*
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // TSN_GUARD__INVITE__THRESHOLD => guard.invite.threshold itd.
            .merge(Env::prefixed("TSN_").split("__"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        if s.guard.correlator.queries_per_second == 0 {
            s.guard.correlator.queries_per_second = 1;
        }
        s.guard.validate()?;

        Ok(s)
    }

    /// Domyślne wartości (bez plików i ENV).
    pub fn defaults(env: &str) -> Self {
        Settings {
            env: env.to_string(),
            app: App {
                name: "Tigris Sentinel".into(),
            },
            discord: Discord {
                token: "".into(),
                app_id: None,
                intents: vec![
                    "GUILDS".into(),
                    "GUILD_MEMBERS".into(),
                    "GUILD_MODERATION".into(),
                    "GUILD_WEBHOOKS".into(),
                    "GUILD_MESSAGES".into(),
                    "MESSAGE_CONTENT".into(),
                ],
            },
            logging: Logging {
                level: Some("info".into()),
                ansi: Some(true),
            },
            guard: GuardConfig::default(),
            api: ApiConfig::default(),
        }
    }
}
