//! Komendy administracyjne (`/sentinel ...`) niezależne od Discorda: wejście to nazwa
//! podkomendy + argumenty, wyjście to tekst odpowiedzi.
//!
//! Whitelist/blacklist: właściciel gildii albo super-admin z konfiguracji.
//! `webhook.create`: tylko osoby z whitelisty.

use tracing::{info, warn};

use crate::sentinel::Sentinel;

pub const DEFAULT_WEBHOOK_NAME: &str = "Tigris Relay";

#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    pub user: Option<u64>,
    pub channel: Option<u64>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum List {
    White,
    Black,
}

impl List {
    fn label(self) -> &'static str {
        match self {
            List::White => "Whitelista",
            List::Black => "Blacklista",
        }
    }

    fn locative(self) -> &'static str {
        match self {
            List::White => "whiteliście",
            List::Black => "blackliście",
        }
    }

    fn genitive(self) -> &'static str {
        match self {
            List::White => "whitelisty",
            List::Black => "blacklisty",
        }
    }
}

/// Właściciel gildii albo super-admin.
pub async fn is_admin(sentinel: &Sentinel, guild_id: u64, caller_id: u64) -> bool {
    if sentinel.config().super_admins.contains(&caller_id) {
        return true;
    }
    match sentinel.trust().owner_of(sentinel.api(), guild_id).await {
        Ok(owner) => owner == caller_id,
        Err(e) => {
            warn!(guild_id, caller_id, error = ?e, "owner lookup failed during command auth");
            false
        }
    }
}

pub async fn handle_subcommand(
    sentinel: &Sentinel,
    guild_id: u64,
    caller_id: u64,
    name: &str,
    args: CommandArgs,
) -> String {
    let (group, op) = name.split_once('.').unwrap_or((name, ""));
    let list = match group {
        "whitelist" => List::White,
        "blacklist" => List::Black,
        "webhook" if op == "create" => return cmd_webhook_create(sentinel, guild_id, caller_id, args).await,
        _ => return "❌ Nieznana komenda.".into(),
    };

    if !is_admin(sentinel, guild_id, caller_id).await {
        return "⛔ Brak uprawnień.".into();
    }

    match op {
        "add" | "remove" => {
            let Some(user) = args.user else {
                return "❌ Brak parametru `user`.".into();
            };
            let trust = sentinel.trust();
            let changed = match (list, op) {
                (List::White, "add") => trust.add_to_whitelist(guild_id, user),
                (List::White, _) => trust.remove_from_whitelist(guild_id, user),
                (List::Black, "add") => trust.add_to_blacklist(guild_id, user),
                (List::Black, _) => trust.remove_from_blacklist(guild_id, user),
            };
            info!(guild_id, caller_id, user, list = list.label(), op, changed, "trust list updated");
            match (op, changed) {
                ("add", true) => format!("✅ <@{user}> dodany do {}.", list.genitive()),
                ("add", false) => format!("ℹ️ <@{user}> już jest na {}.", list.locative()),
                (_, true) => format!("✅ <@{user}> usunięty z {}.", list.genitive()),
                (_, false) => format!("ℹ️ <@{user}> nie było na {}.", list.locative()),
            }
        }
        "list" => {
            let ids = match list {
                List::White => sentinel.trust().whitelist(guild_id),
                List::Black => sentinel.trust().blacklist(guild_id),
            };
            if ids.is_empty() {
                format!("{} jest pusta.", list.label())
            } else {
                let lines: Vec<String> = ids.iter().map(|id| format!("• <@{id}> (`{id}`)")).collect();
                format!("{} ({}):\n{}", list.label(), ids.len(), lines.join("\n"))
            }
        }
        _ => "❌ Nieznana komenda.".into(),
    }
}

async fn cmd_webhook_create(sentinel: &Sentinel, guild_id: u64, caller_id: u64, args: CommandArgs) -> String {
    if !sentinel.trust().is_whitelisted(guild_id, caller_id) {
        return "⛔ Tylko osoby z whitelisty mogą tworzyć webhooki.".into();
    }
    let Some(channel) = args.channel else {
        return "❌ Brak parametru `channel`.".into();
    };
    let name = args.name.as_deref().unwrap_or(DEFAULT_WEBHOOK_NAME);
    match sentinel.create_webhook(guild_id, channel, caller_id, name).await {
        Ok(hook) => format!(
            "✅ Webhook utworzony w <#{channel}>, wygasa za {} dni.\n{}",
            sentinel.config().webhook.retention_days,
            hook.url.unwrap_or_else(|| format!("id: {}", hook.id))
        ),
        Err(e) => {
            warn!(guild_id, caller_id, channel, error = ?e, "webhook create failed");
            format!("❌ Nie udało się utworzyć webhooka: {e}")
        }
    }
}
