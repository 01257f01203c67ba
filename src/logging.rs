use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Settings;

/// Filtr logów: `RUST_LOG` wygrywa z `logging.level`; serenity domyślnie tylko ostrzeżenia.
fn filter(settings: &Settings) -> EnvFilter {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return from_env;
    }
    let level = settings.logging.level.as_deref().unwrap_or("info");
    EnvFilter::try_new(format!("{level},serenity=warn,tracing::span=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn init(settings: &Settings) {
    let fmt_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_target(true)
        .with_ansi(settings.logging.ansi.unwrap_or(true));

    // drugi bootstrap w tym samym procesie (testy) nie panikuje
    let _ = tracing_subscriber::registry()
        .with(filter(settings))
        .with(fmt_layer)
        .try_init();
}
