//! Ustalanie sprawcy zdarzenia strukturalnego na podstawie dziennika audytu.
//!
//! Wpis w dzienniku pojawia się z opóźnieniem względem zdarzenia z gatewaya, więc
//! najpierw czekamy stałą chwilę (z możliwością anulowania), potem robimy DOKŁADNIE
//! jedno zapytanie. Każda niepewność kończy się `Attribution::Unknown`.

use std::num::NonZeroU32;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::CorrelatorConfig;
use crate::model::{AuditAction, AuditEntry};
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribution {
    Known(u64),
    Unknown,
}

impl Attribution {
    pub fn actor(self) -> Option<u64> {
        match self {
            Attribution::Known(id) => Some(id),
            Attribution::Unknown => None,
        }
    }
}

/// "Kto zrobił `action` na `target_id` około `observed_at`?"
#[derive(Debug, Clone, Copy)]
pub struct PendingAttribution {
    pub guild_id: u64,
    /// `None` = dowolny wpis tego typu (np. dodanie bota bez osobnego celu).
    pub target_id: Option<u64>,
    pub action: AuditAction,
    pub observed_at: DateTime<Utc>,
}

pub struct AuditCorrelator {
    delay: Duration,
    tolerance: Duration,
    scan_limit: u8,
    limiter: DefaultDirectRateLimiter,
}

impl AuditCorrelator {
    pub fn new(cfg: &CorrelatorConfig) -> Self {
        let qps = NonZeroU32::new(cfg.queries_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            delay: Duration::from_millis(cfg.delay_ms),
            tolerance: Duration::from_secs(cfg.tolerance_seconds),
            scan_limit: cfg.scan_limit.max(1),
            limiter: RateLimiter::direct(Quota::per_second(qps)),
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub async fn resolve_actor(
        &self,
        api: &dyn Platform,
        req: PendingAttribution,
        cancel: &CancellationToken,
    ) -> Attribution {
        self.resolve_with_tolerance(api, req, self.tolerance, cancel).await
    }

    /// Jak [`Self::resolve_actor`], ale z własną tolerancją (np. druga, szersza próba).
    pub async fn resolve_with_tolerance(
        &self,
        api: &dyn Platform,
        req: PendingAttribution,
        tolerance: Duration,
        cancel: &CancellationToken,
    ) -> Attribution {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(guild_id = req.guild_id, action = ?req.action, "attribution cancelled before query");
                return Attribution::Unknown;
            }
            _ = tokio::time::sleep(self.delay) => {}
        }

        if tokio::time::timeout(tolerance, self.limiter.until_ready()).await.is_err() {
            warn!(guild_id = req.guild_id, action = ?req.action, "audit log rate limit, attribution unknown");
            return Attribution::Unknown;
        }

        let entries = match tokio::time::timeout(
            tolerance.max(Duration::from_secs(1)),
            api.query_audit_log(req.guild_id, req.action, self.scan_limit),
        )
        .await
        {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(guild_id = req.guild_id, action = ?req.action, error = ?e, "audit log query failed");
                return Attribution::Unknown;
            }
            Err(_) => {
                warn!(guild_id = req.guild_id, action = ?req.action, "audit log query timed out");
                return Attribution::Unknown;
            }
        };

        match pick_entry(&entries, &req, tolerance, api.self_id()) {
            Some(actor) => Attribution::Known(actor),
            None => {
                debug!(
                    guild_id = req.guild_id,
                    action = ?req.action,
                    scanned = entries.len(),
                    "no matching audit entry"
                );
                Attribution::Unknown
            }
        }
    }
}

/// Pierwszy (najnowszy) wpis z pasującym celem i czasem w tolerancji. Wpisy bota pomijamy.
fn pick_entry(entries: &[AuditEntry], req: &PendingAttribution, tolerance: Duration, self_id: u64) -> Option<u64> {
    let tol_ms = tolerance.as_millis() as i64;
    entries
        .iter()
        .filter(|e| e.acting_user_id != self_id)
        .filter(|e| (e.created_at - req.observed_at).num_milliseconds().abs() <= tol_ms)
        .find(|e| match req.target_id {
            Some(t) => e.target_id == Some(t),
            None => true,
        })
        .map(|e| e.acting_user_id)
}
