//! Detektory: jeden na sygnał. Każdy ma własne okna/liczniki i zwraca werdykty,
//! nigdy nie woła zapisów na platformie sam.
//!
//! Detektory wiadomości są synchroniczne (bez korelatora). Detektory zdarzeń
//! strukturalnych są async, bo muszą najpierw ustalić sprawcę.

use tokio_util::sync::CancellationToken;

use crate::correlator::{Attribution, AuditCorrelator, PendingAttribution};
use crate::platform::Platform;
use crate::trust::TrustRegistry;

pub mod bots;
pub mod flood;
pub mod invite;
pub mod mention;
pub mod moderation;
pub mod structure;
pub mod webhook;

pub use bots::BotInviteDetector;
pub use flood::MessageFloodDetector;
pub use invite::InviteDetector;
pub use mention::MentionDetector;
pub use moderation::ModerationBurstDetector;
pub use structure::StructureDetector;
pub use webhook::WebhookDetector;

/// Współdzielone zależności detektorów async.
#[derive(Clone, Copy)]
pub struct DetectorCtx<'a> {
    pub api: &'a dyn Platform,
    pub trust: &'a TrustRegistry,
    pub correlator: &'a AuditCorrelator,
    pub cancel: &'a CancellationToken,
}

impl DetectorCtx<'_> {
    /// Sprawca zdarzenia albo `None` (nieznany / sam bot).
    pub(crate) async fn attribute(&self, req: PendingAttribution) -> Option<u64> {
        match self.correlator.resolve_actor(self.api, req, self.cancel).await {
            Attribution::Known(id) if id != self.api.self_id() => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::CorrelatorConfig;
    use crate::testing::MockPlatform;

    pub const G: u64 = 1;
    pub const BOT: u64 = 99;
    pub const OWNER: u64 = 7;

    pub struct Fixture {
        pub api: MockPlatform,
        pub trust: TrustRegistry,
        pub correlator: AuditCorrelator,
        pub cancel: CancellationToken,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                api: MockPlatform::new(BOT).with_owner(G, OWNER),
                trust: TrustRegistry::new(),
                correlator: AuditCorrelator::new(&CorrelatorConfig {
                    delay_ms: 10,
                    queries_per_second: 1000,
                    ..CorrelatorConfig::default()
                }),
                cancel: CancellationToken::new(),
            }
        }

        pub fn ctx(&self) -> DetectorCtx<'_> {
            DetectorCtx {
                api: &self.api,
                trust: &self.trust,
                correlator: &self.correlator,
                cancel: &self.cancel,
            }
        }
    }
}
