//! `/health` and `/metrics/summary` payloads.

use serde::Serialize;

use crate::registry::{SessionRegistry, StatsSnapshot};

pub const SERVICE_NAME: &str = "Face Behavior Analyzer";

/// Static service identity.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub fn health_check() -> HealthResponse {
    HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Live session summary.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub active_connections: usize,
    pub status: &'static str,
    #[serde(flatten)]
    pub totals: StatsSnapshot,
}

pub fn summary(registry: &SessionRegistry) -> SummaryResponse {
    SummaryResponse {
        active_connections: registry.len(),
        status: "running",
        totals: registry.totals(),
    }
}
