use chrono::Utc;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Instant;

use crate::handlers::AppState;
use crate::job_store::JobStore;

static START_TIME: LazyLock<Instant> = LazyLock::new(Instant::now);

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub jobs_tracked: usize,
    pub gateway: GatewayStats,
}

#[derive(Debug, Serialize)]
pub struct GatewayStats {
    pub admission_mode: &'static str,
    pub rpm_per_credential: u32,
    pub rate_limited_credentials: usize,
    pub gated_credentials: usize,
}

/// Record process start as early as possible so uptime is meaningful.
pub fn mark_started() {
    LazyLock::force(&START_TIME);
}

pub async fn check(state: &AppState) -> HealthStatus {
    let gateway = &state.gateway;
    HealthStatus {
        status: "healthy",
        timestamp: Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: START_TIME.elapsed().as_secs(),
        jobs_tracked: state.store.count().await,
        gateway: GatewayStats {
            admission_mode: gateway.admission_mode().as_str(),
            rpm_per_credential: gateway.limiter().capacity(),
            rate_limited_credentials: gateway.limiter().tracked_credentials().await,
            gated_credentials: gateway.gate().tracked_credentials().await,
        },
    }
}
