//! Liveness and readiness reporting.
//!
//! Two probes feed the report: storage reachability and the settlement
//! backlog. A failing probe makes the service unhealthy; a backlog of stuck
//! or exhausted settlements only degrades it.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, warn};

use crate::services::settlements::SettlementService;

const DATABASE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: BTreeMap<&'static str, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Ordered from best to worst.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Warning,
    Down,
}

impl ComponentState {
    fn contributes(self) -> HealthState {
        match self {
            ComponentState::Up => HealthState::Healthy,
            ComponentState::Warning => HealthState::Degraded,
            ComponentState::Down => HealthState::Unhealthy,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    fn new(status: ComponentState, started: Option<Instant>, details: Option<String>) -> Self {
        Self {
            status,
            response_time_ms: started.map(|s| s.elapsed().as_millis()),
            details,
        }
    }
}

impl HealthStatus {
    fn from_checks(checks: BTreeMap<&'static str, ComponentHealth>) -> Self {
        let status = checks
            .values()
            .map(|check| check.status.contributes())
            .max()
            .unwrap_or(HealthState::Healthy);
        Self {
            status,
            checks,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status != HealthState::Unhealthy
    }
}

#[derive(Clone)]
pub struct HealthChecker {
    db_pool: Option<sqlx::PgPool>,
    settlements: Arc<SettlementService>,
}

impl HealthChecker {
    /// Without a pool the service runs on the in-memory store and the
    /// `database` check only notes it.
    pub fn new(db_pool: Option<sqlx::PgPool>, settlements: Arc<SettlementService>) -> Self {
        Self {
            db_pool,
            settlements,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut checks = BTreeMap::new();
        checks.insert("database", self.probe_database().await);
        checks.insert("settlements", self.probe_settlements().await);
        HealthStatus::from_checks(checks)
    }

    async fn probe_database(&self) -> ComponentHealth {
        let Some(pool) = &self.db_pool else {
            return ComponentHealth::new(
                ComponentState::Up,
                None,
                Some("in-memory store".to_string()),
            );
        };

        let started = Instant::now();
        match timeout(DATABASE_PROBE_TIMEOUT, crate::database::health_check(pool)).await {
            Ok(Ok(())) => ComponentHealth::new(ComponentState::Up, Some(started), None),
            Ok(Err(e)) => {
                error!(error = %e, "Database probe failed");
                ComponentHealth::new(ComponentState::Down, None, Some(e.to_string()))
            }
            Err(_) => {
                error!(
                    timeout_secs = DATABASE_PROBE_TIMEOUT.as_secs(),
                    "Database probe timed out"
                );
                ComponentHealth::new(ComponentState::Down, None, Some("Timeout".to_string()))
            }
        }
    }

    async fn probe_settlements(&self) -> ComponentHealth {
        let started = Instant::now();
        let threshold = self.settlements.stuck_threshold();
        match self.settlements.list_stuck(threshold).await {
            Ok(stuck) if stuck.is_empty() => {
                ComponentHealth::new(ComponentState::Up, Some(started), None)
            }
            Ok(stuck) => {
                warn!(stuck = stuck.len(), "Settlements need attention");
                ComponentHealth::new(
                    ComponentState::Warning,
                    Some(started),
                    Some(format!("{} stuck or exhausted settlements", stuck.len())),
                )
            }
            Err(e) => {
                error!(error = %e, "Settlement backlog probe failed");
                ComponentHealth::new(ComponentState::Down, None, Some(e.to_string()))
            }
        }
    }
}
