//! Prometheus metrics for reconciles, external API calls and per-resource
//! status/operation gauges.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::Mutex;
use std::time::Instant;

use forge_guard_core::operations::{OperationKind, OperationState};
use forge_guard_core::organization::Organization;
use forge_guard_core::state::SyncState;
use forge_guard_core::team::Team;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    pub controller: String,
    pub result: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ControllerLabels {
    pub controller: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExternalRequestLabels {
    pub provider: String,
    pub operation: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ExternalDurationLabels {
    pub provider: String,
    pub operation: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OrganizationStatusLabels {
    pub forge: String,
    pub organization: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OrganizationOperationLabels {
    pub forge: String,
    pub organization: String,
    pub scope: String,
    pub operation: String,
    pub state: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TeamStatusLabels {
    pub organization: String,
    pub team: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TeamOperationLabels {
    pub organization: String,
    pub team: String,
    pub operation: String,
    pub state: String,
}

const OPERATION_SCOPES: [&str; 3] = ["owners", "teams", "repos"];

/// Central metrics registry owning every family.
pub struct ControllerMetrics {
    registry: Mutex<Registry>,
    reconcile_total: Family<ReconcileLabels, Counter>,
    reconcile_duration_seconds: Family<ControllerLabels, Histogram>,
    external_api_requests_total: Family<ExternalRequestLabels, Counter>,
    external_api_request_duration_seconds: Family<ExternalDurationLabels, Histogram>,
    organization_status: Family<OrganizationStatusLabels, Gauge>,
    organization_operations: Family<OrganizationOperationLabels, Gauge>,
    team_status: Family<TeamStatusLabels, Gauge>,
    team_operations: Family<TeamOperationLabels, Gauge>,
}

impl ControllerMetrics {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("forge_guard");

        let reconcile_total = Family::<ReconcileLabels, Counter>::default();
        registry.register(
            "reconcile",
            "Total number of reconciliations by controller and result",
            reconcile_total.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ControllerLabels, Histogram>::new_with_constructor(default_histogram);
        registry.register(
            "reconcile_duration_seconds",
            "Duration of reconciliations in seconds by controller",
            reconcile_duration_seconds.clone(),
        );

        let external_api_requests_total = Family::<ExternalRequestLabels, Counter>::default();
        registry.register(
            "external_api_requests",
            "Total external API requests by provider, operation and status",
            external_api_requests_total.clone(),
        );

        let external_api_request_duration_seconds =
            Family::<ExternalDurationLabels, Histogram>::new_with_constructor(default_histogram);
        registry.register(
            "external_api_request_duration_seconds",
            "Duration of external API requests in seconds by provider and operation",
            external_api_request_duration_seconds.clone(),
        );

        let organization_status = Family::<OrganizationStatusLabels, Gauge>::default();
        registry.register(
            "organization_status",
            "Current status of an Organization resource (one-hot)",
            organization_status.clone(),
        );

        let organization_operations = Family::<OrganizationOperationLabels, Gauge>::default();
        registry.register(
            "organization_operations",
            "Queued Organization operations by scope, operation and state",
            organization_operations.clone(),
        );

        let team_status = Family::<TeamStatusLabels, Gauge>::default();
        registry.register(
            "team_status",
            "Current status of a Team resource (one-hot)",
            team_status.clone(),
        );

        let team_operations = Family::<TeamOperationLabels, Gauge>::default();
        registry.register(
            "team_operations",
            "Queued Team member operations by operation and state",
            team_operations.clone(),
        );

        Self {
            registry: Mutex::new(registry),
            reconcile_total,
            reconcile_duration_seconds,
            external_api_requests_total,
            external_api_request_duration_seconds,
            organization_status,
            organization_operations,
            team_status,
            team_operations,
        }
    }

    /// Start timing a reconcile; call [`ReconcileTimer::done`] with the
    /// result label when it finishes.
    #[must_use]
    pub fn start_reconcile(&self, controller: &str) -> ReconcileTimer<'_> {
        ReconcileTimer {
            metrics: self,
            controller: controller.to_string(),
            started: Instant::now(),
        }
    }

    /// Record one external API call.
    pub fn observe_external_request(
        &self,
        provider: &str,
        operation: &str,
        status: &str,
        started: Instant,
    ) {
        self.external_api_requests_total
            .get_or_create(&ExternalRequestLabels {
                provider: provider.to_string(),
                operation: operation.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.external_api_request_duration_seconds
            .get_or_create(&ExternalDurationLabels {
                provider: provider.to_string(),
                operation: operation.to_string(),
            })
            .observe(started.elapsed().as_secs_f64());
    }

    /// Reflect an Organization's status and operation queues in the
    /// gauges, zeroing every known bucket first so stale values drop out.
    pub fn set_organization_metrics(&self, org: &Organization) {
        let forge = org.spec.forge.trim().to_string();
        let organization = org.spec.organization.trim().to_string();

        for state in SyncState::all() {
            let current = org.status.org_status == Some(*state);
            self.organization_status
                .get_or_create(&OrganizationStatusLabels {
                    forge: forge.clone(),
                    organization: organization.clone(),
                    status: state.as_str().to_string(),
                })
                .set(i64::from(current));
        }

        for scope in OPERATION_SCOPES {
            for kind in [OperationKind::Add, OperationKind::Remove] {
                for state in OperationState::all() {
                    let count = match scope {
                        "owners" => org
                            .status
                            .operations
                            .owner_operations
                            .iter()
                            .filter(|op| op.operation == kind && op.state == *state)
                            .count(),
                        "teams" => org
                            .status
                            .operations
                            .team_operations
                            .iter()
                            .filter(|op| op.operation == kind && op.state == *state)
                            .count(),
                        _ => org
                            .status
                            .operations
                            .repository_team_operations
                            .iter()
                            .filter(|op| op.operation == kind && op.state == *state)
                            .count(),
                    };
                    self.organization_operations
                        .get_or_create(&OrganizationOperationLabels {
                            forge: forge.clone(),
                            organization: organization.clone(),
                            scope: scope.to_string(),
                            operation: kind.as_str().to_string(),
                            state: state.as_str().to_string(),
                        })
                        .set(count as i64);
                }
            }
        }
    }

    /// Reflect a Team's status and operation queue in the gauges.
    pub fn set_team_metrics(&self, team: &Team) {
        let organization = team.spec.organization.trim().to_string();
        let name = team.spec.team.trim().to_string();

        for state in SyncState::all() {
            let current = team.status.team_status == Some(*state);
            self.team_status
                .get_or_create(&TeamStatusLabels {
                    organization: organization.clone(),
                    team: name.clone(),
                    status: state.as_str().to_string(),
                })
                .set(i64::from(current));
        }

        for kind in [OperationKind::Add, OperationKind::Remove] {
            for state in OperationState::all() {
                let count = team
                    .status
                    .operations
                    .iter()
                    .filter(|op| op.operation == kind && op.state == *state)
                    .count();
                self.team_operations
                    .get_or_create(&TeamOperationLabels {
                        organization: organization.clone(),
                        team: name.clone(),
                        operation: kind.as_str().to_string(),
                        state: state.as_str().to_string(),
                    })
                    .set(count as i64);
            }
        }
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.lock().expect("metrics registry poisoned");
        if let Err(e) = encode(&mut buffer, &registry) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        buffer
    }

    fn record_reconcile(&self, controller: &str, result: &str, started: Instant) {
        self.reconcile_total
            .get_or_create(&ReconcileLabels {
                controller: controller.to_string(),
                result: result.to_string(),
            })
            .inc();
        self.reconcile_duration_seconds
            .get_or_create(&ControllerLabels {
                controller: controller.to_string(),
            })
            .observe(started.elapsed().as_secs_f64());
    }
}

impl Default for ControllerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn default_histogram() -> Histogram {
    Histogram::new(
        [
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]
        .into_iter(),
    )
}

/// In-progress reconcile measurement.
pub struct ReconcileTimer<'a> {
    metrics: &'a ControllerMetrics,
    controller: String,
    started: Instant,
}

impl ReconcileTimer<'_> {
    /// Observe the duration and count the result.
    pub fn done(self, result: &str) {
        self.metrics
            .record_reconcile(&self.controller, result, self.started);
    }
}
