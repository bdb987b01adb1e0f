//! # forge-guard controller
//!
//! The reconciliation engine: seven reconcilers sharing two process-wide
//! client registries, coalescing per-kind work queues, the watch/map-func
//! topology that re-enqueues dependents on upstream change, and the
//! Prometheus metrics surface.
//!
//! Data flows providers → team member resolution → team state machine →
//! organization aggregation → organization state machine → forge
//! mutations. Control flows store watch events → work queue → one
//! reconciler invocation per key at a time.

pub mod account_link_reconciler;
pub mod config;
pub mod context;
pub mod error;
pub mod forge_reconciler;
pub mod identity;
pub mod metrics;
pub mod organization_reconciler;
pub mod provider_reconcilers;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod runner;
pub mod team_reconciler;
pub mod watches;

pub use config::ControllerConfig;
pub use context::{Context, ForgeClientFactory, RestClientFactory, Stores};
pub use error::{ControllerError, ControllerResult};
pub use reconcile::ReconcileOutcome;
pub use registry::{ForgeRegistry, Registries};
pub use runner::Controller;
