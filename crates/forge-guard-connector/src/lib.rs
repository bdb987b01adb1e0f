//! # forge-guard connector framework
//!
//! The `MemberSource` capability every external member provider
//! implements, the name-keyed runtime registry the provider reconcilers
//! publish into, and the inline static source.
//!
//! Concrete network-backed sources live in their own crates
//! (`forge-guard-connector-ldap`, `forge-guard-connector-http`).

pub mod error;
pub mod registry;
pub mod source;
pub mod static_source;

pub use error::{ConnectorError, ConnectorResult};
pub use registry::ProviderRegistry;
pub use source::MemberSource;
pub use static_source::StaticSource;
