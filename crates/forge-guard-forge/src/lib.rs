//! # forge-guard forge client
//!
//! The forge-side API surface: REST v3 for organization, team and
//! repository management plus the GraphQL query for verified domain
//! emails, authenticated as a forge app per installation.
//!
//! The [`ForgeApi`] trait is the seam the reconcilers depend on; the
//! [`RestForgeClient`] is the production implementation and the
//! controller tests substitute an in-memory double.

pub mod api;
pub mod auth;
pub mod error;
pub mod rest;
pub mod slug;

pub use api::{ForgeAccount, ForgeApi, RepositoryListing};
pub use auth::{AppAuth, AppCredentials};
pub use error::{ForgeError, ForgeResult};
pub use rest::RestForgeClient;
pub use slug::team_slug;
