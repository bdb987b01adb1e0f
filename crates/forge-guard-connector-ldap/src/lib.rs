//! # forge-guard directory member source
//!
//! Resolves group memberships from a directory service: a subtree search
//! for the group entry, CN extraction from its `member` attribute values,
//! and a transparent one-retry reconnect when the server drops the
//! connection between calls.

pub mod config;
pub mod source;

pub use config::DirectoryConfig;
pub use source::DirectorySource;
