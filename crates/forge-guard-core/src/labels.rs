//! The behavioral label and annotation surface.
//!
//! Labels act as process-level policy switches read on every reconcile;
//! annotations carry free-form configuration. All action gates default to
//! the safe side: organization-level mutations require an explicit
//! `"true"`, team member mutations are enabled unless set to `"false"`.

// Team labels.
pub const LABEL_ADD_USER: &str = "addUser";
pub const LABEL_REMOVE_USER: &str = "removeUser";
pub const LABEL_DISABLE_INTERNAL_USERNAMES: &str = "disableInternalUsernames";
pub const LABEL_REQUIRE_VERIFIED_DOMAIN_EMAIL: &str = "require-verified-domain-email";
pub const LABEL_ORPHANED: &str = "orphaned";

// Organization labels.
pub const LABEL_ADD_ORGANIZATION_OWNER: &str = "addOrganizationOwner";
pub const LABEL_REMOVE_ORGANIZATION_OWNER: &str = "removeOrganizationOwner";
pub const LABEL_ADD_TEAM: &str = "addTeam";
pub const LABEL_REMOVE_TEAM: &str = "removeTeam";
pub const LABEL_ADD_REPOSITORY_TEAM: &str = "addRepositoryTeam";
pub const LABEL_REMOVE_REPOSITORY_TEAM: &str = "removeRepositoryTeam";
pub const LABEL_CLEAN_OPERATIONS: &str = "cleanOperations";
pub const CLEAN_OPERATIONS_COMPLETE: &str = "complete";
pub const CLEAN_OPERATIONS_FAILED: &str = "failed";

// Shared labels.
pub const LABEL_DRY_RUN: &str = "dryRun";
pub const ENABLED: &str = "true";

// TTL labels; values are duration strings such as `24h` or `30m`.
pub const LABEL_FAILED_TTL: &str = "failedTTL";
pub const LABEL_COMPLETED_TTL: &str = "completedTTL";
pub const LABEL_NOTFOUND_TTL: &str = "notfoundTTL";
pub const LABEL_SKIPPED_TTL: &str = "skippedTTL";

// Annotations.
pub const ANNOTATION_SKIP_DEFAULT_REPOSITORY_TEAMS: &str = "skipDefaultRepositoryTeams";
pub const ANNOTATION_EMAIL_CHECK_CONFIG: &str = "email-check-config";
pub const ANNOTATION_EMAIL_CHECK_RESULTS: &str = "email-check-results";
