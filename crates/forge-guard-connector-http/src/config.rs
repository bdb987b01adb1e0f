//! HTTP source configuration.

use serde::{Deserialize, Serialize};

/// Shape of the endpoint's responses and how to walk them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpSourceConfig {
    /// Array field in a structured body; empty means the body is a bare
    /// array of identifiers.
    #[serde(default)]
    pub results_field: String,
    /// Field carrying the identifier when items are objects; defaults to
    /// `id`.
    #[serde(default)]
    pub id_field: String,
    /// Iterate pages `1..totalPages`, concatenating results.
    #[serde(default)]
    pub paginated: bool,
    /// Field carrying the total page count; defaults to `total_pages`.
    #[serde(default)]
    pub total_pages_field: String,
    /// Query parameter carrying the page number; defaults to `page`.
    #[serde(default)]
    pub page_param: String,
    /// Dedicated URL for credential probes; 401/403 there mean an auth
    /// failure, any other status is tolerated.
    #[serde(default)]
    pub test_connection_url: String,
}

impl HttpSourceConfig {
    #[must_use]
    pub fn id_field(&self) -> &str {
        if self.id_field.is_empty() {
            "id"
        } else {
            &self.id_field
        }
    }

    #[must_use]
    pub fn page_param(&self) -> &str {
        if self.page_param.is_empty() {
            "page"
        } else {
            &self.page_param
        }
    }

    #[must_use]
    pub fn total_pages_field(&self) -> &str {
        if self.total_pages_field.is_empty() {
            "total_pages"
        } else {
            &self.total_pages_field
        }
    }
}
