//! Inline static member source.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::ConnectorResult;
use crate::source::MemberSource;

/// Member source backed by an in-memory group map from the provider spec.
pub struct StaticSource {
    groups: HashMap<String, Vec<String>>,
}

impl StaticSource {
    #[must_use]
    pub fn new(groups: HashMap<String, Vec<String>>) -> Self {
        Self { groups }
    }
}

#[async_trait]
impl MemberSource for StaticSource {
    async fn users(&self, group: &str) -> ConnectorResult<Vec<String>> {
        Ok(self.groups.get(group).cloned().unwrap_or_default())
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_and_unknown_groups() {
        let mut groups = HashMap::new();
        groups.insert("eng".to_string(), vec!["U1".to_string(), "U2".to_string()]);
        let source = StaticSource::new(groups);

        assert_eq!(source.users("eng").await.unwrap(), vec!["U1", "U2"]);
        assert!(source.users("missing").await.unwrap().is_empty());
        assert!(source.test_connection().await.is_ok());
    }
}
