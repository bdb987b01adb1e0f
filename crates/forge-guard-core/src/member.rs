//! Identity pair linking an internal user id to a forge login.

use serde::{Deserialize, Serialize};

/// A team or organization member as tracked in resource statuses.
///
/// `id` is the internal (directory-side) identifier, `login` the forge
/// login it maps to. When no account link exists for a user the two
/// fields carry the same value; forge logins compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub login: String,
}

impl Member {
    #[must_use]
    pub fn new(id: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            login: login.into(),
        }
    }

    /// Case-insensitive login equality.
    #[must_use]
    pub fn same_login(&self, login: &str) -> bool {
        self.login.eq_ignore_ascii_case(login)
    }
}

/// Whether two member lists contain the same elements, ignoring order.
///
/// Comparison is by full `(id, login)` pair; duplicates must match up.
#[must_use]
pub fn members_match(a: &[Member], b: &[Member]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&Member> = b.iter().collect();
    for m in a {
        match remaining.iter().position(|other| *other == m) {
            Some(idx) => {
                remaining.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}

/// Whether two string lists contain the same elements, ignoring order.
#[must_use]
pub fn names_match(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut remaining: Vec<&String> = b.iter().collect();
    for s in a {
        match remaining.iter().position(|other| *other == s) {
            Some(idx) => {
                remaining.swap_remove(idx);
            }
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_login_is_case_insensitive() {
        let m = Member::new("U1", "OctoCat");
        assert!(m.same_login("octocat"));
        assert!(m.same_login("OCTOCAT"));
        assert!(!m.same_login("other"));
    }

    #[test]
    fn test_members_match_ignores_order() {
        let a = vec![Member::new("u1", "a"), Member::new("u2", "b")];
        let b = vec![Member::new("u2", "b"), Member::new("u1", "a")];
        assert!(members_match(&a, &b));
    }

    #[test]
    fn test_members_match_detects_differences() {
        let a = vec![Member::new("u1", "a")];
        let b = vec![Member::new("u1", "b")];
        assert!(!members_match(&a, &b));
        assert!(!members_match(&a, &[]));
    }

    #[test]
    fn test_members_match_counts_duplicates() {
        let a = vec![Member::new("u1", "a"), Member::new("u1", "a")];
        let b = vec![Member::new("u1", "a")];
        assert!(!members_match(&a, &b));
    }
}
