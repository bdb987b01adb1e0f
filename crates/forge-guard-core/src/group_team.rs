//! Sibling group-system team record.
//!
//! The default member source for teams: another controller maintains these
//! records and publishes resolved memberships in their status. Only the
//! member ids are consumed here.

use serde::{Deserialize, Serialize};

use crate::impl_store_object;
use crate::metadata::ObjectMeta;

/// A team record owned by the sibling group-management system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTeam {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: GroupTeamStatus,
}

impl_store_object!(GroupTeam, "GroupTeam");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTeamStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<GroupMember>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

impl GroupTeam {
    /// The member ids this record resolves to.
    #[must_use]
    pub fn member_ids(&self) -> Vec<String> {
        self.status.members.iter().map(|m| m.id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_ids() {
        let team = GroupTeam {
            metadata: ObjectMeta::named("eng"),
            status: GroupTeamStatus {
                members: vec![
                    GroupMember {
                        id: "U1".to_string(),
                        email: "u1@example.com".to_string(),
                        ..GroupMember::default()
                    },
                    GroupMember {
                        id: "U2".to_string(),
                        ..GroupMember::default()
                    },
                ],
            },
        };
        assert_eq!(team.member_ids(), vec!["U1", "U2"]);
    }
}
