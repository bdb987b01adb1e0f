//! Identity translation between internal user ids and forge logins.
//!
//! Account links map internal ids to numeric forge user ids. Inputs that
//! carry no link are assumed to already be forge logins; when such a
//! login's numeric id maps back to an internal id through a link, the
//! link-backed interpretation wins. Logins compare case-insensitively
//! throughout.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use forge_guard_core::account_link::AccountLink;
use forge_guard_core::member::Member;
use forge_guard_forge::{ForgeAccount, ForgeApi, ForgeResult};

/// Lookup maps over the account links of one forge.
pub struct LinkMaps {
    /// internal id → numeric forge user id.
    id_to_forge_id: HashMap<String, String>,
    /// numeric forge user id → internal id.
    forge_id_to_id: HashMap<String, String>,
    /// internal id → link record.
    by_user_id: HashMap<String, AccountLink>,
    /// numeric forge user id → link record.
    by_forge_id: HashMap<String, AccountLink>,
}

impl LinkMaps {
    /// Index the links belonging to `forge`.
    #[must_use]
    pub fn build(links: &[AccountLink], forge: &str) -> Self {
        let mut maps = Self {
            id_to_forge_id: HashMap::new(),
            forge_id_to_id: HashMap::new(),
            by_user_id: HashMap::new(),
            by_forge_id: HashMap::new(),
        };
        for link in links {
            if link.spec.forge != forge {
                continue;
            }
            maps.id_to_forge_id
                .insert(link.spec.user_id.clone(), link.spec.forge_user_id.clone());
            maps.forge_id_to_id
                .insert(link.spec.forge_user_id.clone(), link.spec.user_id.clone());
            maps.by_user_id
                .insert(link.spec.user_id.clone(), link.clone());
            maps.by_forge_id
                .insert(link.spec.forge_user_id.clone(), link.clone());
        }
        maps
    }

    /// The link for an internal id, falling back to the forge-id index.
    fn link_for(&self, internal_id: &str) -> Option<&AccountLink> {
        if let Some(link) = self.by_user_id.get(internal_id) {
            return Some(link);
        }
        self.id_to_forge_id
            .get(internal_id)
            .and_then(|fid| self.by_forge_id.get(fid))
    }

    /// internal id for a numeric forge user id, falling back to `login`.
    #[must_use]
    pub fn internal_id_or_login(&self, forge_user_id: i64, login: &str) -> String {
        self.forge_id_to_id
            .get(&forge_user_id.to_string())
            .cloned()
            .unwrap_or_else(|| login.to_string())
    }
}

/// Translate observed forge accounts into `(internal id, login)` members.
#[must_use]
pub fn observed_members(maps: &LinkMaps, accounts: &[ForgeAccount]) -> Vec<Member> {
    accounts
        .iter()
        .map(|account| {
            Member::new(
                maps.internal_id_or_login(account.user_id, &account.login),
                account.login.clone(),
            )
        })
        .collect()
}

/// Translate desired internal ids into `(internal id, login)` members,
/// optionally keeping only members whose account link reports a verified
/// email for `required_domain` in `organization`.
pub async fn desired_members(
    forge: &Arc<dyn ForgeApi>,
    installation: i64,
    maps: &LinkMaps,
    ids: &[String],
    required_domain: Option<&str>,
    organization: &str,
) -> ForgeResult<Vec<Member>> {
    let mut members = Vec::with_capacity(ids.len());

    for input in ids {
        let mut internal_id = input.clone();
        let mut login = input.clone();

        if let Some(forge_user_id) = maps.id_to_forge_id.get(input) {
            // Linked internal id: resolve the canonical login.
            if let Ok(numeric) = forge_user_id.parse::<i64>() {
                if let Some(resolved) = forge.login_by_user_id(installation, numeric).await? {
                    login = resolved;
                }
            }
        } else if let Some(forge_user_id) = forge.user_id_by_login(installation, input).await? {
            // Unlinked input that resolves as a login: adopt the reverse
            // mapping when a link exists for that numeric id.
            if let Some(mapped) = maps.forge_id_to_id.get(&forge_user_id.to_string()) {
                if !mapped.is_empty() {
                    internal_id = mapped.clone();
                }
            }
            if let Some(resolved) = forge.login_by_user_id(installation, forge_user_id).await? {
                login = resolved;
            }
        }

        if let Some(domain) = required_domain {
            let verified = maps
                .link_for(&internal_id)
                .map(|link| link.verified_for(organization, domain))
                .unwrap_or(false);
            if !verified {
                debug!(
                    member = %internal_id,
                    organization,
                    domain,
                    "member filtered by verified-domain requirement"
                );
                continue;
            }
        }

        members.push(Member::new(internal_id, login));
    }

    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_guard_core::account_link::AccountLinkSpec;
    use forge_guard_core::ObjectMeta;

    fn link(user_id: &str, forge_user_id: &str, forge: &str) -> AccountLink {
        AccountLink {
            metadata: ObjectMeta::named(format!("{user_id}-link")),
            spec: AccountLinkSpec {
                user_id: user_id.to_string(),
                forge_user_id: forge_user_id.to_string(),
                forge: forge.to_string(),
            },
        }
    }

    #[test]
    fn test_build_filters_by_forge() {
        let links = vec![link("U1", "42", "main"), link("U2", "77", "other")];
        let maps = LinkMaps::build(&links, "main");
        assert_eq!(maps.internal_id_or_login(42, "u1"), "U1");
        // Link for a different forge is invisible.
        assert_eq!(maps.internal_id_or_login(77, "u2"), "u2");
    }

    #[test]
    fn test_observed_members_fall_back_to_login() {
        let maps = LinkMaps::build(&[link("U1", "42", "main")], "main");
        let accounts = vec![ForgeAccount::new("u1", 42), ForgeAccount::new("guest", 99)];
        let members = observed_members(&maps, &accounts);
        assert_eq!(members[0], Member::new("U1", "u1"));
        assert_eq!(members[1], Member::new("guest", "guest"));
    }
}
