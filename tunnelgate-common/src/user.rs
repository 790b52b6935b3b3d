use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::Secret;

/// The literal routing key that selects the in-process SOCKS5 handler
/// instead of a TCP forward.
pub const SOCKS_ROUTING_KEY: &str = "socks";

#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub password: Secret<String>,
    allow_patterns: Vec<Regex>,
}

impl User {
    pub fn new(
        name: String,
        password: String,
        allow_patterns: impl IntoIterator<Item = String>,
    ) -> Result<Self, regex::Error> {
        let allow_patterns = allow_patterns
            .into_iter()
            .map(|p| Regex::new(&p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name,
            password: Secret::new(password),
            allow_patterns,
        })
    }

    pub fn has_access(&self, addr: &str) -> bool {
        self.allow_patterns.iter().any(|p| p.is_match(addr))
    }
}

/// `name -> User`. An empty table disables authentication: every session is
/// unrestricted and any credentials are accepted.
#[derive(Debug, Clone, Default)]
pub struct UserTable {
    users: HashMap<String, User>,
}

pub enum AuthOutcome {
    /// The table is empty; there is nothing to authenticate against.
    Unrestricted,
    /// `name`/`password` matched a configured user.
    Bound(User),
    /// Unknown user or wrong password. The two cases are deliberately not
    /// distinguished, including in logs.
    Denied,
}

impl UserTable {
    pub fn new(users: impl IntoIterator<Item = User>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.name.clone(), u)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Single `name:password` shorthand, granting access to everything.
    pub fn single(name: String, password: String) -> Result<Self, regex::Error> {
        Ok(Self::new([User::new(name, password, ["^.*$".to_string()])?]))
    }

    pub fn merge(mut self, other: Self) -> Self {
        self.users.extend(other.users);
        self
    }

    pub fn authenticate(&self, name: &str, password: &str) -> AuthOutcome {
        if self.users.is_empty() {
            return AuthOutcome::Unrestricted;
        }
        match self.users.get(name) {
            Some(user) if user.password.expose_secret() == password => {
                AuthOutcome::Bound(user.clone())
            }
            _ => AuthOutcome::Denied,
        }
    }

    /// Checks every requested remote against `user`'s ACL, in order, and
    /// names the first address that fails.
    pub fn check_remotes(user: Option<&User>, remotes: &[RemoteSpec]) -> Result<(), String> {
        let Some(user) = user else {
            // Unrestricted session: nothing to check.
            return Ok(());
        };
        for remote in remotes {
            let addr = remote.routing_key();
            if addr == SOCKS_ROUTING_KEY {
                continue;
            }
            if !user.has_access(&addr) {
                return Err(addr);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSpec {
    pub remote_host: String,
    pub remote_port: String,
}

impl RemoteSpec {
    /// The string checked against the ACL and, for non-SOCKS remotes, dialed.
    pub fn routing_key(&self) -> String {
        if self.remote_host == SOCKS_ROUTING_KEY {
            SOCKS_ROUTING_KEY.to_string()
        } else {
            format!("{}:{}", self.remote_host, self.remote_port)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub version: String,
    pub remotes: Vec<RemoteSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(host: &str, port: &str) -> RemoteSpec {
        RemoteSpec {
            remote_host: host.to_string(),
            remote_port: port.to_string(),
        }
    }

    #[test]
    fn empty_table_is_unrestricted() {
        let table = UserTable::default();
        assert!(table.is_empty());
        assert!(matches!(
            table.authenticate("anyone", "anything"),
            AuthOutcome::Unrestricted
        ));
    }

    #[test]
    fn authenticate_matches_name_and_password() {
        let table = UserTable::single("alice".to_string(), "hunter2".to_string()).unwrap();
        assert!(matches!(
            table.authenticate("alice", "hunter2"),
            AuthOutcome::Bound(_)
        ));
        assert!(matches!(
            table.authenticate("alice", "wrong"),
            AuthOutcome::Denied
        ));
        assert!(matches!(
            table.authenticate("bob", "hunter2"),
            AuthOutcome::Denied
        ));
    }

    #[test]
    fn has_access_matches_allow_patterns() {
        let user = User::new(
            "alice".to_string(),
            "pw".to_string(),
            vec!["^10\\.0\\.0\\.\\d+:22$".to_string()],
        )
        .unwrap();
        assert!(user.has_access("10.0.0.5:22"));
        assert!(!user.has_access("10.0.0.5:23"));
        assert!(!user.has_access("example.com:22"));
    }

    #[test]
    fn check_remotes_allows_unrestricted_session() {
        let remotes = vec![remote("example.com", "22")];
        assert!(UserTable::check_remotes(None, &remotes).is_ok());
    }

    #[test]
    fn check_remotes_reports_first_denied_address() {
        let user = User::new(
            "alice".to_string(),
            "pw".to_string(),
            vec!["^allowed\\.example:22$".to_string()],
        )
        .unwrap();
        let remotes = vec![
            remote("allowed.example", "22"),
            remote("denied.example", "22"),
        ];
        assert_eq!(
            UserTable::check_remotes(Some(&user), &remotes),
            Err("denied.example:22".to_string())
        );
    }

    #[test]
    fn check_remotes_skips_acl_for_socks_routing_key() {
        let user = User::new("alice".to_string(), "pw".to_string(), Vec::<String>::new()).unwrap();
        let remotes = vec![remote(SOCKS_ROUTING_KEY, "0")];
        assert!(UserTable::check_remotes(Some(&user), &remotes).is_ok());
    }

    #[test]
    fn routing_key_is_literal_socks_for_socks_remote() {
        assert_eq!(remote(SOCKS_ROUTING_KEY, "0").routing_key(), "socks");
        assert_eq!(remote("example.com", "22").routing_key(), "example.com:22");
    }
}
