use std::{fmt, str::FromStr};

use crate::{
    error::GrantError,
    grant::{GrantKey, Grantee, Scope},
};

/// Resource identifier of a grant: `<grantee>:<host>:<database>:<table>`.
///
/// The host is empty for roles, e.g. `reader::db:*`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantId {
    pub grantee: Grantee,
    pub database: String,
    pub table: String,
}

impl GrantId {
    pub fn from_key(key: &GrantKey) -> Self {
        GrantId {
            grantee: key.grantee.clone(),
            database: key.scope.database().to_string(),
            table: key.scope.table().to_string(),
        }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey {
            grantee: self.grantee.clone(),
            scope: Scope::new(&self.database, &self.table),
        }
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.grantee.name(),
            self.grantee.host().unwrap_or(""),
            self.database,
            self.table
        )
    }
}

impl FromStr for GrantId {
    type Err = GrantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(4, ':').collect();

        match parts[..] {
            [name, host, database, table] if !name.is_empty() && !database.is_empty() && !table.is_empty() => {
                let grantee = if host.is_empty() {
                    Grantee::role(name)
                } else {
                    Grantee::user(name, Some(host))
                };
                Ok(GrantId {
                    grantee,
                    database: database.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(GrantError::InvalidId(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id() {
        let id: GrantId = "jdoe-x:example.com:tf-test-1:tbl".parse().unwrap();
        assert_eq!(id.grantee, Grantee::user("jdoe-x", Some("example.com")));
        assert_eq!(id.key().scope, Scope::new("tf-test-1", "tbl"));
        assert_eq!(id.to_string(), "jdoe-x:example.com:tf-test-1:tbl");
    }

    #[test]
    fn test_role_id() {
        let id: GrantId = "TFRole7::db:*".parse().unwrap();
        assert_eq!(id.grantee, Grantee::role("TFRole7"));
        assert_eq!(id.key().scope, Scope::new("db", "*"));
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "jdoe", "jdoe:%:db", ":%:db:*", "jdoe:%::*"] {
            assert!(matches!(id.parse::<GrantId>(), Err(GrantError::InvalidId(_))), "{id}");
        }
    }

    #[test]
    fn test_id_from_key_uses_wildcards() {
        let key = GrantKey {
            grantee: Grantee::user("jdoe", None),
            scope: Scope::Global,
        };
        assert_eq!(GrantId::from_key(&key).to_string(), "jdoe:%:*:*");
    }
}
