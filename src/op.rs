use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    grant::{GrantKey, TlsOption},
    privilege::Privilege,
    util::sql::render_privilege_list,
};

/// A single change to the grant identified by a `GrantKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantOp {
    RevokeAll,
    RevokePrivileges(Vec<Privilege>),
    RevokeGrantOption,
    RevokeRole(String),
    GrantPrivileges {
        privileges: Vec<Privilege>,
        /// Set when the statement must (re)state the account's TLS requirement.
        tls_option: Option<TlsOption>,
        grant_option: bool,
    },
    GrantRole(String),
}

impl GrantOp {
    pub fn is_revoke(&self) -> bool {
        matches!(
            self,
            GrantOp::RevokeAll | GrantOp::RevokePrivileges(_) | GrantOp::RevokeGrantOption | GrantOp::RevokeRole(_)
        )
    }

    pub fn friendly_message(&self, key: &GrantKey) -> String {
        match self {
            GrantOp::RevokeAll => format!("Revoke all privileges on {} from {}", key.scope, key.grantee),
            GrantOp::RevokePrivileges(privileges) => format!(
                "Revoke {} on {} from {}",
                render_privilege_list(privileges),
                key.scope,
                key.grantee
            ),
            GrantOp::RevokeGrantOption => format!("Revoke grant option on {} from {}", key.scope, key.grantee),
            GrantOp::RevokeRole(role) => format!("Revoke role `{}` from {}", role, key.grantee),
            GrantOp::GrantPrivileges { privileges, tls_option, .. } => match tls_option {
                Some(tls_option) => format!(
                    "Grant {} on {} to {} requiring {}",
                    render_privilege_list(privileges),
                    key.scope,
                    key.grantee,
                    tls_option
                ),
                None => format!(
                    "Grant {} on {} to {}",
                    render_privilege_list(privileges),
                    key.scope,
                    key.grantee
                ),
            },
            GrantOp::GrantRole(role) => format!("Grant role `{}` to {}", role, key.grantee),
        }
    }

    pub fn to_json(&self) -> Result<String, anyhow::Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromStr for GrantOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::{Grantee, Scope};

    #[test]
    fn test_op_json() {
        let op = GrantOp::GrantPrivileges {
            privileges: vec![Privilege::with_columns("SELECT", ["c1"])],
            tls_option: Some(TlsOption::Ssl),
            grant_option: false,
        };
        let decoded: GrantOp = op.to_json().unwrap().parse().unwrap();
        assert_eq!(decoded, op);
        assert!(!decoded.is_revoke());
        assert!(GrantOp::RevokeRole("r".into()).is_revoke());
    }

    #[test]
    fn test_friendly_message() {
        let key = GrantKey {
            grantee: Grantee::role("reader"),
            scope: Scope::new("db", "*"),
        };
        assert_eq!(
            GrantOp::RevokePrivileges(vec![Privilege::new("UPDATE")]).friendly_message(&key),
            "Revoke UPDATE on `db`.* from 'reader'"
        );
    }
}
