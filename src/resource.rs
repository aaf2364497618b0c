use indexmap::IndexSet;
use lazy_static::lazy_static;
use ron::{extensions::Extensions, ser::PrettyConfig};
use serde::{Deserialize, Serialize};

use crate::{
    addr::GrantId,
    error::GrantError,
    grant::{Grant, GrantKey, Grantee, Scope, TlsOption, WILDCARD},
    util::validate::{parse_privileges, validate_grant_resource},
};

lazy_static! {
    pub static ref RON: ron::Options = ron::Options::default().with_default_extension(Extensions::IMPLICIT_SOME);
}

fn wildcard() -> String {
    WILDCARD.to_string()
}

/// Desired privileges of one user or role on one database or table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GrantResource {
    /// The user receiving the grant. Exactly one of `user` and `role` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// The role receiving the grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Host part of the user account, `%` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Database name, or `*` for global privileges.
    pub database: String,
    /// Table name, or `*` for the whole database.
    #[serde(default = "wildcard")]
    pub table: String,
    /// Privileges such as `SELECT`, `ALL` or `INSERT (c1, c2)`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<String>,
    #[serde(default)]
    pub tls_option: TlsOption,
    /// Roles assigned to the user. Role assignments are account-wide: applying
    /// this record revokes any role the account holds that is not listed, so
    /// only one record per user should manage `roles`.
    #[serde(default, skip_serializing_if = "IndexSet::is_empty")]
    pub roles: IndexSet<String>,
    /// Grant `WITH GRANT OPTION`.
    #[serde(default)]
    pub grant: bool,
}

impl GrantResource {
    pub fn for_user(user: &str, host: Option<&str>, database: &str) -> Self {
        GrantResource {
            user: Some(user.to_string()),
            role: None,
            host: host.map(str::to_string),
            database: database.to_string(),
            table: wildcard(),
            privileges: Vec::new(),
            tls_option: TlsOption::None,
            roles: IndexSet::new(),
            grant: false,
        }
    }

    pub fn for_role(role: &str, database: &str) -> Self {
        GrantResource {
            user: None,
            role: Some(role.to_string()),
            ..GrantResource::for_user("", None, database)
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, anyhow::Error> {
        let pretty_config = PrettyConfig::default().struct_names(true);
        match RON.to_string_pretty(&self, pretty_config) {
            Ok(s) => Ok(s.into()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_bytes(s: &[u8]) -> Result<Self, anyhow::Error> {
        let s = std::str::from_utf8(s)?;
        Ok(RON.from_str(s)?)
    }

    pub fn grantee(&self) -> Result<Grantee, GrantError> {
        validate_grant_resource(self)?;
        match (&self.user, &self.role) {
            (Some(user), _) => Ok(Grantee::user(user, self.host.as_deref())),
            (None, Some(role)) => Ok(Grantee::role(role)),
            (None, None) => Err(GrantError::InvalidResource("one of `user` or `role` must be set".into())),
        }
    }

    pub fn key(&self) -> Result<GrantKey, GrantError> {
        Ok(GrantKey {
            grantee: self.grantee()?,
            scope: Scope::new(&self.database, &self.table),
        })
    }

    pub fn id(&self) -> Result<GrantId, GrantError> {
        Ok(GrantId::from_key(&self.key()?))
    }

    /// Builds the desired grant. Called afresh on every reconciliation pass.
    pub fn to_grant(&self) -> Result<Grant, GrantError> {
        let key = self.key()?;
        let privileges = parse_privileges(&self.privileges, &key.scope)?.normalized(&key.scope);
        let roles = if key.grantee.is_user() {
            self.roles.clone()
        } else {
            IndexSet::new()
        };

        Ok(Grant {
            grantee: key.grantee,
            scope: key.scope,
            privileges,
            grant_option: self.grant,
            tls_option: self.tls_option,
            roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privilege::{Privilege, PrivilegeSet};

    #[test]
    fn test_ron_defaults() {
        let text = r#"GrantResource(
            user: "jdoe-tf-test-12",
            host: "example.com",
            database: "tf-test-12",
            privileges: ["UPDATE", "SELECT"],
        )"#;
        let resource = GrantResource::from_bytes(text.as_bytes()).unwrap();
        assert_eq!(resource.table, "*");
        assert_eq!(resource.tls_option, TlsOption::None);
        assert!(!resource.grant);

        let grant = resource.to_grant().unwrap();
        assert_eq!(grant.grantee, Grantee::user("jdoe-tf-test-12", Some("example.com")));
        assert_eq!(grant.scope, Scope::new("tf-test-12", "*"));
        assert_eq!(
            grant.privileges,
            PrivilegeSet::from_privileges([Privilege::new("SELECT"), Privilege::new("UPDATE")])
        );
    }

    #[test]
    fn test_ron_round_trip() {
        let mut resource = GrantResource::for_user("jdoe", None, "db");
        resource.table = "tbl".into();
        resource.privileges = vec!["SELECT (c1)".into()];
        resource.tls_option = TlsOption::Ssl;
        resource.roles.insert("TFRole7".into());

        let bytes = resource.to_bytes().unwrap();
        assert_eq!(GrantResource::from_bytes(&bytes).unwrap(), resource);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let text = r#"GrantResource(user: "jdoe", database: "db", privs: ["SELECT"])"#;
        assert!(GrantResource::from_bytes(text.as_bytes()).is_err());
    }

    #[test]
    fn test_role_key() {
        let resource = GrantResource::for_role("TFRole7", "db");
        let key = resource.key().unwrap();
        assert_eq!(key.grantee, Grantee::role("TFRole7"));
        assert_eq!(resource.id().unwrap().to_string(), "TFRole7::db:*");
    }
}
