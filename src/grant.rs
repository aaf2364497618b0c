use std::{fmt, str::FromStr};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::{
    privilege::PrivilegeSet,
    util::sql::{render_grantee, render_scope},
};

pub const WILDCARD: &str = "*";
pub const DEFAULT_HOST: &str = "%";

/// The object a grant applies to. `*` is the "all" sentinel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Database { name: String },
    Table { database: String, table: String },
}

impl Scope {
    /// Builds the canonical scope for `database`.`table`: `db.*` is a
    /// database scope and `*.*` is global.
    pub fn new(database: &str, table: &str) -> Scope {
        match (database, table) {
            (WILDCARD, _) => Scope::Global,
            (database, WILDCARD) => Scope::Database {
                name: database.to_string(),
            },
            (database, table) => Scope::Table {
                database: database.to_string(),
                table: table.to_string(),
            },
        }
    }

    pub fn database(&self) -> &str {
        match self {
            Scope::Global => WILDCARD,
            Scope::Database { name } => name,
            Scope::Table { database, .. } => database,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Scope::Table { table, .. } => table,
            _ => WILDCARD,
        }
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Scope::Table { .. })
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_scope(self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grantee {
    User { name: String, host: String },
    Role { name: String },
}

impl Grantee {
    pub fn user(name: &str, host: Option<&str>) -> Grantee {
        Grantee::User {
            name: name.to_string(),
            host: host.unwrap_or(DEFAULT_HOST).to_string(),
        }
    }

    pub fn role(name: &str) -> Grantee {
        Grantee::Role { name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        match self {
            Grantee::User { name, .. } | Grantee::Role { name } => name,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Grantee::User { host, .. } => Some(host),
            Grantee::Role { .. } => None,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Grantee::User { .. })
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_grantee(self))
    }
}

/// Transport security an account must use (`REQUIRE ...`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TlsOption {
    #[default]
    None,
    Ssl,
    X509,
}

impl TlsOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsOption::None => "NONE",
            TlsOption::Ssl => "SSL",
            TlsOption::X509 => "X509",
        }
    }
}

impl fmt::Display for TlsOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NONE" => Ok(TlsOption::None),
            "SSL" => Ok(TlsOption::Ssl),
            "X509" => Ok(TlsOption::X509),
            other => Err(format!("unsupported TLS option `{}`", other)),
        }
    }
}

/// Identity of a grant: at most one canonical grant exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    pub grantee: Grantee,
    pub scope: Scope,
}

impl fmt::Display for GrantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ON {}", self.grantee, self.scope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub grantee: Grantee,
    pub scope: Scope,
    pub privileges: PrivilegeSet,
    /// `WITH GRANT OPTION` applies to the whole grant row of the scope.
    pub grant_option: bool,
    pub tls_option: TlsOption,
    /// Roles assigned to a user grantee.
    pub roles: IndexSet<String>,
}

impl Grant {
    pub fn empty(key: &GrantKey) -> Grant {
        Grant {
            grantee: key.grantee.clone(),
            scope: key.scope.clone(),
            privileges: PrivilegeSet::new(),
            grant_option: false,
            tls_option: TlsOption::None,
            roles: IndexSet::new(),
        }
    }

    pub fn key(&self) -> GrantKey {
        GrantKey {
            grantee: self.grantee.clone(),
            scope: self.scope.clone(),
        }
    }

    /// True when nothing is held in this grant's scope and no roles are assigned.
    pub fn is_empty(&self) -> bool {
        self.privileges.is_empty() && !self.grant_option && self.roles.is_empty()
    }
}
