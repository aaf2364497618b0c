use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{error::GrantError, grant::Scope, parser::TokenCursor, util::sql::render_privilege};

pub const ALL_PRIVILEGES: &str = "ALL PRIVILEGES";
pub const USAGE: &str = "USAGE";
pub const GRANT_OPTION: &str = "GRANT OPTION";

/// Static privileges that can be held on a single table.
const TABLE_PRIVILEGES: &[&str] = &[
    "ALTER",
    "CREATE",
    "CREATE VIEW",
    "DELETE",
    "DROP",
    "INDEX",
    "INSERT",
    "REFERENCES",
    "SELECT",
    "SHOW VIEW",
    "TRIGGER",
    "UPDATE",
];

/// Added on top of the table privileges at database scope.
const DATABASE_PRIVILEGES: &[&str] = &[
    "ALTER ROUTINE",
    "CREATE ROUTINE",
    "CREATE TEMPORARY TABLES",
    "EVENT",
    "EXECUTE",
    "LOCK TABLES",
];

/// Added on top of the database privileges at global scope.
const GLOBAL_PRIVILEGES: &[&str] = &[
    "CREATE ROLE",
    "CREATE TABLESPACE",
    "CREATE USER",
    "DROP ROLE",
    "FILE",
    "PROCESS",
    "RELOAD",
    "REPLICATION CLIENT",
    "REPLICATION SLAVE",
    "SHOW DATABASES",
    "SHUTDOWN",
    "SUPER",
];

/// The privileges `ALL PRIVILEGES` stands for at `scope`.
pub fn grantable_privileges(scope: &Scope) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = TABLE_PRIVILEGES.to_vec();
    match scope {
        Scope::Table { .. } => {}
        Scope::Database { .. } => names.extend_from_slice(DATABASE_PRIVILEGES),
        Scope::Global => {
            names.extend_from_slice(DATABASE_PRIVILEGES);
            names.extend_from_slice(GLOBAL_PRIVILEGES);
        }
    }
    names.sort();
    names
}

/// Upper-cases a privilege name and collapses inner whitespace.
/// `ALL` is the shorthand of `ALL PRIVILEGES`.
pub fn canonical_name(name: &str) -> String {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    if name == "ALL" { ALL_PRIVILEGES.to_string() } else { name }
}

/// A single privilege, optionally restricted to a set of columns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Privilege {
    pub name: String,
    /// Empty for a privilege on the whole object.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub columns: BTreeSet<String>,
}

impl Privilege {
    pub fn new(name: &str) -> Self {
        Privilege {
            name: canonical_name(name),
            columns: BTreeSet::new(),
        }
    }

    pub fn with_columns<I, S>(name: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Privilege {
            name: canonical_name(name),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.name == ALL_PRIVILEGES
    }

    pub fn is_usage(&self) -> bool {
        self.name == USAGE
    }
}

impl FromStr for Privilege {
    type Err = GrantError;

    /// Parses a declared privilege such as `SELECT`, `ALL` or `INSERT(c3, c4)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cursor = TokenCursor::new(s).map_err(|e| GrantError::invalid_privilege(s, e))?;
        let privilege = cursor.privilege().map_err(|e| GrantError::invalid_privilege(s, e))?;
        if !cursor.is_at_end() {
            return Err(GrantError::invalid_privilege(s, "unexpected trailing input"));
        }
        if privilege.is_all() && !privilege.columns.is_empty() {
            return Err(GrantError::invalid_privilege(s, "ALL PRIVILEGES cannot be limited to columns"));
        }
        Ok(privilege)
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_privilege(self))
    }
}

/// A privilege on the whole object (`column == None`) or on one column.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Atom {
    name: String,
    column: Option<String>,
}

/// Set of privileges held in one scope.
///
/// Stored as `(name, column)` atoms, so column lists compare equal regardless
/// of their order and a column list can be diffed column by column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet {
    atoms: BTreeSet<Atom>,
}

impl PrivilegeSet {
    pub fn new() -> Self {
        PrivilegeSet::default()
    }

    pub fn all() -> Self {
        PrivilegeSet::from_privileges([Privilege::new(ALL_PRIVILEGES)])
    }

    pub fn from_privileges(privileges: impl IntoIterator<Item = Privilege>) -> Self {
        let mut set = PrivilegeSet::new();
        for privilege in privileges {
            set.insert(privilege);
        }
        set
    }

    /// `USAGE` means "no privileges" and is never stored.
    pub fn insert(&mut self, privilege: Privilege) {
        if privilege.is_usage() {
            return;
        }
        if privilege.columns.is_empty() {
            self.atoms.insert(Atom {
                name: privilege.name,
                column: None,
            });
        } else {
            for column in privilege.columns {
                self.atoms.insert(Atom {
                    name: privilege.name.clone(),
                    column: Some(column),
                });
            }
        }
    }

    pub fn extend(&mut self, other: &PrivilegeSet) {
        self.atoms.extend(other.atoms.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn is_all(&self) -> bool {
        self.atoms.contains(&Atom {
            name: ALL_PRIVILEGES.to_string(),
            column: None,
        })
    }

    pub fn has_column_privileges(&self) -> bool {
        self.atoms.iter().any(|a| a.column.is_some())
    }

    pub fn contains(&self, privilege: &Privilege) -> bool {
        PrivilegeSet::from_privileges([privilege.clone()]).is_subset(self)
    }

    pub fn is_subset(&self, other: &PrivilegeSet) -> bool {
        self.atoms.is_subset(&other.atoms)
    }

    pub fn difference(&self, other: &PrivilegeSet) -> PrivilegeSet {
        PrivilegeSet {
            atoms: self.atoms.difference(&other.atoms).cloned().collect(),
        }
    }

    /// Regroups the atoms into privileges: one entry per name for the whole
    /// object, one per name for its column list.
    pub fn privileges(&self) -> Vec<Privilege> {
        let mut out: Vec<Privilege> = Vec::new();
        for atom in &self.atoms {
            match &atom.column {
                None => out.push(Privilege {
                    name: atom.name.clone(),
                    columns: BTreeSet::new(),
                }),
                Some(column) => match out.last_mut() {
                    Some(last) if last.name == atom.name && !last.columns.is_empty() => {
                        last.columns.insert(column.clone());
                    }
                    _ => out.push(Privilege {
                        name: atom.name.clone(),
                        columns: BTreeSet::from([column.clone()]),
                    }),
                },
            }
        }
        out
    }

    /// Collapses to `{ALL PRIVILEGES}` when the set holds `ALL PRIVILEGES` or
    /// every static privilege grantable at `scope`.
    pub fn normalized(&self, scope: &Scope) -> PrivilegeSet {
        let covers_all = grantable_privileges(scope).into_iter().all(|name| {
            self.atoms.contains(&Atom {
                name: name.to_string(),
                column: None,
            })
        });
        if self.is_all() || covers_all {
            PrivilegeSet::all()
        } else {
            self.clone()
        }
    }

    /// Expands `ALL PRIVILEGES` into the privileges it stands for at `scope`.
    pub fn expanded(&self, scope: &Scope) -> PrivilegeSet {
        if self.is_all() {
            PrivilegeSet::from_privileges(grantable_privileges(scope).into_iter().map(Privilege::new))
        } else {
            self.clone()
        }
    }

    /// Set difference of two privilege sets held at `scope`, returned as
    /// `(to_grant, to_revoke)`.
    ///
    /// A desired `ALL PRIVILEGES` over anything less is a single `ALL` grant
    /// with nothing to revoke. An observed `ALL` that is no longer desired is
    /// revoked as a whole and the desired set granted in full.
    pub fn diff(desired: &PrivilegeSet, observed: &PrivilegeSet, scope: &Scope) -> (PrivilegeSet, PrivilegeSet) {
        let desired = desired.normalized(scope);
        let observed = observed.normalized(scope);

        match (desired.is_all(), observed.is_all()) {
            (true, true) => (PrivilegeSet::new(), PrivilegeSet::new()),
            (true, false) => (desired, PrivilegeSet::new()),
            (false, true) => (desired, observed),
            (false, false) => (desired.difference(&observed), observed.difference(&desired)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(privileges: &[&str]) -> PrivilegeSet {
        PrivilegeSet::from_privileges(privileges.iter().map(|p| p.parse::<Privilege>().unwrap()))
    }

    fn table() -> Scope {
        Scope::new("db", "tbl")
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_name("select"), "SELECT");
        assert_eq!(canonical_name("  show   view "), "SHOW VIEW");
        assert_eq!(canonical_name("all"), ALL_PRIVILEGES);
        assert_eq!(canonical_name("ALL PRIVILEGES"), ALL_PRIVILEGES);
    }

    #[test]
    fn test_parse_declared_privileges() {
        let p: Privilege = "SELECT (c1)".parse().unwrap();
        assert_eq!(p, Privilege::with_columns("SELECT", ["c1"]));

        let p: Privilege = "insert(c3,c4)".parse().unwrap();
        assert_eq!(p, Privilege::with_columns("INSERT", ["c4", "c3"]));

        let p: Privilege = "create temporary tables".parse().unwrap();
        assert_eq!(p.name, "CREATE TEMPORARY TABLES");
        assert!(p.columns.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_columns() {
        assert!("SELECT (c1,)".parse::<Privilege>().is_err());
        assert!("SELECT (1)".parse::<Privilege>().is_err());
        assert!("SELECT (c1".parse::<Privilege>().is_err());
        assert!("ALL (c1)".parse::<Privilege>().is_err());
        assert!("".parse::<Privilege>().is_err());
    }

    #[test]
    fn test_usage_is_not_stored() {
        assert!(set(&["USAGE"]).is_empty());
    }

    #[test]
    fn test_column_order_is_irrelevant() {
        assert_eq!(set(&["INSERT(c3,c4)"]), set(&["INSERT(c4, c3)"]));
        let (to_grant, to_revoke) = PrivilegeSet::diff(&set(&["INSERT(c3,c4)"]), &set(&["INSERT(c4,c3)"]), &table());
        assert!(to_grant.is_empty());
        assert!(to_revoke.is_empty());
    }

    #[test]
    fn test_diff_by_column() {
        let (to_grant, to_revoke) = PrivilegeSet::diff(
            &set(&["DROP", "SELECT (c1)", "INSERT(c4, c3, c2)"]),
            &set(&["DROP", "SELECT (c1)", "INSERT(c3,c4)", "REFERENCES(c5)"]),
            &table(),
        );
        assert_eq!(to_grant.privileges(), vec![Privilege::with_columns("INSERT", ["c2"])]);
        assert_eq!(to_revoke.privileges(), vec![Privilege::with_columns("REFERENCES", ["c5"])]);
    }

    #[test]
    fn test_all_absorbs_subset() {
        let (to_grant, to_revoke) = PrivilegeSet::diff(&set(&["ALL PRIVILEGES"]), &set(&["SELECT", "INSERT"]), &table());
        assert_eq!(to_grant, PrivilegeSet::all());
        assert!(to_revoke.is_empty());
    }

    #[test]
    fn test_all_and_all_privileges_are_equal() {
        let (to_grant, to_revoke) = PrivilegeSet::diff(&set(&["ALL"]), &set(&["ALL PRIVILEGES"]), &table());
        assert!(to_grant.is_empty());
        assert!(to_revoke.is_empty());
    }

    #[test]
    fn test_observed_all_is_revoked_whole() {
        let (to_grant, to_revoke) = PrivilegeSet::diff(&set(&["SELECT"]), &set(&["ALL"]), &table());
        assert_eq!(to_grant, set(&["SELECT"]));
        assert!(to_revoke.is_all());
    }

    #[test]
    fn test_enumerated_privileges_normalize_to_all() {
        let enumerated = PrivilegeSet::from_privileges(grantable_privileges(&table()).into_iter().map(Privilege::new));
        assert_eq!(enumerated.normalized(&table()), PrivilegeSet::all());
        // The table list is not everything at database scope.
        let db = Scope::new("db", "*");
        assert_ne!(enumerated.normalized(&db), PrivilegeSet::all());
        assert_eq!(PrivilegeSet::all().expanded(&table()), enumerated);
    }

    #[test]
    fn test_privileges_regroup_columns() {
        let s = set(&["SELECT", "SELECT (c2, c1)", "UPDATE"]);
        assert_eq!(
            s.privileges(),
            vec![
                Privilege::new("SELECT"),
                Privilege::with_columns("SELECT", ["c1", "c2"]),
                Privilege::new("UPDATE"),
            ]
        );
        assert!(s.has_column_privileges());
        assert!(s.contains(&Privilege::with_columns("SELECT", ["c1"])));
    }
}
