use crate::{
    grant::{Grant, GrantKey, Grantee, Scope, TlsOption},
    op::GrantOp,
    privilege::{Privilege, USAGE},
};

/// Backtick-quotes a database, table or column name. `*` is never quoted.
pub fn quote_identifier(name: &str) -> String {
    if name == "*" {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub fn render_column(column: &str) -> String {
    if is_plain_identifier(column) {
        column.to_string()
    } else {
        quote_identifier(column)
    }
}

pub fn render_grantee(grantee: &Grantee) -> String {
    match grantee {
        Grantee::User { name, host } => format!("{}@{}", quote_string(name), quote_string(host)),
        Grantee::Role { name } => quote_string(name),
    }
}

pub fn render_scope(scope: &Scope) -> String {
    format!("{}.{}", quote_identifier(scope.database()), quote_identifier(scope.table()))
}

pub fn render_privilege(privilege: &Privilege) -> String {
    if privilege.columns.is_empty() {
        privilege.name.clone()
    } else {
        let columns: Vec<String> = privilege.columns.iter().map(|c| render_column(c)).collect();
        format!("{} ({})", privilege.name, columns.join(", "))
    }
}

/// Comma-joined privilege list; `USAGE` when empty.
pub fn render_privilege_list(privileges: &[Privilege]) -> String {
    if privileges.is_empty() {
        return USAGE.to_string();
    }
    privileges.iter().map(render_privilege).collect::<Vec<_>>().join(", ")
}

pub fn build_show_grants_sql(grantee: &Grantee) -> String {
    format!("SHOW GRANTS FOR {}", render_grantee(grantee))
}

pub fn build_grant_sql(key: &GrantKey, privileges: &[Privilege], tls_option: Option<TlsOption>, grant_option: bool) -> String {
    let mut sql = format!(
        "GRANT {} ON {} TO {}",
        render_privilege_list(privileges),
        render_scope(&key.scope),
        render_grantee(&key.grantee)
    );

    if let Some(tls_option) = tls_option {
        sql.push_str(&format!(" REQUIRE {}", tls_option));
    }
    if grant_option {
        sql.push_str(" WITH GRANT OPTION");
    }
    sql
}

pub fn build_revoke_sql(key: &GrantKey, privileges: &[Privilege]) -> String {
    format!(
        "REVOKE {} ON {} FROM {}",
        render_privilege_list(privileges),
        render_scope(&key.scope),
        render_grantee(&key.grantee)
    )
}

pub fn build_revoke_all_sql(key: &GrantKey) -> String {
    format!(
        "REVOKE ALL PRIVILEGES ON {} FROM {}",
        render_scope(&key.scope),
        render_grantee(&key.grantee)
    )
}

pub fn build_revoke_grant_option_sql(key: &GrantKey) -> String {
    format!(
        "REVOKE GRANT OPTION ON {} FROM {}",
        render_scope(&key.scope),
        render_grantee(&key.grantee)
    )
}

pub fn build_grant_role_sql(role: &str, grantee: &Grantee) -> String {
    format!("GRANT {} TO {}", quote_string(role), render_grantee(grantee))
}

pub fn build_revoke_role_sql(role: &str, grantee: &Grantee) -> String {
    format!("REVOKE {} FROM {}", quote_string(role), render_grantee(grantee))
}

pub fn build_op_sql(key: &GrantKey, op: &GrantOp) -> String {
    match op {
        GrantOp::RevokeAll => build_revoke_all_sql(key),
        GrantOp::RevokePrivileges(privileges) => build_revoke_sql(key, privileges),
        GrantOp::RevokeGrantOption => build_revoke_grant_option_sql(key),
        GrantOp::RevokeRole(role) => build_revoke_role_sql(role, &key.grantee),
        GrantOp::GrantPrivileges {
            privileges,
            tls_option,
            grant_option,
        } => build_grant_sql(key, privileges, *tls_option, *grant_option),
        GrantOp::GrantRole(role) => build_grant_role_sql(role, &key.grantee),
    }
}

/// Renders ops in order. The differ already puts revokes before grants.
pub fn build_statements(key: &GrantKey, ops: &[GrantOp]) -> Vec<String> {
    ops.iter().map(|op| build_op_sql(key, op)).collect()
}

/// Statements that create `grant` from nothing: the privilege line, then one
/// line per assigned role.
pub fn build_grant_statements(grant: &Grant) -> Vec<String> {
    let key = grant.key();
    let tls_option = (grant.tls_option != TlsOption::None).then_some(grant.tls_option);

    let mut statements = vec![build_grant_sql(
        &key,
        &grant.privileges.privileges(),
        tls_option,
        grant.grant_option,
    )];
    for role in &grant.roles {
        statements.push(build_grant_role_sql(role, &grant.grantee));
    }
    statements
}
