use crate::{
    error::GrantError,
    grant::{Scope, TlsOption, WILDCARD},
    privilege::{GRANT_OPTION, Privilege, PrivilegeSet},
    resource::GrantResource,
};

/// Checks the shape of a desired-state record before any SQL is issued.
pub fn validate_grant_resource(resource: &GrantResource) -> Result<(), GrantError> {
    match (&resource.user, &resource.role) {
        (Some(_), Some(_)) => {
            return Err(GrantError::InvalidResource("only one of `user` and `role` can be set".into()));
        }
        (None, None) => {
            return Err(GrantError::InvalidResource("one of `user` or `role` must be set".into()));
        }
        (Some(name), None) | (None, Some(name)) if name.is_empty() => {
            return Err(GrantError::InvalidResource("grantee name cannot be empty".into()));
        }
        _ => {}
    }

    if resource.role.is_some() {
        if resource.host.is_some() {
            return Err(GrantError::InvalidResource("`host` only applies to users".into()));
        }
        if !resource.roles.is_empty() {
            return Err(GrantError::InvalidResource("roles can only be assigned to users".into()));
        }
        if resource.tls_option != TlsOption::None {
            return Err(GrantError::InvalidResource("`tls_option` only applies to users".into()));
        }
    }

    if resource.database.is_empty() || resource.table.is_empty() {
        return Err(GrantError::InvalidResource("`database` and `table` cannot be empty".into()));
    }
    if resource.database == WILDCARD && resource.table != WILDCARD {
        return Err(GrantError::InvalidResource(format!(
            "table `{}` needs a database, got `*`",
            resource.table
        )));
    }

    Ok(())
}

/// Parses declared privileges for `scope`.
///
/// Privilege names are not checked against the server's list; an unknown
/// name is rejected by the server when the GRANT runs.
pub fn parse_privileges(privileges: &[String], scope: &Scope) -> Result<PrivilegeSet, GrantError> {
    let mut set = PrivilegeSet::new();
    for declared in privileges {
        let privilege: Privilege = declared.parse()?;
        if privilege.name == GRANT_OPTION {
            return Err(GrantError::invalid_privilege(declared, "set `grant = true` instead"));
        }
        if !privilege.columns.is_empty() && !scope.is_table() {
            return Err(GrantError::invalid_privilege(
                declared,
                "column privileges are only valid on a single table",
            ));
        }
        set.insert(privilege);
    }
    Ok(set)
}
