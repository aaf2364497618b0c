use crate::{grant::Grant, op::GrantOp, privilege::PrivilegeSet};

/// Computes the ops that turn `observed` into `desired`.
///
/// Both grants must share the same key. Revokes come first so that a read
/// between statements never sees more than was asked for.
pub fn diff(desired: &Grant, observed: &Grant) -> Vec<GrantOp> {
    debug_assert_eq!(desired.key(), observed.key());

    let scope = &desired.scope;
    let desired_privileges = desired.privileges.normalized(scope);
    let (to_grant, to_revoke) = PrivilegeSet::diff(&desired_privileges, &observed.privileges, scope);

    let mut revokes = Vec::new();
    let mut grants = Vec::new();

    if !to_revoke.is_empty() {
        if desired_privileges.is_empty() || to_revoke.is_all() {
            revokes.push(GrantOp::RevokeAll);
        } else {
            revokes.push(GrantOp::RevokePrivileges(to_revoke.privileges()));
        }
    }
    if observed.grant_option && !desired.grant_option {
        revokes.push(GrantOp::RevokeGrantOption);
    }

    // MySQL ties the TLS requirement and the grant option to a GRANT
    // statement, so a change to either re-issues one.
    let tls_changed = desired.grantee.is_user() && desired.tls_option != observed.tls_option;
    let grant_option_added = desired.grant_option && !observed.grant_option;

    if !to_grant.is_empty() || tls_changed || grant_option_added {
        let privileges = if to_grant.is_empty() {
            desired_privileges.privileges()
        } else {
            to_grant.privileges()
        };
        grants.push(GrantOp::GrantPrivileges {
            privileges,
            tls_option: tls_changed.then_some(desired.tls_option),
            grant_option: desired.grant_option,
        });
    }

    if desired.grantee.is_user() {
        for role in observed.roles.difference(&desired.roles) {
            revokes.push(GrantOp::RevokeRole(role.clone()));
        }
        for role in desired.roles.difference(&observed.roles) {
            grants.push(GrantOp::GrantRole(role.clone()));
        }
    }

    revokes.extend(grants);
    revokes
}
