use thiserror::Error;

use crate::grant::Grant;

/// MySQL `ER_NONEXISTING_GRANT`: "There is no such grant defined for user ...".
pub const NONEXISTING_GRANT_ERR_CODE: u16 = 1141;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("there is no such grant defined")]
    NonexistingGrant,
    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },
    #[error(transparent)]
    Transport(#[from] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum GrantError {
    #[error("failed to parse grant line `{line}`: {reason}")]
    Parse { line: String, reason: String },

    #[error("invalid privilege `{privilege}`: {reason}")]
    InvalidPrivilege { privilege: String, reason: String },

    #[error("invalid grant resource: {0}")]
    InvalidResource(String),

    #[error("invalid grant id `{0}`, expected <grantee>:<host>:<database>:<table>")]
    InvalidId(String),

    #[error("failed to run `{statement}` for {grantee}: {source}")]
    Connection {
        grantee: String,
        statement: String,
        #[source]
        source: SessionError,
    },

    #[error("statement `{statement}` failed for {grantee} (already applied: {applied:?}): {source}")]
    Execution {
        grantee: String,
        statement: String,
        applied: Vec<String>,
        #[source]
        source: SessionError,
    },

    #[error("grant did not converge for {grantee}, residual statements: {residual:?}")]
    Convergence { grantee: String, residual: Vec<String> },

    #[error("timed out running `{statement}` for {grantee}")]
    Timeout {
        grantee: String,
        statement: String,
        applied: Vec<String>,
        last_observed: Option<Box<Grant>>,
    },
}

impl GrantError {
    pub fn parse(line: &str, reason: impl Into<String>) -> Self {
        GrantError::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_privilege(privilege: &str, reason: impl Into<String>) -> Self {
        GrantError::InvalidPrivilege {
            privilege: privilege.to_string(),
            reason: reason.into(),
        }
    }
}
