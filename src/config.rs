use std::{env, time::Duration};

use anyhow::{Context, Error};
use base64::prelude::*;

const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// Configuration for the reconciler, loaded during init().
#[derive(Clone)]
pub struct ReconcilerConfig {
    /// `host[:port]` of the server.
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Upper bound for every SQL round-trip.
    pub statement_timeout: Duration,
    pub max_connections: u32,
}

impl ReconcilerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let endpoint = lookup("MYSQL_ENDPOINT").context("MYSQL_ENDPOINT env var not set!")?;
        let username = lookup("MYSQL_USERNAME").context("MYSQL_USERNAME env var not set!")?;

        let password = match (lookup("MYSQL_PASSWORD"), lookup("MYSQL_PASSWORD_BASE64")) {
            (Some(_), Some(_)) => Err(Error::msg(
                "Ambiguous: Only one of MYSQL_PASSWORD and MYSQL_PASSWORD_BASE64 can be set!",
            )),
            (Some(password), None) => Ok(password),
            (None, Some(password_base64)) => {
                let password = BASE64_STANDARD
                    .decode(password_base64)
                    .context("Failed to decode MYSQL_PASSWORD_BASE64")?;
                Ok(String::from_utf8(password).context("MYSQL_PASSWORD_BASE64 is not valid UTF-8")?)
            }
            (None, None) => Err(Error::msg("MYSQL_PASSWORD or MYSQL_PASSWORD_BASE64 not set!")),
        }?;

        let statement_timeout = match lookup("MYSQL_STATEMENT_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .with_context(|| format!("MYSQL_STATEMENT_TIMEOUT_SECS is not a number: {}", secs))?,
            ),
            None => Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
        };

        let max_connections = match lookup("MYSQL_MAX_CONNECTIONS") {
            Some(n) => n
                .parse()
                .with_context(|| format!("MYSQL_MAX_CONNECTIONS is not a number: {}", n))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(ReconcilerConfig {
            endpoint,
            username,
            password,
            statement_timeout,
            max_connections,
        })
    }

    pub fn connection_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.endpoint
        )
    }
}
