use anyhow::Context;
use async_trait::async_trait;
use sqlx::{
    Row,
    mysql::{MySqlDatabaseError, MySqlPool, MySqlPoolOptions},
};

use crate::{
    config::ReconcilerConfig,
    error::{NONEXISTING_GRANT_ERR_CODE, SessionError},
};

/// The SQL transport the reconciler talks through.
#[async_trait]
pub trait SqlSession: Send + Sync {
    /// Runs a statement whose rows have a single text column, such as `SHOW GRANTS`.
    async fn query_lines(&self, statement: &str) -> Result<Vec<String>, SessionError>;

    async fn execute(&self, statement: &str) -> Result<(), SessionError>;
}

pub struct MySqlSession {
    pool: MySqlPool,
}

impl MySqlSession {
    pub async fn connect(config: &ReconcilerConfig) -> anyhow::Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.statement_timeout)
            .connect(&config.connection_url())
            .await
            .with_context(|| format!("Failed to connect to MySQL at {}", config.endpoint))?;
        Ok(MySqlSession { pool })
    }
}

/// Splits server errors from transport errors and picks out "no such grant".
fn classify(err: sqlx::Error) -> SessionError {
    if let sqlx::Error::Database(db_err) = &err {
        if let Some(mysql_err) = db_err.try_downcast_ref::<MySqlDatabaseError>() {
            if mysql_err.number() == NONEXISTING_GRANT_ERR_CODE {
                return SessionError::NonexistingGrant;
            }
            return SessionError::Server {
                code: mysql_err.number(),
                message: mysql_err.message().to_string(),
            };
        }
    }
    SessionError::Transport(err)
}

#[async_trait]
impl SqlSession for MySqlSession {
    async fn query_lines(&self, statement: &str) -> Result<Vec<String>, SessionError> {
        let rows = sqlx::raw_sql(statement).fetch_all(&self.pool).await.map_err(classify)?;
        // SHOW GRANTS reports its column as a blob on some servers.
        rows.iter()
            .map(|row| row.try_get_unchecked::<String, _>(0).map_err(classify))
            .collect()
    }

    async fn execute(&self, statement: &str) -> Result<(), SessionError> {
        sqlx::raw_sql(statement).execute(&self.pool).await.map_err(classify)?;
        Ok(())
    }
}
