use std::sync::Arc;

use anyhow::bail;

use crate::{
    error::SessionError,
    grant::Grantee,
    reconciler::GrantReconciler,
    session::{MySqlSession, SqlSession},
    util::sql::build_show_grants_sql,
};

impl GrantReconciler {
    pub async fn get_session(&self) -> Result<Arc<dyn SqlSession>, anyhow::Error> {
        if let Some(session) = &*self.session.lock().await {
            return Ok(session.clone());
        }

        let Some(ref config) = *self.config.lock().await else {
            bail!("GrantReconciler: Uninitialized!");
        };

        let new_session: Arc<dyn SqlSession> = Arc::new(MySqlSession::connect(config).await?);

        *self.session.lock().await = Some(new_session.clone());

        Ok(new_session)
    }

    /// Runs `SHOW GRANTS FOR` the grantee. A grantee with no grants, or one
    /// that does not exist, yields `None`.
    pub async fn show_grants_if_exists(
        session: &dyn SqlSession,
        grantee: &Grantee,
    ) -> Result<Option<Vec<String>>, SessionError> {
        match session.query_lines(&build_show_grants_sql(grantee)).await {
            Ok(lines) => {
                for line in &lines {
                    tracing::debug!("SHOW GRANTS FOR {}: {}", grantee, line);
                }
                Ok(Some(lines))
            }
            Err(SessionError::NonexistingGrant) => {
                tracing::debug!("show_grants_if_exists: no grants defined for {}", grantee);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn execute_statement(session: &dyn SqlSession, statement: &str) -> Result<(), SessionError> {
        session.execute(statement).await?;
        tracing::info!("Success: {}", statement);
        Ok(())
    }
}
