use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use anyhow::bail;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::timeout,
};

use crate::{
    addr::GrantId,
    config::ReconcilerConfig,
    diff::diff,
    error::{GrantError, SessionError},
    grant::{Grant, GrantKey},
    op::GrantOp,
    parser::observed_grant,
    privilege::PrivilegeSet,
    resource::GrantResource,
    session::SqlSession,
    util::sql::{build_show_grants_sql, build_statements},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Idle,
    Reading,
    Diffing,
    Applying,
    Verifying,
    Converged,
    Failed,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReconcileState::Idle => "Idle",
            ReconcileState::Reading => "Reading",
            ReconcileState::Diffing => "Diffing",
            ReconcileState::Applying => "Applying",
            ReconcileState::Verifying => "Verifying",
            ReconcileState::Converged => "Converged",
            ReconcileState::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a pass that reached `Converged`.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub key: GrantKey,
    pub state: ReconcileState,
    /// The ops planned from the first read.
    pub ops: Vec<GrantOp>,
    /// Statements executed, in order.
    pub applied: Vec<String>,
    /// The grant as verified after applying.
    pub observed: Grant,
}

pub struct GrantReconciler {
    pub config: Mutex<Option<ReconcilerConfig>>,
    pub session: Mutex<Option<Arc<dyn SqlSession>>>,
    key_locks: Mutex<HashMap<GrantKey, Arc<Mutex<()>>>>,
}

impl Default for GrantReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl GrantReconciler {
    pub fn new() -> Self {
        GrantReconciler {
            config: Mutex::new(None),
            session: Mutex::new(None),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_session(config: ReconcilerConfig, session: Arc<dyn SqlSession>) -> Self {
        GrantReconciler {
            config: Mutex::new(Some(config)),
            session: Mutex::new(Some(session)),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        let config = ReconcilerConfig::from_env()?;
        *self.config.lock().await = Some(config);
        Ok(())
    }

    async fn statement_timeout(&self) -> anyhow::Result<Duration> {
        let Some(ref config) = *self.config.lock().await else {
            bail!("GrantReconciler: Uninitialized!");
        };
        Ok(config.statement_timeout)
    }

    /// Serializes passes over the same grantee and scope. Locks nobody holds
    /// or waits on are dropped from the map on the way in.
    async fn lock_key(&self, key: &GrantKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.key_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn start_pass<'a>(&self, key: &'a GrantKey) -> anyhow::Result<Pass<'a>> {
        Ok(Pass {
            key,
            session: self.get_session().await?,
            timeout: self.statement_timeout().await?,
            state: ReconcileState::Idle,
            applied: Vec::new(),
            last_observed: None,
        })
    }

    /// Brings the server in line with `resource`, then verifies the result.
    pub async fn reconcile(&self, resource: &GrantResource) -> anyhow::Result<ReconcileReport> {
        let desired = resource.to_grant()?;
        let key = desired.key();

        let _guard = self.lock_key(&key).await;
        let mut pass = self.start_pass(&key).await?;
        Ok(pass.run(|_| desired.clone()).await?)
    }

    /// The ops `reconcile` would run right now. Nothing is executed.
    pub async fn plan(&self, resource: &GrantResource) -> anyhow::Result<Vec<GrantOp>> {
        let desired = resource.to_grant()?;
        let key = desired.key();

        let _guard = self.lock_key(&key).await;
        let mut pass = self.start_pass(&key).await?;
        Ok(pass.plan(&desired).await?)
    }

    /// Reads the grant named by a resource id. A grantee that holds nothing
    /// in that scope reads as `None`.
    pub async fn read(&self, id: &str) -> anyhow::Result<Option<Grant>> {
        let key = id.parse::<GrantId>()?.key();
        let mut pass = self.start_pass(&key).await?;
        pass.transition(ReconcileState::Reading);
        let observed = pass.read().await?;

        if observed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(observed))
        }
    }

    pub async fn exists(&self, key: &GrantKey) -> anyhow::Result<bool> {
        let mut pass = self.start_pass(key).await?;
        pass.transition(ReconcileState::Reading);
        Ok(!pass.read().await?.is_empty())
    }

    /// Revokes everything `resource` manages: its privileges and grant
    /// option in the scope, and the roles it lists. Roles granted outside
    /// the record and the account's TLS requirement are left alone.
    pub async fn destroy(&self, resource: &GrantResource) -> anyhow::Result<ReconcileReport> {
        let record = resource.to_grant()?;
        let key = record.key();

        let _guard = self.lock_key(&key).await;
        let mut pass = self.start_pass(&key).await?;
        let report = pass
            .run(|observed| Grant {
                privileges: PrivilegeSet::new(),
                grant_option: false,
                tls_option: observed.tls_option,
                roles: observed.roles.difference(&record.roles).cloned().collect(),
                ..Grant::empty(&key)
            })
            .await?;

        tracing::info!("Destroyed {}", key);
        Ok(report)
    }
}

/// One Reading → Diffing → Applying → Verifying pass over a single key.
struct Pass<'a> {
    key: &'a GrantKey,
    session: Arc<dyn SqlSession>,
    timeout: Duration,
    state: ReconcileState,
    applied: Vec<String>,
    last_observed: Option<Grant>,
}

impl Pass<'_> {
    fn transition(&mut self, state: ReconcileState) {
        tracing::info!("{}: {} -> {}", self.key, self.state, state);
        self.state = state;
    }

    fn fail(&mut self, err: GrantError) -> GrantError {
        self.transition(ReconcileState::Failed);
        tracing::error!("{}: {}", self.key, err);
        err
    }

    fn fail_timeout(&mut self, statement: &str) -> GrantError {
        let err = GrantError::Timeout {
            grantee: self.key.grantee.to_string(),
            statement: statement.to_string(),
            applied: self.applied.clone(),
            last_observed: self.last_observed.clone().map(Box::new),
        };
        self.fail(err)
    }

    async fn read(&mut self) -> Result<Grant, GrantError> {
        let key = self.key;
        let grantee = &key.grantee;
        let result = timeout(
            self.timeout,
            GrantReconciler::show_grants_if_exists(self.session.as_ref(), grantee),
        )
        .await;

        let lines = match result {
            Ok(Ok(Some(lines))) => lines,
            Ok(Ok(None)) => Vec::new(),
            Ok(Err(source @ SessionError::Transport(_))) => {
                return Err(self.fail(GrantError::Connection {
                    grantee: grantee.to_string(),
                    statement: build_show_grants_sql(grantee),
                    source,
                }));
            }
            Ok(Err(source)) => {
                let err = GrantError::Execution {
                    grantee: grantee.to_string(),
                    statement: build_show_grants_sql(grantee),
                    applied: self.applied.clone(),
                    source,
                };
                return Err(self.fail(err));
            }
            Err(_) => return Err(self.fail_timeout(&build_show_grants_sql(grantee))),
        };

        match observed_grant(self.key, &lines) {
            Ok(observed) => {
                self.last_observed = Some(observed.clone());
                Ok(observed)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Executes `statements` in order, stopping at the first failure.
    async fn apply(&mut self, statements: &[String]) -> Result<(), GrantError> {
        for statement in statements {
            let result = timeout(
                self.timeout,
                GrantReconciler::execute_statement(self.session.as_ref(), statement),
            )
            .await;

            match result {
                Ok(Ok(())) => self.applied.push(statement.clone()),
                Ok(Err(source @ SessionError::Transport(_))) => {
                    return Err(self.fail(GrantError::Connection {
                        grantee: self.key.grantee.to_string(),
                        statement: statement.clone(),
                        source,
                    }));
                }
                Ok(Err(source)) => {
                    return Err(self.fail(GrantError::Execution {
                        grantee: self.key.grantee.to_string(),
                        statement: statement.clone(),
                        applied: self.applied.clone(),
                        source,
                    }));
                }
                Err(_) => return Err(self.fail_timeout(statement)),
            }
        }
        Ok(())
    }

    async fn plan(&mut self, desired: &Grant) -> Result<Vec<GrantOp>, GrantError> {
        self.transition(ReconcileState::Reading);
        let observed = self.read().await?;

        self.transition(ReconcileState::Diffing);
        let ops = diff(desired, &observed);
        for op in &ops {
            tracing::debug!("{}: planned {}", self.key, op.friendly_message(self.key));
        }
        Ok(ops)
    }

    /// `make_desired` builds the desired grant from an observed one, and is
    /// applied again to the verifying read.
    async fn run(&mut self, make_desired: impl Fn(&Grant) -> Grant) -> Result<ReconcileReport, GrantError> {
        self.transition(ReconcileState::Reading);
        let observed = self.read().await?;

        let ops = {
            let desired = make_desired(&observed);
            self.transition(ReconcileState::Diffing);
            let ops = diff(&desired, &observed);
            for op in &ops {
                tracing::debug!("{}: planned {}", self.key, op.friendly_message(self.key));
            }
            ops
        };

        if !ops.is_empty() {
            self.transition(ReconcileState::Applying);
            self.apply(&build_statements(self.key, &ops)).await?;

            self.transition(ReconcileState::Verifying);
            let verified = self.read().await?;
            let residual = diff(&make_desired(&verified), &verified);
            if !residual.is_empty() {
                let err = GrantError::Convergence {
                    grantee: self.key.grantee.to_string(),
                    residual: build_statements(self.key, &residual),
                };
                return Err(self.fail(err));
            }
        }

        self.transition(ReconcileState::Converged);
        Ok(ReconcileReport {
            key: self.key.clone(),
            state: self.state,
            ops,
            applied: self.applied.clone(),
            observed: self.last_observed.clone().unwrap_or(observed),
        })
    }
}
