use crate::types::{RelayError, Result, RunState, RunStatus, RunType};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::debug;

struct TrackedRun {
    status: RunStatus,
    ended_at: Option<Instant>,
}

/// Status of every run started in this process, keyed by run type and id.
///
/// Ended runs stay queryable until [`RunRegistry::prune`] drops them.
#[derive(Default)]
pub struct RunRegistry {
    runs: RwLock<HashMap<(RunType, String), TrackedRun>>,
    changed: Notify,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, run_type: RunType, run_id: &str) {
        let status = RunStatus {
            run_id: run_id.to_string(),
            run_type,
            state: RunState::Queued,
            output: None,
            error: None,
            updated_at: Utc::now(),
        };

        let mut runs = self.runs.write().await;
        runs.insert(
            (run_type, run_id.to_string()),
            TrackedRun {
                status,
                ended_at: None,
            },
        );
        drop(runs);
        self.changed.notify_waiters();
    }

    pub async fn mark_running(&self, run_type: RunType, run_id: &str) {
        self.update(run_type, run_id, |status| status.state = RunState::Running)
            .await;
    }

    pub async fn complete<T: Serialize>(&self, run_type: RunType, run_id: &str, output: &T) {
        let output = serde_json::to_value(output).ok();
        self.update(run_type, run_id, move |status| {
            status.state = RunState::Complete;
            status.output = output;
        })
        .await;
    }

    pub async fn fail(&self, run_type: RunType, run_id: &str, error: &RelayError) {
        let message = error.to_string();
        self.update(run_type, run_id, move |status| {
            status.state = RunState::Errored;
            status.error = Some(message);
        })
        .await;
    }

    pub async fn status(&self, run_type: RunType, run_id: &str) -> Result<RunStatus> {
        let runs = self.runs.read().await;
        runs.get(&(run_type, run_id.to_string()))
            .map(|run| run.status.clone())
            .ok_or_else(|| RelayError::RunNotFound {
                run_type,
                run_id: run_id.to_string(),
            })
    }

    /// Waits until the run reaches `complete` or `errored`.
    pub async fn wait(&self, run_type: RunType, run_id: &str) -> Result<RunStatus> {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let status = self.status(run_type, run_id).await?;
            if status.state.is_terminal() {
                return Ok(status);
            }

            changed.await;
        }
    }

    /// Drops runs that ended at least `retention` ago. Returns how many were
    /// dropped. Runs still queued or running are always kept.
    pub async fn prune(&self, retention: Duration) -> usize {
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, run| run.ended_at.map_or(true, |ended| ended.elapsed() < retention));
        let pruned = before - runs.len();
        if pruned > 0 {
            debug!(pruned, remaining = runs.len(), "Pruned ended runs");
        }
        pruned
    }

    /// Runs currently tracked, ended or not.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn update<F>(&self, run_type: RunType, run_id: &str, apply: F)
    where
        F: FnOnce(&mut RunStatus),
    {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&(run_type, run_id.to_string())) {
            Some(run) => {
                apply(&mut run.status);
                run.status.updated_at = Utc::now();
                if run.status.state.is_terminal() && run.ended_at.is_none() {
                    run.ended_at = Some(Instant::now());
                }
                debug!(%run_type, run_id, state = ?run.status.state, "Run state changed");
            }
            None => debug!(%run_type, run_id, "Ignoring update for unknown run"),
        }
        drop(runs);
        self.changed.notify_waiters();
    }
}
