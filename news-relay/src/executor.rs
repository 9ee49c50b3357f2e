//! Step execution for orchestrator runs.
//!
//! Each run owns a [`StepContext`]. A step whose output was recorded for the
//! same run id is replayed from the journal instead of being executed again,
//! so a run that is retried from the top only repeats the steps that never
//! completed. Failures are never recorded.

use crate::retry::RetryPolicy;
use crate::types::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Persists the output of completed steps.
#[async_trait]
pub trait StepJournal: Send + Sync {
    async fn load(&self, run_id: &str, step: &str) -> Result<Option<serde_json::Value>>;

    /// Records a completed step. Recording the same step twice keeps the first output.
    async fn record(&self, run_id: &str, step: &str, output: &serde_json::Value) -> Result<()>;

    /// Drops every step of a run that has ended.
    async fn forget(&self, run_id: &str) -> Result<()>;

    /// Drops steps recorded more than `age` ago, left behind by runs that
    /// never ended. Returns how many were removed.
    async fn purge_older_than(&self, age: Duration) -> Result<u64>;
}

/// Process-local journal. Lost on restart.
#[derive(Default)]
pub struct MemoryJournal {
    steps: RwLock<HashMap<(String, String), (serde_json::Value, Instant)>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps recorded for a run.
    pub async fn recorded_steps(&self, run_id: &str) -> usize {
        let steps = self.steps.read().await;
        steps.keys().filter(|(id, _)| id == run_id).count()
    }

    /// Number of steps recorded across all runs.
    pub async fn len(&self) -> usize {
        self.steps.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl StepJournal for MemoryJournal {
    async fn load(&self, run_id: &str, step: &str) -> Result<Option<serde_json::Value>> {
        let steps = self.steps.read().await;
        Ok(steps
            .get(&(run_id.to_string(), step.to_string()))
            .map(|(output, _)| output.clone()))
    }

    async fn record(&self, run_id: &str, step: &str, output: &serde_json::Value) -> Result<()> {
        let mut steps = self.steps.write().await;
        steps
            .entry((run_id.to_string(), step.to_string()))
            .or_insert_with(|| (output.clone(), Instant::now()));
        Ok(())
    }

    async fn forget(&self, run_id: &str) -> Result<()> {
        let mut steps = self.steps.write().await;
        steps.retain(|(id, _), _| id != run_id);
        Ok(())
    }

    async fn purge_older_than(&self, age: Duration) -> Result<u64> {
        let mut steps = self.steps.write().await;
        let before = steps.len();
        steps.retain(|_, (_, recorded_at)| recorded_at.elapsed() < age);
        Ok((before - steps.len()) as u64)
    }
}

#[derive(Clone)]
pub struct StepContext {
    run_id: String,
    journal: Arc<dyn StepJournal>,
}

impl StepContext {
    pub fn new(run_id: impl Into<String>, journal: Arc<dyn StepJournal>) -> Self {
        Self {
            run_id: run_id.into(),
            journal,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Runs one named step under `policy`, or replays its recorded output.
    ///
    /// Step names must be unique within a run.
    pub async fn step<T, F, Fut>(&self, name: &str, policy: &RetryPolicy, work: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(recorded) = self.journal.load(&self.run_id, name).await? {
            debug!(run_id = %self.run_id, step = name, "Replaying recorded step");
            return Ok(serde_json::from_value(recorded)?);
        }

        let output = policy.run(name, work).await?;

        self.journal
            .record(&self.run_id, name, &serde_json::to_value(&output)?)
            .await?;
        debug!(run_id = %self.run_id, step = name, "Step recorded");

        Ok(output)
    }

    /// Drops the run's recorded steps once it has ended. Failures are logged
    /// and left for the age-based purge.
    pub async fn release(&self) {
        if let Err(e) = self.journal.forget(&self.run_id).await {
            warn!(run_id = %self.run_id, error = %e, "Failed to drop recorded steps");
        }
    }
}
