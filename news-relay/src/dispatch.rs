use crate::delivery::{run_delivery, DeliveryDeps};
use crate::executor::{StepContext, StepJournal};
use crate::state::RunRegistry;
use crate::types::{DeliveryUnit, Result, RunType, TriggeredDelivery, TRIGGERED_STATUS};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Starts delivery runs.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Starts one delivery run per unit in a single call and returns the
    /// instance reference of each, in input order.
    async fn create_batch(&self, units: Vec<DeliveryUnit>) -> Result<Vec<TriggeredDelivery>>;
}

/// Runs every delivery as its own tokio task.
///
/// While a non-reprocess run for a URL is in flight, further non-reprocess
/// units for that URL resolve to the running instance instead of a new one.
pub struct TaskDispatcher {
    deps: Arc<DeliveryDeps>,
    journal: Arc<dyn StepJournal>,
    registry: Arc<RunRegistry>,
    in_flight: Arc<Mutex<HashMap<String, String>>>,
}

impl TaskDispatcher {
    pub fn new(deps: DeliveryDeps, journal: Arc<dyn StepJournal>, registry: Arc<RunRegistry>) -> Self {
        Self {
            deps: Arc::new(deps),
            journal,
            registry,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn spawn(&self, unit: DeliveryUnit) -> TriggeredDelivery {
        let url = unit.article.url.clone();

        if !unit.reprocess {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(run_id) = in_flight.get(&url) {
                debug!(url = %url, run_id = %run_id, "Delivery already in flight");
                return triggered(url, run_id.clone());
            }
            let run_id = Uuid::new_v4().to_string();
            in_flight.insert(url.clone(), run_id.clone());
            drop(in_flight);
            self.start(unit, run_id.clone()).await;
            return triggered(url, run_id);
        }

        let run_id = Uuid::new_v4().to_string();
        self.start(unit, run_id.clone()).await;
        triggered(url, run_id)
    }

    async fn start(&self, unit: DeliveryUnit, run_id: String) {
        self.registry.register(RunType::Delivery, &run_id).await;

        let deps = self.deps.clone();
        let journal = self.journal.clone();
        let registry = self.registry.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            registry.mark_running(RunType::Delivery, &run_id).await;

            let url = unit.article.url.clone();
            let guarded = !unit.reprocess;
            let ctx = StepContext::new(run_id.clone(), journal);

            match run_delivery(unit, &ctx, &deps).await {
                Ok(result) => registry.complete(RunType::Delivery, &run_id, &result).await,
                Err(e) => {
                    error!(url = %url, run_id = %run_id, error = %e, "Delivery run failed");
                    registry.fail(RunType::Delivery, &run_id, &e).await;
                }
            }
            ctx.release().await;

            if guarded {
                let mut in_flight = in_flight.lock().await;
                if in_flight.get(&url) == Some(&run_id) {
                    in_flight.remove(&url);
                }
            }
        });
    }
}

fn triggered(url: String, instance_id: String) -> TriggeredDelivery {
    TriggeredDelivery {
        url,
        instance_id,
        status: TRIGGERED_STATUS.to_string(),
    }
}

#[async_trait]
impl Dispatcher for TaskDispatcher {
    async fn create_batch(&self, units: Vec<DeliveryUnit>) -> Result<Vec<TriggeredDelivery>> {
        let count = units.len();
        let mut triggered = Vec::with_capacity(count);
        for unit in units {
            triggered.push(self.spawn(unit).await);
        }

        info!("Dispatched batch of {} deliveries", count);
        Ok(triggered)
    }
}
