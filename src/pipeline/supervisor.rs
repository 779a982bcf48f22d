// src/pipeline/supervisor.rs

//! Long-running service wiring.
//!
//! The consumer and the favorites scheduler run as independent tasks that
//! share only the bus and the store with the ingestion path. Everything
//! stops when the cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::bus::MessageBus;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::ingest::run_ingest;
use crate::pipeline::reconcile::{ReconcileReport, ReconciliationEngine};
use crate::pipeline::scheduler::{FavoritePriorityScheduler, ProductRefresher};
use crate::pipeline::source::CatalogSource;
use crate::services::{ConsumerStats, NotificationConsumer, NotificationDispatcher};
use crate::storage::Store;
use crate::utils::log;

/// What the supervised run did before it was cancelled.
#[derive(Debug, Default)]
pub struct SupervisorReport {
    pub ingest: Option<ReconcileReport>,
    pub consumer: ConsumerStats,
    pub scheduler_passes: usize,
}

/// Owns the store and bus handles and starts the background tasks.
pub struct Supervisor<S> {
    config: Config,
    store: Arc<S>,
    bus: Arc<dyn MessageBus>,
    dispatcher: Arc<NotificationDispatcher>,
    engine: Arc<ReconciliationEngine>,
}

/// Upper bound on waiting for the consumer to catch up after a one-shot
/// ingest.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

impl<S: Store + 'static> Supervisor<S> {
    pub fn new(config: Config, store: Arc<S>, bus: Arc<dyn MessageBus>) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(bus.clone(), &config.bus));
        let engine = Arc::new(ReconciliationEngine::new(store.clone(), dispatcher.clone()));
        Self {
            config,
            store,
            bus,
            dispatcher,
            engine,
        }
    }

    /// The engine shared by ingestion and the scheduler.
    pub fn engine(&self) -> Arc<ReconciliationEngine> {
        self.engine.clone()
    }

    /// Start the consumer and the scheduler, ingest `source` once, then run
    /// until `token` is cancelled.
    ///
    /// The consumer is subscribed before ingestion starts, so drops found
    /// by the first ingest are delivered.
    pub async fn run(
        &self,
        source: Option<&dyn CatalogSource>,
        refresher: Arc<dyn ProductRefresher>,
        token: CancellationToken,
    ) -> Result<SupervisorReport> {
        log::header("Price tracker");

        log::step(1, 3, "Starting notification consumer and scheduler");
        let consumer =
            NotificationConsumer::new(self.bus.clone(), self.store.clone(), &self.config.bus)
                .spawn(token.clone())
                .await?;
        let scheduler = self.spawn_scheduler(refresher, token.clone());

        log::step(2, 3, "Ingesting catalog");
        let ingest = match source {
            Some(source) => match run_ingest(source, &self.engine, self.store.as_ref()).await {
                Ok(report) => Some(report),
                Err(e) => {
                    log::error(&format!("Ingest failed: {e}"));
                    token.cancel();
                    let _ = Self::join(consumer, scheduler).await;
                    return Err(e);
                }
            },
            None => {
                log::info("No catalog source given; skipping ingest");
                None
            }
        };

        log::step(3, 3, "Running until cancelled");
        token.cancelled().await;

        let (consumer, scheduler_passes) = Self::join(consumer, scheduler).await?;
        let report = SupervisorReport {
            ingest,
            consumer,
            scheduler_passes,
        };

        log::summary(
            "Shutdown",
            &[
                ("Deliveries", report.consumer.delivered.to_string()),
                (
                    "Notifications",
                    report.consumer.notifications_written.to_string(),
                ),
                ("Decode failures", report.consumer.failed_decode.to_string()),
                ("Scheduler passes", report.scheduler_passes.to_string()),
            ],
        );
        log::success("Stopped");
        Ok(report)
    }

    /// Ingest `source` once with the consumer attached, wait until every
    /// published event has been handled, then stop.
    pub async fn run_once(&self, source: &dyn CatalogSource) -> Result<SupervisorReport> {
        let token = CancellationToken::new();
        let consumer =
            NotificationConsumer::new(self.bus.clone(), self.store.clone(), &self.config.bus);
        let mut progress = consumer.progress();
        let consumer = consumer.spawn(token.clone()).await?;

        let ingest = match run_ingest(source, &self.engine, self.store.as_ref()).await {
            Ok(report) => report,
            Err(e) => {
                token.cancel();
                let _ = Self::join(consumer, None).await;
                return Err(e);
            }
        };

        if let Some(last) = self.dispatcher.last_offset().await {
            let caught_up = async { progress.wait_for(|&next| next > last).await.map(|_| ()) };
            match tokio::time::timeout(DRAIN_TIMEOUT, caught_up).await {
                Ok(Ok(_)) => {}
                Ok(Err(_)) => log::warn("Consumer stopped before handling every event"),
                Err(_) => log::warn(&format!(
                    "Consumer did not catch up within {}s",
                    DRAIN_TIMEOUT.as_secs()
                )),
            }
        }

        token.cancel();
        let (consumer, _) = Self::join(consumer, None).await?;
        if consumer.transport_errors > 0 {
            log::warn(&format!(
                "Consumer saw {} transport errors; some events may not have been handled",
                consumer.transport_errors
            ));
        }
        log::sub_item(&format!(
            "{} notifications written",
            consumer.notifications_written
        ));
        Ok(SupervisorReport {
            ingest: Some(ingest),
            consumer,
            scheduler_passes: 0,
        })
    }

    fn spawn_scheduler(
        &self,
        refresher: Arc<dyn ProductRefresher>,
        token: CancellationToken,
    ) -> Option<JoinHandle<usize>> {
        if !self.config.scheduler.enabled {
            log::info("Favorites scheduler disabled");
            return None;
        }

        let scheduler = FavoritePriorityScheduler::new(
            self.engine.clone(),
            self.store.clone(),
            refresher,
            &self.config.scheduler,
        );
        log::info(&format!(
            "Favorites scheduler every {}s",
            self.config.scheduler.interval_secs
        ));
        Some(tokio::spawn(async move { scheduler.run(token).await }))
    }

    async fn join(
        consumer: JoinHandle<ConsumerStats>,
        scheduler: Option<JoinHandle<usize>>,
    ) -> Result<(ConsumerStats, usize)> {
        let stats = consumer
            .await
            .map_err(|e| AppError::bus(format!("consumer task failed: {e}")))?;
        let passes = match scheduler {
            Some(handle) => handle
                .await
                .map_err(|e| AppError::store(format!("scheduler task failed: {e}")))?,
            None => 0,
        };
        Ok((stats, passes))
    }
}
