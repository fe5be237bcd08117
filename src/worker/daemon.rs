//! Queue worker: poll and cleanup loops with a start/stop lifecycle.
//!
//! The poll loop snapshots customers with queued messages and calls
//! `process_one` for each in its own task, so a slow processor call for one
//! customer never delays polling the others. The cleanup loop garbage
//! collects expired duplicate hashes and idle customer state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::WorkerSettings;
use crate::core::{MessageQueueService, QueueStats};
use crate::processors::Processor;

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Loop intervals.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub cleanup_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            cleanup_interval: settings.cleanup_interval(),
        }
    }
}

/// Health report for dashboards and the `/health` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub state: WorkerState,
    pub running: bool,
    pub uptime_secs: Option<f64>,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_cleanup: Option<DateTime<Utc>>,
    /// Units of work completed by this worker, failures included.
    pub processed: u64,
    pub failed: u64,
    /// Poll or cleanup tasks that died unexpectedly.
    pub task_errors: u64,
    pub stats: QueueStats,
}

/// State shared between the worker handle and its loops.
struct Shared {
    state: RwLock<WorkerState>,
    started_at: RwLock<Option<Instant>>,
    last_poll: RwLock<Option<DateTime<Utc>>>,
    last_cleanup: RwLock<Option<DateTime<Utc>>>,
    processed: AtomicU64,
    failed: AtomicU64,
    task_errors: AtomicU64,
}

/// Handles of the running loops.
struct Loops {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Queue worker.
pub struct QueueWorker {
    service: MessageQueueService,
    processor: Arc<dyn Processor>,
    config: WorkerConfig,
    shared: Arc<Shared>,
    loops: Mutex<Option<Loops>>,
}

impl QueueWorker {
    /// Create a new, stopped worker.
    pub fn new(
        service: MessageQueueService,
        processor: Arc<dyn Processor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            service,
            processor,
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(WorkerState::Stopped),
                started_at: RwLock::new(None),
                last_poll: RwLock::new(None),
                last_cleanup: RwLock::new(None),
                processed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                task_errors: AtomicU64::new(0),
            }),
            loops: Mutex::new(None),
        }
    }

    pub fn service(&self) -> &MessageQueueService {
        &self.service
    }

    /// Start the poll and cleanup loops. Calling it while running is a no-op.
    pub async fn start(&self) {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            tracing::debug!("Queue worker already running");
            return;
        }

        *self.shared.state.write().await = WorkerState::Starting;

        let cancel = CancellationToken::new();
        let poll = tokio::spawn(poll_loop(
            self.service.clone(),
            self.processor.clone(),
            self.shared.clone(),
            self.config.poll_interval,
            cancel.clone(),
        ));
        let cleanup = tokio::spawn(cleanup_loop(
            self.service.clone(),
            self.shared.clone(),
            self.config.cleanup_interval,
            cancel.clone(),
        ));
        *loops = Some(Loops {
            cancel,
            handles: vec![poll, cleanup],
        });

        *self.shared.started_at.write().await = Some(Instant::now());
        *self.shared.state.write().await = WorkerState::Running;

        tracing::info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            cleanup_secs = self.config.cleanup_interval.as_secs_f64(),
            processor = self.processor.name(),
            "Queue worker started"
        );
    }

    /// Stop both loops and wait for them to exit.
    ///
    /// Units of work already handed to the processor keep running to completion.
    pub async fn stop(&self) {
        let Some(loops) = self.loops.lock().await.take() else {
            return;
        };

        *self.shared.state.write().await = WorkerState::Stopping;
        tracing::info!("Queue worker stopping");

        loops.cancel.cancel();
        for handle in loops.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker loop ended abnormally: {}", e);
            }
        }

        *self.shared.started_at.write().await = None;
        *self.shared.state.write().await = WorkerState::Stopped;
        tracing::info!("Queue worker stopped");
    }

    pub async fn state(&self) -> WorkerState {
        *self.shared.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == WorkerState::Running
    }

    pub async fn health(&self) -> WorkerHealth {
        let state = self.state().await;
        let uptime_secs = self
            .shared
            .started_at
            .read()
            .await
            .map(|started| started.elapsed().as_secs_f64());

        WorkerHealth {
            state,
            running: state == WorkerState::Running,
            uptime_secs,
            last_poll: *self.shared.last_poll.read().await,
            last_cleanup: *self.shared.last_cleanup.read().await,
            processed: self.shared.processed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            task_errors: self.shared.task_errors.load(Ordering::Relaxed),
            stats: self.service.stats().await,
        }
    }
}

async fn poll_loop(
    service: MessageQueueService,
    processor: Arc<dyn Processor>,
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        reap(&mut tasks, &shared);

        let customers = service.pending_customers().await;
        *shared.last_poll.write().await = Some(Utc::now());

        for customer_id in customers {
            let service = service.clone();
            let processor = processor.clone();
            let shared = shared.clone();
            tasks.spawn(async move {
                let Some(result) = service.process_one(&customer_id, processor).await else {
                    return;
                };
                shared.processed.fetch_add(1, Ordering::Relaxed);
                if !result.success {
                    shared.failed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(
                    customer_id = %customer_id,
                    message_id = %result.message_id,
                    success = result.success,
                    "Poll dispatched message"
                );
            });
        }
    }

    // Dispatched units finish on their own.
    reap(&mut tasks, &shared);
    tasks.detach_all();
    tracing::debug!("Poll loop exited");
}

fn reap(tasks: &mut JoinSet<()>, shared: &Shared) {
    while let Some(joined) = tasks.try_join_next() {
        if let Err(e) = joined {
            shared.task_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!("Customer poll task failed: {}", e);
        }
    }
}

async fn cleanup_loop(
    service: MessageQueueService,
    shared: Arc<Shared>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let pass = service.clone();
        match tokio::spawn(async move { pass.cleanup_expired().await }).await {
            Ok(_) => {
                *shared.last_cleanup.write().await = Some(Utc::now());
            }
            Err(e) => {
                shared.task_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Queue cleanup failed: {}", e);
            }
        }
    }

    tracing::debug!("Cleanup loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewMessage, QueueConfig, QueuedMessage};
    use crate::processors::Result as ProcessorResult;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recording {
        seen: StdMutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl Processor for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn process(&self, message: &QueuedMessage) -> ProcessorResult<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen.lock().unwrap().push(message.content.clone());
            Ok("ok".to_string())
        }
    }

    fn worker(processor: Arc<Recording>, config: WorkerConfig) -> QueueWorker {
        let service = MessageQueueService::new(QueueConfig::default());
        QueueWorker::new(service, processor, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_waits() {
        let worker = worker(Arc::new(Recording::default()), WorkerConfig::default());
        assert_eq!(worker.state().await, WorkerState::Stopped);

        worker.start().await;
        worker.start().await;
        assert!(worker.is_running().await);

        worker.stop().await;
        assert_eq!(worker.state().await, WorkerState::Stopped);
        assert!(worker.health().await.uptime_secs.is_none());

        // Stopping twice is harmless, and the worker can be restarted.
        worker.stop().await;
        worker.start().await;
        assert!(worker.is_running().await);
        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_dispatches_ready_bursts() {
        let processor = Arc::new(Recording::default());
        let worker = worker(processor.clone(), WorkerConfig::default());
        worker.start().await;

        worker
            .service()
            .enqueue(NewMessage::new("c1", "hi", "web"))
            .await;
        worker
            .service()
            .enqueue(NewMessage::new("c1", "still there?", "web"))
            .await;
        worker
            .service()
            .enqueue(NewMessage::new("c2", "hello", "web"))
            .await;

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(processor.seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(1000)).await;

        let health = worker.health().await;
        assert_eq!(health.processed, 2);
        assert_eq!(health.failed, 0);
        assert!(health.last_poll.is_some());
        assert_eq!(health.stats.queued, 0);
        assert_eq!(health.stats.aggregated, 1);
        // Polled every 500ms while debouncing, but each message counts once.
        assert_eq!(health.stats.debounced, 3);

        worker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_work_drain() {
        let processor = Arc::new(Recording {
            delay: Duration::from_secs(3),
            ..Default::default()
        });
        let worker = worker(processor.clone(), WorkerConfig::default());
        worker.start().await;
        worker
            .service()
            .enqueue(NewMessage::new("c1", "slow one", "web"))
            .await;

        // Dispatched at the 2.0s tick, still running at 2.6s.
        tokio::time::sleep(Duration::from_millis(2600)).await;
        assert!(
            worker
                .service()
                .get_customer_queue_status("c1")
                .await
                .is_processing
        );

        worker.stop().await;
        assert!(!worker.is_running().await);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(
            processor.seen.lock().unwrap().clone(),
            vec!["slow one".to_string()]
        );
        let status = worker.service().get_customer_queue_status("c1").await;
        assert!(!status.is_processing);
        assert_eq!(worker.service().stats().await.processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_loop_runs_on_interval() {
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(500),
            cleanup_interval: Duration::from_secs(1),
        };
        let worker = worker(Arc::new(Recording::default()), config);
        worker.start().await;
        assert!(worker.health().await.last_cleanup.is_none());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(worker.health().await.last_cleanup.is_some());
        worker.stop().await;
    }
}
