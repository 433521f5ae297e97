//! Fixed-interval polling of a remote task.
//!
//! At most one poll loop runs per `TaskPoller`; starting a new one cancels
//! the previous loop before spawning. Every callback carries the generation
//! the loop was started under so the receiver can drop stale results; a loop
//! whose results are reported stale exits on its own.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::StudioError;
use crate::remote::{DesignServices, TaskStatus};
use crate::session::{Generation, WhiteboxAsset};

use super::controller::PipelineController;
use super::types::{Fence, SessionUpdate};

const DEFAULT_FAILURE_MESSAGE: &str = "CAD processing failed";

/// Receiver of poll results.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    async fn on_progress(&self, generation: Generation, progress: Option<u8>) -> Fence;
    async fn on_success(&self, generation: Generation, whitebox: WhiteboxAsset) -> Fence;
    async fn on_failure(&self, generation: Generation, error: StudioError) -> Fence;
}

#[async_trait]
impl TaskObserver for PipelineController {
    async fn on_progress(&self, generation: Generation, progress: Option<u8>) -> Fence {
        self.apply(SessionUpdate::TaskProgress {
            generation,
            progress,
        })
        .await
    }

    async fn on_success(&self, generation: Generation, whitebox: WhiteboxAsset) -> Fence {
        self.apply(SessionUpdate::WhiteboxReady {
            generation,
            whitebox,
        })
        .await
    }

    async fn on_failure(&self, generation: Generation, error: StudioError) -> Fence {
        self.apply(SessionUpdate::TaskFailed {
            generation,
            error: error.display_message(),
        })
        .await
    }
}

/// Polling parameters
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    /// Failed checks in a row before giving up. `None` never gives up.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_consecutive_failures: None,
        }
    }
}

struct ActivePoll {
    task_id: String,
    generation: Generation,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActivePoll {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Single-flight task poller.
pub struct TaskPoller {
    config: PollConfig,
    current: Mutex<Option<ActivePoll>>,
}

impl TaskPoller {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActivePoll>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Begin polling `task_id`, replacing any running loop.
    pub fn start(
        &self,
        task_id: String,
        generation: Generation,
        services: Arc<dyn DesignServices>,
        observer: Arc<dyn TaskObserver>,
    ) {
        let mut current = self.lock();
        if let Some(previous) = current.take() {
            previous.cancel.cancel();
            tracing::debug!(task_id = %previous.task_id, "Replaced running poller");
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            task_id.clone(),
            generation,
            services,
            observer,
            self.config.clone(),
            cancel.clone(),
        ));

        tracing::info!(task_id = %task_id, generation = %generation, "Poller started");
        *current = Some(ActivePoll {
            task_id,
            generation,
            cancel,
            handle,
        });
    }

    /// Stop the running loop, if any. Idempotent.
    pub fn stop(&self) {
        if let Some(active) = self.lock().take() {
            active.cancel.cancel();
            tracing::info!(task_id = %active.task_id, "Poller stopped");
        }
    }

    /// Task and generation of the running loop.
    pub fn active(&self) -> Option<(String, Generation)> {
        self.lock()
            .as_ref()
            .filter(|a| a.is_running())
            .map(|a| (a.task_id.clone(), a.generation))
    }

    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }
}

impl Drop for TaskPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poller(
    task_id: String,
    generation: Generation,
    services: Arc<dyn DesignServices>,
    observer: Arc<dyn TaskObserver>,
    config: PollConfig,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            status = services.poll_task(&task_id) => status,
        };

        match status {
            Ok(TaskStatus::Pending { progress }) => {
                consecutive_failures = 0;
                tracing::debug!(task_id = %task_id, ?progress, "Task pending");
                if observer.on_progress(generation, progress).await == Fence::Stale {
                    break;
                }
            }
            Ok(TaskStatus::Success {
                result: Some(whitebox),
            }) => {
                tracing::info!(task_id = %task_id, generation = %generation, "Task succeeded");
                observer.on_success(generation, whitebox).await;
                break;
            }
            Ok(TaskStatus::Success { result: None }) => {
                consecutive_failures = 0;
                tracing::debug!(task_id = %task_id, "Task succeeded without assets, still waiting");
                if observer.on_progress(generation, None).await == Fence::Stale {
                    break;
                }
            }
            Ok(TaskStatus::Failure { reason }) => {
                let error = StudioError::task_failure(
                    reason.unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
                );
                tracing::warn!(task_id = %task_id, error = %error, "Task failed");
                observer.on_failure(generation, error).await;
                break;
            }
            Err(e) => {
                // Keep the last progress; the next tick retries.
                consecutive_failures += 1;
                tracing::warn!(
                    task_id = %task_id,
                    attempt = consecutive_failures,
                    transient = e.is_transient(),
                    error = %e,
                    "Status check failed"
                );
                if let Some(limit) = config.max_consecutive_failures {
                    if consecutive_failures >= limit {
                        let error = StudioError::task_failure(format!(
                            "{} ({})",
                            DEFAULT_FAILURE_MESSAGE,
                            e.display_message()
                        ));
                        observer.on_failure(generation, error).await;
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(task_id = %task_id, cancelled = cancel.is_cancelled(), "Poll loop exited");
}
