use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{BatchError, Result};

/// Limits for a [`BoundedScheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of tasks in flight at once (K).
    pub concurrency: usize,
    /// Per-task timeout (T_item), counted from when the task gets a slot.
    pub item_timeout: Duration,
    /// Time budget per wave of K tasks. `None` uses `item_timeout`.
    pub batch_slice: Option<Duration>,
    /// Extra slack added to the batch ceiling.
    pub batch_buffer: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            item_timeout: Duration::from_secs(60),
            batch_slice: None,
            batch_buffer: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn with_batch_slice(mut self, slice: Duration) -> Self {
        self.batch_slice = Some(slice);
        self
    }

    pub fn with_batch_buffer(mut self, buffer: Duration) -> Self {
        self.batch_buffer = buffer;
        self
    }

    /// Overall deadline for `n` tasks: `ceil(n / K) * slice + buffer`.
    pub fn batch_ceiling(&self, n: usize) -> Duration {
        let waves = n.div_ceil(self.concurrency.max(1));
        let waves = u32::try_from(waves).unwrap_or(u32::MAX);
        self.batch_slice
            .unwrap_or(self.item_timeout)
            .saturating_mul(waves)
            .saturating_add(self.batch_buffer)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(BatchError::InvalidConfig(format!(
                "concurrency must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.concurrency
            )));
        }
        if self.item_timeout.is_zero() {
            return Err(BatchError::InvalidConfig(
                "item timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a scheduled task produced no value.
#[derive(Error, Debug)]
pub enum TaskFailure<E> {
    /// The task ran to completion and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The task exceeded its own timeout.
    #[error("Timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    /// The batch ceiling passed before the task finished.
    #[error("Batch deadline of {}s exceeded", .0.as_secs())]
    BatchDeadline(Duration),

    #[error("Task panicked")]
    Panicked,
}

/// Runs independent tasks with at most K in flight.
///
/// Individual failures never stop the batch. Results come back indexed by
/// the original task position, whatever order tasks complete in.
///
/// # Example
/// ```
/// use image_batch_runner::{BoundedScheduler, SchedulerConfig};
///
/// # #[tokio::main]
/// # async fn main() {
/// let scheduler = BoundedScheduler::new(SchedulerConfig::default().with_concurrency(2)).unwrap();
/// let tasks: Vec<_> = (0..5)
///     .map(|i| async move { if i == 3 { Err("boom") } else { Ok(i * 10) } })
///     .collect();
///
/// let results = scheduler.run(tasks).await;
/// assert_eq!(results.len(), 5);
/// assert_eq!(*results[4].as_ref().unwrap(), 40);
/// assert!(results[3].is_err());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BoundedScheduler {
    config: SchedulerConfig,
}

impl BoundedScheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every task and return one outcome per task, in input order.
    ///
    /// Each task writes only its own slot, so completions never contend on
    /// anything but a short lock. When the batch ceiling passes, unfinished
    /// tasks are aborted and reported as [`TaskFailure::BatchDeadline`];
    /// slots already written keep their real outcome.
    pub async fn run<T, E, Fut>(&self, tasks: Vec<Fut>) -> Vec<std::result::Result<T, TaskFailure<E>>>
    where
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let ceiling = self.config.batch_ceiling(total);
        let item_timeout = self.config.item_timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let slots: Arc<Mutex<Vec<Option<std::result::Result<T, TaskFailure<E>>>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        let mut set = JoinSet::new();
        for (position, task) in tasks.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let slots = Arc::clone(&slots);
            set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                let outcome = match tokio::time::timeout(item_timeout, task).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(TaskFailure::Failed(e)),
                    Err(_) => Err(TaskFailure::TimedOut(item_timeout)),
                };
                if let Ok(mut slots) = slots.lock() {
                    slots[position] = Some(outcome);
                }
            });
        }

        let drain = async {
            while let Some(joined) = set.join_next().await {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!("Scheduled task panicked");
                    }
                }
            }
        };
        // A ceiling too far out to represent as an instant means no deadline.
        let deadline_hit = match Instant::now().checked_add(ceiling) {
            Some(deadline) => tokio::time::timeout_at(deadline, drain).await.is_err(),
            None => {
                drain.await;
                false
            }
        };
        if deadline_hit {
            tracing::warn!(
                ceiling_secs = ceiling.as_secs(),
                unfinished = set.len(),
                "Batch deadline reached, abandoning unfinished tasks"
            );
            set.abort_all();
            while set.join_next().await.is_some() {}
        }

        let mut slots = slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let results = slots
            .iter_mut()
            .map(|slot| match slot.take() {
                Some(outcome) => outcome,
                None if deadline_hit => Err(TaskFailure::BatchDeadline(ceiling)),
                None => Err(TaskFailure::Panicked),
            })
            .collect();
        results
    }
}
