//! EmbeddedQueue - in-process at-least-once dispatcher
//!
//! - Unbounded channel between publishers and the consumer
//! - Semaphore-based concurrency control for handlers
//! - Fixed-delay redelivery of retryable failures up to `max_attempts`
//! - Bounded dead-letter store for permanent and exhausted tasks; the oldest
//!   entry is dropped once it is full

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::{QueueError, Result, Task, TaskError, TaskMux, TaskPublisher};

/// Upper bound on concurrent handlers per consumer.
pub const MAX_CONCURRENCY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// Dead letters kept by the embedded queue
    pub dead_letter_capacity: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
            dead_letter_capacity: 1000,
        }
    }
}

impl ConsumerConfig {
    /// Handler slots, clamped to `1..=MAX_CONCURRENCY`.
    pub fn worker_permits(&self) -> u32 {
        self.concurrency.clamp(1, MAX_CONCURRENCY) as u32
    }
}

/// A task that will not be delivered again.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub task: Task,
    pub error: TaskError,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug)]
struct DeadLetterStore {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
}

impl DeadLetterStore {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn push(&mut self, letter: DeadLetter) {
        if self.entries.len() >= self.capacity {
            if let Some(dropped) = self.entries.pop_front() {
                warn!(task_id = %dropped.task.id, capacity = self.capacity, "Dead-letter store full, dropping oldest");
            }
        }
        self.entries.push_back(letter);
    }
}

type DeadLetters = Arc<Mutex<DeadLetterStore>>;

/// Publisher half. Cheap to clone.
#[derive(Clone)]
pub struct EmbeddedQueue {
    tx: mpsc::UnboundedSender<Task>,
    dead_letters: DeadLetters,
}

/// Consumer half, driven by [`EmbeddedConsumer::run`].
pub struct EmbeddedConsumer {
    rx: mpsc::UnboundedReceiver<Task>,
    tx: mpsc::UnboundedSender<Task>,
    config: ConsumerConfig,
    dead_letters: DeadLetters,
}

impl EmbeddedQueue {
    pub fn new(config: ConsumerConfig) -> (Self, EmbeddedConsumer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dead_letters: DeadLetters = Arc::new(Mutex::new(DeadLetterStore::new(config.dead_letter_capacity)));

        let queue = Self {
            tx: tx.clone(),
            dead_letters: dead_letters.clone(),
        };
        let consumer = EmbeddedConsumer {
            rx,
            tx,
            config,
            dead_letters,
        };
        (queue, consumer)
    }

    /// Re-submit an already built task, e.g. to simulate a broker redelivery.
    pub fn redeliver(&self, task: Task) -> Result<()> {
        self.tx.send(task).map_err(|_| QueueError::Closed)
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().entries.iter().cloned().collect()
    }

    /// Remove and return every dead letter.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().entries.drain(..).collect()
    }
}

#[async_trait]
impl TaskPublisher for EmbeddedQueue {
    fn identifier(&self) -> &str {
        "embedded"
    }

    async fn submit(&self, name: &str, payload: serde_json::Value) -> Result<String> {
        let task = Task::new(name, payload);
        let id = task.id.clone();
        self.tx.send(task).map_err(|_| QueueError::Closed)?;
        debug!(task_id = %id, task_name = %name, "Task enqueued");
        Ok(id)
    }
}

impl EmbeddedConsumer {
    /// Consume until `shutdown` fires, then wait for in-flight handlers.
    pub async fn run(mut self, mux: Arc<TaskMux>, mut shutdown: broadcast::Receiver<()>) {
        let concurrency = self.config.worker_permits();
        let semaphore = Arc::new(Semaphore::new(concurrency as usize));

        info!(
            concurrency = concurrency,
            max_attempts = self.config.max_attempts,
            "Starting embedded queue consumer"
        );

        loop {
            let task = tokio::select! {
                _ = shutdown.recv() => break,
                received = self.rx.recv() => match received {
                    Some(task) => task,
                    None => break,
                },
            };

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let mux = mux.clone();
            let tx = self.tx.clone();
            let config = self.config.clone();
            let dead_letters = self.dead_letters.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::process(task, &mux, tx, &config, &dead_letters).await;
            });
        }

        // Drain in-flight handlers before returning
        if let Ok(permits) = semaphore.acquire_many(concurrency).await {
            drop(permits);
        }
        info!("Embedded queue consumer stopped");
    }

    async fn process(
        task: Task,
        mux: &TaskMux,
        tx: mpsc::UnboundedSender<Task>,
        config: &ConsumerConfig,
        dead_letters: &DeadLetters,
    ) {
        match mux.dispatch(&task).await {
            Ok(()) => {
                debug!(task_id = %task.id, task_name = %task.name, attempt = task.attempt, "Task completed");
            }
            Err(err) if err.is_retryable() && task.attempt + 1 < config.max_attempts => {
                warn!(
                    task_id = %task.id,
                    task_name = %task.name,
                    attempt = task.attempt,
                    error = %err,
                    "Task failed, scheduling redelivery"
                );
                let next = task.redelivery();
                let delay = config.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if tx.send(next).is_err() {
                        error!("Queue closed before redelivery");
                    }
                });
            }
            Err(err) => {
                error!(
                    task_id = %task.id,
                    task_name = %task.name,
                    attempt = task.attempt,
                    error = %err,
                    "Task dead-lettered"
                );
                dead_letters.lock().push(DeadLetter {
                    task,
                    error: err,
                    failed_at: Utc::now(),
                });
            }
        }
    }
}
