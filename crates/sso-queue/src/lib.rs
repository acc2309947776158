//! Work Dispatcher
//!
//! Message-passing boundary between the request path and background workers:
//! - `TaskPublisher`: submit a named task with a JSON payload
//! - `TaskHandler` / `TaskMux`: register handlers by task name on the consumer side
//! - `EmbeddedQueue`: in-process at-least-once queue with a bounded worker pool
//! - `RedisQueue` (feature `redis`): list-based reliable queue shared across processes

pub mod embedded;
pub mod error;
pub mod mux;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;

pub use embedded::{ConsumerConfig, DeadLetter, EmbeddedConsumer, EmbeddedQueue};
pub use error::{QueueError, TaskError};
pub use mux::TaskMux;
pub use sso_common::Task;

#[cfg(feature = "redis")]
pub use crate::redis::{RedisConsumer, RedisQueue};

pub type Result<T> = std::result::Result<T, QueueError>;

/// Producer side of the dispatcher.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    fn identifier(&self) -> &str;

    /// Enqueue a task and return its id. Delivery is at-least-once.
    async fn submit(&self, name: &str, payload: serde_json::Value) -> Result<String>;
}

/// Consumer side of the dispatcher.
///
/// Handlers must be idempotent: the same task may be delivered more than once.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> std::result::Result<(), TaskError>;
}
