use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Failure reported by a task handler.
///
/// `Retry` asks the dispatcher to redeliver the task later; `Permanent` drops
/// it to the dead-letter store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("retryable: {0}")]
    Retry(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl TaskError {
    pub fn retry(message: impl Into<String>) -> Self {
        Self::Retry(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}
