//! Redis-backed reliable queue
//!
//! Tasks live in `<namespace>:pending`. A consumer moves each one atomically
//! into `<namespace>:processing` with `BLMOVE` and removes it once handled.
//! Items still in the processing list at startup belonged to a consumer that
//! died mid-task and are returned to the pending list.

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tracing::{debug, error, info, warn};

use crate::{ConsumerConfig, Result, Task, TaskMux, TaskPublisher};

/// Seconds a single `BLMOVE` blocks before the shutdown signal is re-checked
const POLL_TIMEOUT_SECS: f64 = 1.0;

#[derive(Debug, Clone)]
struct Keys {
    pending: String,
    processing: String,
    dead: String,
}

impl Keys {
    fn new(namespace: &str) -> Self {
        Self {
            pending: format!("{}:pending", namespace),
            processing: format!("{}:processing", namespace),
            dead: format!("{}:dead", namespace),
        }
    }
}

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    keys: Keys,
}

impl RedisQueue {
    /// Connect to `address` (`host:port` or a full `redis://` URL).
    pub async fn connect(address: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url(address))?;
        let conn = ConnectionManager::new(client).await?;
        info!(address = %address, namespace = %namespace, "Connected to Redis queue");

        Ok(Self {
            conn,
            keys: Keys::new(namespace),
        })
    }

    /// Build the consumer side sharing this queue's namespace.
    ///
    /// Blocking reads get their own connection so they never stall publishers.
    pub async fn consumer(&self, address: &str, config: ConsumerConfig) -> Result<RedisConsumer> {
        let client = redis::Client::open(redis_url(address))?;
        let blocking = client.get_multiplexed_async_connection().await?;

        Ok(RedisConsumer {
            blocking,
            conn: self.conn.clone(),
            keys: self.keys.clone(),
            config,
        })
    }

    pub async fn pending_len(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: usize = redis::cmd("LLEN").arg(&self.keys.pending).query_async(&mut conn).await?;
        Ok(len)
    }
}

#[async_trait]
impl TaskPublisher for RedisQueue {
    fn identifier(&self) -> &str {
        "redis"
    }

    async fn submit(&self, name: &str, payload: serde_json::Value) -> Result<String> {
        let task = Task::new(name, payload);
        let raw = serde_json::to_string(&task)?;

        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.keys.pending)
            .arg(raw)
            .query_async(&mut conn)
            .await?;

        debug!(task_id = %task.id, task_name = %name, "Task enqueued");
        Ok(task.id)
    }
}

pub struct RedisConsumer {
    blocking: MultiplexedConnection,
    conn: ConnectionManager,
    keys: Keys,
    config: ConsumerConfig,
}

impl RedisConsumer {
    /// Return every item left in the processing list to the pending list.
    pub async fn recover_in_flight(&self) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut recovered = 0;

        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.keys.processing)
                .arg(&self.keys.pending)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            warn!(recovered = recovered, "Recovered in-flight tasks from a previous consumer");
        }
        Ok(recovered)
    }

    /// Consume until `shutdown` fires, then wait for in-flight handlers.
    pub async fn run(mut self, mux: Arc<TaskMux>, mut shutdown: broadcast::Receiver<()>) {
        let concurrency = self.config.worker_permits();
        let semaphore = Arc::new(Semaphore::new(concurrency as usize));

        info!(
            concurrency = concurrency,
            pending = %self.keys.pending,
            "Starting Redis queue consumer"
        );

        loop {
            let permit = tokio::select! {
                _ = shutdown.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let mut blmove = redis::cmd("BLMOVE");
            blmove
                .arg(&self.keys.pending)
                .arg(&self.keys.processing)
                .arg("RIGHT")
                .arg("LEFT")
                .arg(POLL_TIMEOUT_SECS);

            let fetched: redis::RedisResult<Option<String>> = tokio::select! {
                _ = shutdown.recv() => break,
                fetched = blmove.query_async(&mut self.blocking) => fetched,
            };

            let raw = match fetched {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Failed to fetch task from Redis");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let mux = mux.clone();
            let conn = self.conn.clone();
            let keys = self.keys.clone();
            let config = self.config.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = process(raw, &mux, conn, &keys, &config).await {
                    error!(error = %e, "Failed to settle task in Redis");
                }
            });
        }

        if let Ok(permits) = semaphore.acquire_many(concurrency).await {
            drop(permits);
        }
        info!("Redis queue consumer stopped");
    }
}

async fn process(
    raw: String,
    mux: &TaskMux,
    mut conn: ConnectionManager,
    keys: &Keys,
    config: &ConsumerConfig,
) -> Result<()> {
    let task: Task = match serde_json::from_str(&raw) {
        Ok(task) => task,
        Err(e) => {
            error!(error = %e, "Undecodable task moved to dead list");
            return settle(&mut conn, keys, &raw, Some((&keys.dead, raw.clone()))).await;
        }
    };

    match mux.dispatch(&task).await {
        Ok(()) => {
            debug!(task_id = %task.id, task_name = %task.name, attempt = task.attempt, "Task completed");
            settle(&mut conn, keys, &raw, None).await
        }
        Err(err) if err.is_retryable() && task.attempt + 1 < config.max_attempts => {
            warn!(
                task_id = %task.id,
                task_name = %task.name,
                attempt = task.attempt,
                error = %err,
                "Task failed, scheduling redelivery"
            );
            // Stays in the processing list during the delay so a crash recovers it
            tokio::time::sleep(config.retry_delay).await;
            let next = serde_json::to_string(&task.redelivery())?;
            settle(&mut conn, keys, &raw, Some((&keys.pending, next))).await
        }
        Err(err) => {
            error!(
                task_id = %task.id,
                task_name = %task.name,
                attempt = task.attempt,
                error = %err,
                "Task dead-lettered"
            );
            settle(&mut conn, keys, &raw, Some((&keys.dead, raw.clone()))).await
        }
    }
}

/// Atomically drop `raw` from the processing list and optionally push a
/// replacement onto another list.
async fn settle(
    conn: &mut ConnectionManager,
    keys: &Keys,
    raw: &str,
    push: Option<(&String, String)>,
) -> Result<()> {
    let mut pipe = redis::pipe();
    pipe.atomic().cmd("LREM").arg(&keys.processing).arg(1).arg(raw).ignore();
    if let Some((list, value)) = push {
        pipe.cmd("LPUSH").arg(list).arg(value).ignore();
    }
    let _: () = pipe.query_async(conn).await?;
    Ok(())
}

fn redis_url(address: &str) -> String {
    if address.starts_with("redis://") || address.starts_with("rediss://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url() {
        assert_eq!(redis_url("127.0.0.1:6379"), "redis://127.0.0.1:6379");
        assert_eq!(redis_url("redis://cache:6379/2"), "redis://cache:6379/2");
    }

    #[test]
    fn test_keys_namespaced() {
        let keys = Keys::new("sso:tasks");
        assert_eq!(keys.pending, "sso:tasks:pending");
        assert_eq!(keys.processing, "sso:tasks:processing");
        assert_eq!(keys.dead, "sso:tasks:dead");
    }
}
