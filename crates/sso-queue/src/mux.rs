//! Task name to handler routing.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::{Task, TaskError, TaskHandler};

#[derive(Clone, Default)]
pub struct TaskMux {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskMux {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for tasks named `name`, replacing any previous one.
    pub fn handle(mut self, name: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn handles(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Route a task to its handler. Unknown task names are permanent failures.
    pub async fn dispatch(&self, task: &Task) -> Result<(), TaskError> {
        match self.handlers.get(&task.name) {
            Some(handler) => handler.handle(task).await,
            None => {
                warn!(task_id = %task.id, task_name = %task.name, "No handler registered for task");
                Err(TaskError::permanent(format!("no handler for task '{}'", task.name)))
            }
        }
    }
}
