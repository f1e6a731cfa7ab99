use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use vsphere_machine::ManagedObjectReference;

use crate::ClientError;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A remote task handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub description: String,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Resolve when the task finishes. Success may carry a result object.
    async fn wait(&self, task: &Task) -> Result<Option<ManagedObjectReference>, ClientError>;
}

/// Wait for a task, failing once `timeout` passes. Nothing is retried.
pub async fn wait_for_task<C>(
    client: &C,
    task: &Task,
    timeout: Duration,
) -> Result<Option<ManagedObjectReference>, ClientError>
where
    C: TaskClient + ?Sized,
{
    debug!(task = %task.id, description = %task.description, ?timeout, "waiting for task");
    match tokio::time::timeout(timeout, client.wait(task)).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout {
            task: task.id.clone(),
            after: timeout,
        }),
    }
}
