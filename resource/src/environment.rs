use std::time::Duration;

use vsphere_client::DEFAULT_TASK_TIMEOUT;
use vsphere_version::VSphereVersion;

/// What the connected endpoint reported, passed to every expand and flatten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub version: VSphereVersion,
    /// How long to wait for each remote task.
    pub task_timeout: Duration,
}

impl Environment {
    pub fn new(version: VSphereVersion) -> Self {
        Self {
            version,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    pub fn with_task_timeout(mut self, task_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self
    }
}
