//! Background reload task driven by the change feed.

use tokio::task::JoinHandle;

/// Owns the reconciliation task; dropping it stops the task.
#[derive(Debug)]
pub struct ReconcileHandle {
    task: JoinHandle<()>,
}

impl ReconcileHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// False once the feed has closed or the task was stopped.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Aborts the task. The change feed subscription closes with it.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for ReconcileHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
