//! Named-task cancellation registry.
//!
//! Long-running work (backfill, simulation, range previews) runs under a
//! unique name; launching a new instance of a name aborts the previous
//! holder, so at most one instance of each task family exists.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use tokio::task::{AbortHandle, JoinHandle};

#[derive(Default)]
pub struct UniqueTaskRegistry {
    handles: Mutex<HashMap<String, AbortHandle>>,
}

impl UniqueTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` under `name`, aborting any previous holder.
    pub fn launch<F>(&self, name: &str, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        let mut handles = self.handles.lock();
        if let Some(previous) = handles.insert(name.to_string(), handle.abort_handle()) {
            previous.abort();
        }
        handle
    }

    /// Abort the named task if one is running.
    pub fn cancel(&self, name: &str) {
        if let Some(handle) = self.handles.lock().remove(name) {
            handle.abort();
        }
    }

    /// Whether the named task is still running.
    pub fn is_running(&self, name: &str) -> bool {
        self.handles
            .lock()
            .get(name)
            .is_some_and(|h| !h.is_finished())
    }
}
