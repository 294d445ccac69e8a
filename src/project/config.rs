//! Background update configuration.

/// Settings for the background update queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueConfig {
    /// Number of worker threads. Zero means updates only run when a caller
    /// forces them.
    pub workers: usize,
    /// Prefix for worker thread names; workers are suffixed `-0`, `-1`, ...
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            thread_name: "typedom-update".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// A queue without workers; every update is applied by `force_update`.
    pub fn inline() -> Self {
        Self::default().with_workers(0)
    }
}
