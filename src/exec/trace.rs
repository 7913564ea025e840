// src/exec/trace.rs

use std::sync::{Arc, Mutex, PoisonError};

/// Combined stdout/stderr of one update run.
///
/// Both stream readers append to it concurrently; order is only preserved
/// within each stream. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTrace {
    inner: Arc<Mutex<String>>,
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, text: &str) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn snapshot(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
