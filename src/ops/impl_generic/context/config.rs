//! Scheduling configuration for context projection

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Worker threads used by the descriptor pass unless configured otherwise.
pub const DEFAULT_WORKERS: usize = 5;

/// Scheduling knobs for one context projection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextProjectConfig {
    /// Size of the per-call worker pool that builds segment descriptors.
    pub workers: usize,
}

impl Default for ContextProjectConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl ContextProjectConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid("workers", "worker pool needs at least one thread"));
        }
        Ok(())
    }
}
