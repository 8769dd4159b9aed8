//! Bounded worker pool for per-term clustering.

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IrisError, Result};

/// Terms handed to one clustering task.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringExecutorConfig {
    /// Worker threads of the clustering pool.
    pub num_threads: usize,

    /// Terms per clustering task.
    pub batch_size: usize,
}

impl Default for ClusteringExecutorConfig {
    fn default() -> Self {
        ClusteringExecutorConfig {
            num_threads: num_cpus::get().max(1),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ClusteringExecutorConfig {
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Runs clustering tasks either inline or on its own rayon pool.
#[derive(Debug)]
pub struct ClusteringExecutor {
    config: ClusteringExecutorConfig,
    pool: rayon::ThreadPool,
}

impl ClusteringExecutor {
    pub fn new(config: ClusteringExecutorConfig) -> Result<Self> {
        if config.num_threads == 0 {
            return Err(IrisError::invalid_config("clustering pool needs at least one thread"));
        }
        if config.batch_size == 0 {
            return Err(IrisError::invalid_config("clustering batch size must be positive"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_threads)
            .thread_name(|i| format!("sparse-clustering-{i}"))
            .build()
            .map_err(|e| IrisError::internal(format!("failed to build clustering pool: {e}")))?;
        debug!("clustering pool started with {} threads", config.num_threads);
        Ok(ClusteringExecutor { config, pool })
    }

    pub fn config(&self) -> &ClusteringExecutorConfig {
        &self.config
    }

    pub fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    /// Run `task` over every batch and return the results in batch order.
    /// Blocks until all tasks are done.
    pub fn run<T, R, F>(&self, batches: Vec<T>, inline: bool, task: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Send + Sync,
    {
        if inline {
            batches.into_iter().map(task).collect()
        } else {
            self.pool.install(|| batches.into_par_iter().map(task).collect())
        }
    }
}
