//! Simulator-wide context passed to every analysis.

use crate::error::{SimError, SimResult};
use ckt_config::{MAX_LOAD_THREADS, MergePolicy, TaskConfig};
use ckt_core::AccumulatingTimer;
use rayon::ThreadPool;

/// Shell options, merge policy, the load thread pool and load timing.
#[derive(Debug, Default)]
pub struct SimContext {
    shell: TaskConfig,
    policy: MergePolicy,
    pool: Option<ThreadPool>,
    pool_threads: usize,
    load_time: AccumulatingTimer,
}

impl SimContext {
    pub fn new(shell: TaskConfig, policy: MergePolicy) -> Self {
        Self {
            shell,
            policy,
            ..Self::default()
        }
    }

    pub fn shell(&self) -> &TaskConfig {
        &self.shell
    }

    pub fn shell_mut(&mut self) -> &mut TaskConfig {
        &mut self.shell
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: MergePolicy) {
        self.policy = policy;
    }

    /// Merge the shell options into `task` and validate the result.
    pub fn task_config(&self, mut task: TaskConfig) -> SimResult<TaskConfig> {
        task.merge_shell(&self.shell, self.policy);
        task.validate()?;
        Ok(task)
    }

    /// Make sure a pool of exactly `threads` workers exists.
    ///
    /// Zero threads means loads run on the caller thread and no pool is
    /// kept.
    pub fn ensure_pool(&mut self, threads: usize) -> SimResult<()> {
        if threads > MAX_LOAD_THREADS {
            return Err(SimError::InvalidArg {
                what: "load thread count exceeds the limit",
            });
        }
        if threads == 0 {
            self.pool = None;
            self.pool_threads = 0;
            return Ok(());
        }
        if self.pool.is_none() || self.pool_threads != threads {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("ckt-load-{i}"))
                .build()?;
            tracing::debug!(threads, "built device load pool");
            self.pool = Some(pool);
            self.pool_threads = threads;
        }
        Ok(())
    }

    pub fn pool(&self) -> Option<&ThreadPool> {
        self.pool.as_ref()
    }

    pub fn pool_threads(&self) -> usize {
        self.pool_threads
    }

    /// Wall time spent in device loads.
    pub fn load_time(&self) -> &AccumulatingTimer {
        &self.load_time
    }
}
