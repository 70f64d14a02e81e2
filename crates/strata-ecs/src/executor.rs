//! Task executors for chunked parallel view iteration.
//!
//! The engine never spawns threads itself. A parallel view splits its rows
//! into independent [`Task`]s and hands them to an [`Executor`], which must
//! run every task to completion before returning. Nothing is assumed about
//! thread count, ordering, or fairness.

use rayon::prelude::*;

use crate::EcsError;

/// One independent unit of work.
pub type Task<'s> = Box<dyn FnOnce() + Send + 's>;

/// Runs a set of independent tasks and blocks until all have finished.
pub trait Executor {
    /// Run every task. Tasks may execute in any order, on any thread.
    fn run_all<'s>(&self, tasks: Vec<Task<'s>>);
}

impl<E: Executor + ?Sized> Executor for &E {
    fn run_all<'s>(&self, tasks: Vec<Task<'s>>) {
        (**self).run_all(tasks);
    }
}

/// Runs tasks one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialExecutor;

impl Executor for SerialExecutor {
    fn run_all<'s>(&self, tasks: Vec<Task<'s>>) {
        for task in tasks {
            task();
        }
    }
}

/// Runs tasks on a rayon thread pool.
///
/// [`RayonExecutor::global`] uses rayon's global pool;
/// [`RayonExecutor::with_threads`] builds a dedicated one.
#[derive(Debug, Default)]
pub struct RayonExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl RayonExecutor {
    /// Use rayon's global thread pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with `threads` workers.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `threads` is zero, or
    /// [`EcsError::ThreadPool`] if rayon cannot start the pool.
    pub fn with_threads(threads: usize) -> Result<Self, EcsError> {
        if threads == 0 {
            return Err(EcsError::InvalidConfig {
                reason: "executor thread count must be > 0".to_owned(),
            });
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("strata-worker-{i}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }

    /// Number of worker threads tasks are spread over.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl Executor for RayonExecutor {
    fn run_all<'s>(&self, tasks: Vec<Task<'s>>) {
        match &self.pool {
            Some(pool) => pool.install(|| tasks.into_par_iter().for_each(|task| task())),
            None => tasks.into_par_iter().for_each(|task| task()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
