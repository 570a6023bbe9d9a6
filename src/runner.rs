//! Bounded worker pool with a single aggregation point.
//!
//! Tasks run on a dedicated `rayon` pool of fixed width. Each task's outcome is
//! sent over a channel to the calling thread, which is the only place outcomes
//! are folded into counters and lists, so no shared mutable state is needed.
//! A panic inside a task is caught at the task boundary and turned into an
//! outcome by the caller-supplied `recover` function; it never takes the pool
//! or the run down with it.

use anyhow::{Context, Result};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    width: usize,
}

impl WorkerPool {
    /// Build a pool with `workers` threads, or one per logical CPU when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` is zero or the threads cannot be spawned.
    pub fn new(workers: Option<usize>) -> Result<Self> {
        let width = workers.unwrap_or_else(num_cpus::get);
        anyhow::ensure!(width > 0, "worker pool needs at least one thread");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(width)
            .thread_name(|i| format!("ironload-worker-{i}"))
            .build()
            .context("build worker pool")?;
        Ok(Self { pool, width })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Run `work` on every task and feed each outcome to `aggregate` in
    /// completion order.
    ///
    /// `recover` turns a panic message into an outcome for the task that
    /// panicked. Returns the number of outcomes aggregated, which always
    /// equals `tasks.len()`.
    pub fn run<T, O, W, R, A>(&self, tasks: Vec<T>, work: W, recover: R, mut aggregate: A) -> usize
    where
        T: Send + 'static,
        O: Send + 'static,
        W: Fn(&T) -> O + Send + Sync + 'static,
        R: Fn(&T, String) -> O + Send + Sync + 'static,
        A: FnMut(O),
    {
        let (tx, rx) = mpsc::channel::<O>();
        let work = Arc::new(work);
        let recover = Arc::new(recover);

        for task in tasks {
            let tx = tx.clone();
            let work = Arc::clone(&work);
            let recover = Arc::clone(&recover);
            self.pool.spawn(move || {
                let outcome = match catch_unwind(AssertUnwindSafe(|| work(&task))) {
                    Ok(outcome) => outcome,
                    Err(payload) => recover(&task, panic_message(payload.as_ref())),
                };
                // The receiver outlives every sender; a failed send means the
                // caller is already unwinding.
                let _ = tx.send(outcome);
            });
        }
        drop(tx);

        let mut received = 0;
        for outcome in rx {
            aggregate(outcome);
            received += 1;
        }
        received
    }
}

/// Best-effort text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_every_outcome() -> Result<()> {
        let pool = WorkerPool::new(Some(4))?;
        let mut total = 0u64;
        let n = pool.run((1..=100u64).collect(), |x| x * 2, |_, _| 0, |o| total += o);
        assert_eq!(n, 100);
        assert_eq!(total, 10_100);
        Ok(())
    }

    #[test]
    fn panics_become_outcomes() -> Result<()> {
        let pool = WorkerPool::new(Some(2))?;
        let mut outcomes = Vec::new();
        pool.run(
            vec![1, 2, 3],
            |x: &i32| {
                assert!(*x != 2, "task two exploded");
                Ok(*x)
            },
            |x, msg| Err(format!("{x}: {msg}")),
            |o: std::result::Result<i32, String>| outcomes.push(o),
        );
        outcomes.sort();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0], Ok(1));
        assert_eq!(outcomes[1], Ok(3));
        assert!(matches!(&outcomes[2], Err(m) if m.contains("task two exploded")));
        Ok(())
    }

    #[test]
    fn empty_task_list_returns_immediately() -> Result<()> {
        let pool = WorkerPool::new(Some(1))?;
        assert_eq!(pool.run(Vec::<u8>::new(), |_| (), |_, _| (), |()| {}), 0);
        Ok(())
    }

    #[test]
    fn zero_width_is_rejected() {
        assert!(WorkerPool::new(Some(0)).is_err());
    }
}
