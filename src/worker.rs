//! Background worker pool.
//!
//! A thin layer over a dedicated `rayon` pool: each submission gets a one-shot
//! result channel wrapped in [`Pending`], and the pool tracks how many jobs are
//! still in flight so [`WorkerPool::shutdown`] can wait for them. A panicking
//! job is logged by the pool; its pending result reports that the worker
//! stopped.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        InFlightGuard(self.clone())
    }

    fn wait_drained(&self) {
        let count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        let _count = self
            .drained
            .wait_while(count, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

// Released on drop, so a panicking job still counts as finished.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.0.drained.notify_all();
        }
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
    in_flight: Arc<InFlight>,
}

impl WorkerPool {
    pub fn new(size: usize, name: &str) -> Result<Self> {
        if size == 0 {
            return Err(anyhow!("worker pool size must be greater than zero"));
        }
        let prefix = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(move |idx| format!("{}-{}", prefix, idx))
            .panic_handler(|_| log::error!("worker job panicked"))
            .build()
            .with_context(|| format!("failed to start worker pool {}", name))?;
        log::debug!("worker pool {} started with {} threads", name, size);
        Ok(Self {
            pool,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `job` on the pool and return a handle to its result.
    pub fn submit<T, F>(&self, job: F) -> Pending<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        self.spawn(move || {
            // The caller may have dropped its handle; nothing to report then.
            let _ = tx.send(job());
        });
        Pending { rx }
    }

    /// Run `job` on the pool without a result handle.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.in_flight.enter();
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// True when called from one of this pool's threads.
    pub fn is_worker_thread(&self) -> bool {
        self.pool.current_thread_index().is_some()
    }

    /// Wait for every submitted job to finish, then stop the threads.
    ///
    /// Called from inside a job, the wait is skipped: the remaining jobs
    /// finish on their own and the threads exit after them.
    pub fn shutdown(self) {
        if self.is_worker_thread() {
            log::debug!("worker pool shut down from a worker; not waiting for in-flight jobs");
            return;
        }
        self.in_flight.wait_drained();
    }
}

/// Run `job` on the global `rayon` pool. Used when no dedicated pool exists.
pub fn submit_detached<T, F>(job: F) -> Pending<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    rayon::spawn(move || {
        let _ = tx.send(job());
    });
    Pending { rx }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PendingError {
    /// The job was dropped without producing a result.
    #[error("worker stopped before completing the request")]
    Disconnected,
    #[error("timed out after {} ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Result of a submitted job, delivered once.
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    pub fn wait(self) -> Result<T, PendingError> {
        self.rx.recv().map_err(|_| PendingError::Disconnected)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<T, PendingError> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => PendingError::TimedOut(timeout),
            RecvTimeoutError::Disconnected => PendingError::Disconnected,
        })
    }

    /// Non-blocking poll. `Ok(None)` while the job is still running.
    pub fn try_take(&self) -> Result<Option<T>, PendingError> {
        match self.rx.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PendingError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_jobs_and_returns_results() -> Result<()> {
        let pool = WorkerPool::new(2, "test")?;
        assert_eq!(pool.size(), 2);
        let pending: Vec<_> = (0..8).map(|i| pool.submit(move || i * 2)).collect();
        let results: Vec<i32> = pending.into_iter().map(|p| p.wait().unwrap()).collect();
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14]);
        pool.shutdown();
        Ok(())
    }

    #[test]
    fn shutdown_waits_for_submitted_jobs() -> Result<()> {
        let pool = WorkerPool::new(1, "drain")?;
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            pool.spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[test]
    fn shutdown_from_inside_a_job_does_not_wait_on_itself() -> Result<()> {
        let pool = Arc::new(Mutex::new(Some(WorkerPool::new(1, "self")?)));
        let (tx, rx) = mpsc::channel();
        {
            let guard = pool.lock().unwrap();
            let inner = pool.clone();
            guard.as_ref().unwrap().spawn(move || {
                let own = inner.lock().unwrap().take();
                if let Some(own) = own {
                    assert!(own.is_worker_thread());
                    own.shutdown();
                }
                tx.send(()).unwrap();
            });
        }
        rx.recv_timeout(Duration::from_secs(5))
            .expect("job finished after shutting down its own pool");
        Ok(())
    }

    #[test]
    fn panicking_job_reports_disconnected_and_pool_survives() -> Result<()> {
        let pool = WorkerPool::new(1, "panic")?;
        let pending = pool.submit(|| -> u8 { panic!("boom") });
        assert_eq!(pending.wait(), Err(PendingError::Disconnected));
        assert_eq!(pool.submit(|| 7u8).wait(), Ok(7));
        pool.shutdown();
        Ok(())
    }

    #[test]
    fn wait_timeout_expires() -> Result<()> {
        let pool = WorkerPool::new(1, "slow")?;
        let pending = pool.submit(|| std::thread::sleep(Duration::from_millis(200)));
        assert_eq!(
            pending.wait_timeout(Duration::from_millis(10)),
            Err(PendingError::TimedOut(Duration::from_millis(10)))
        );
        assert_eq!(
            PendingError::TimedOut(Duration::from_millis(10)).to_string(),
            "timed out after 10 ms"
        );
        pool.shutdown();
        Ok(())
    }

    #[test]
    fn detached_jobs_run_off_the_caller_thread() {
        let caller = std::thread::current().id();
        let pending = submit_detached(move || std::thread::current().id() != caller);
        assert_eq!(pending.wait(), Ok(true));
    }

    #[test]
    fn rejects_empty_pool() {
        assert!(WorkerPool::new(0, "none").is_err());
    }
}
