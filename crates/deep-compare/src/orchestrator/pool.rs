//! Fixed-size worker pool with per-job and aggregate timeouts.
//!
//! Workers pull jobs from a shared queue and report through a channel to a
//! single collector, which writes each outcome into the slot matching the
//! job's submission index. Slots never reported before the aggregate
//! deadline stay [`JobSlot::Pending`].

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// Lifecycle of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

/// Outcome stored for one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSlot<T> {
    /// Job returned a value.
    Done(T),
    /// Job returned an error or panicked.
    Failed(String),
    /// Job exceeded its own timeout.
    TimedOut(Duration),
    /// Job had not finished when the aggregate wait ended.
    Pending,
}

impl<T> JobSlot<T> {
    pub fn state(&self) -> JobState {
        match self {
            JobSlot::Done(_) => JobState::Succeeded,
            JobSlot::Failed(_) => JobState::Failed,
            JobSlot::TimedOut(_) => JobState::TimedOut,
            JobSlot::Pending => JobState::Submitted,
        }
    }
}

/// Slots in submission order plus per-job states.
#[derive(Debug)]
pub struct PoolOutput<T> {
    pub slots: Vec<JobSlot<T>>,
    pub states: Vec<JobState>,

    /// The aggregate timeout fired before every job reported.
    pub timed_out: bool,
}

impl<T> PoolOutput<T> {
    pub fn completed(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| !matches!(s, JobSlot::Pending))
            .count()
    }
}

enum PoolEvent<T> {
    Started(usize),
    Finished(usize, JobSlot<T>),
}

type BoxedJob<T> =
    Box<dyn FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<T>> + Send>> + Send>;

/// Bounded worker pool.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    max_workers: usize,
    job_timeout: Duration,
    total_timeout: Duration,
}

impl WorkerPool {
    pub fn new(max_workers: usize, job_timeout: Duration, total_timeout: Duration) -> Self {
        Self {
            max_workers: max_workers.max(1),
            job_timeout,
            total_timeout,
        }
    }

    /// Run every job and collect outcomes by submission index.
    ///
    /// Uses `min(max_workers, jobs.len())` workers. No job is retried.
    pub async fn run<T, F, Fut>(&self, jobs: Vec<F>) -> PoolOutput<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let total = jobs.len();
        let mut slots: Vec<JobSlot<T>> = (0..total).map(|_| JobSlot::Pending).collect();
        let mut states = vec![JobState::Submitted; total];
        if total == 0 {
            return PoolOutput {
                slots,
                states,
                timed_out: false,
            };
        }

        let queue: VecDeque<(usize, BoxedJob<T>)> = jobs
            .into_iter()
            .enumerate()
            .map(|(idx, job)| {
                let boxed: BoxedJob<T> = Box::new(move || Box::pin(job()));
                (idx, boxed)
            })
            .collect();
        let queue = Arc::new(Mutex::new(queue));

        let (tx, mut rx) = mpsc::channel::<PoolEvent<T>>(total * 2);
        let worker_count = self.max_workers.min(total);
        debug!("Starting {} workers for {} jobs", worker_count, total);

        let workers: Vec<JoinHandle<()>> = (0..worker_count)
            .map(|worker_id| {
                let queue = queue.clone();
                let tx = tx.clone();
                let job_timeout = self.job_timeout;
                tokio::spawn(worker_loop(worker_id, queue, tx, job_timeout))
            })
            .collect();
        drop(tx);

        let deadline = Instant::now() + self.total_timeout;
        let mut completed = 0;
        let mut timed_out = false;

        while completed < total {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(PoolEvent::Started(idx))) => states[idx] = JobState::Running,
                Ok(Some(PoolEvent::Finished(idx, slot))) => {
                    states[idx] = slot.state();
                    slots[idx] = slot;
                    completed += 1;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Aggregate timeout after {:?}: {}/{} jobs completed",
                        self.total_timeout, completed, total
                    );
                    timed_out = true;
                    break;
                }
            }
        }

        for worker in &workers {
            worker.abort();
        }

        PoolOutput {
            slots,
            states,
            timed_out,
        }
    }
}

async fn worker_loop<T: Send + 'static>(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<(usize, BoxedJob<T>)>>>,
    tx: mpsc::Sender<PoolEvent<T>>,
    job_timeout: Duration,
) {
    loop {
        let Some((idx, job)) = pop_job(&queue) else {
            break;
        };

        if tx.send(PoolEvent::Started(idx)).await.is_err() {
            break;
        }
        debug!("worker {} running job {}", worker_id, idx);

        let mut task = JobTask(tokio::spawn(job()));
        let slot = match tokio::time::timeout(job_timeout, &mut task.0).await {
            Ok(Ok(Ok(value))) => JobSlot::Done(value),
            Ok(Ok(Err(e))) => JobSlot::Failed(e.to_string()),
            Ok(Err(join_err)) => JobSlot::Failed(format!("job panicked: {}", join_err)),
            Err(_) => JobSlot::TimedOut(job_timeout),
        };
        drop(task);

        if tx.send(PoolEvent::Finished(idx, slot)).await.is_err() {
            break;
        }
    }
}

/// Spawned job that is aborted when its worker drops it, including when the
/// worker itself is aborted at the aggregate deadline.
struct JobTask<T>(JoinHandle<T>);

impl<T> Drop for JobTask<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn pop_job<T>(queue: &Mutex<VecDeque<(usize, BoxedJob<T>)>>) -> Option<(usize, BoxedJob<T>)> {
    match queue.lock() {
        Ok(mut q) => q.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompareError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type JobFuture = std::pin::Pin<Box<dyn Future<Output = Result<usize>> + Send>>;

    fn sleeper(ms: u64, value: usize) -> impl FnOnce() -> JobFuture {
        move || {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(value)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_submission_order() {
        let pool = WorkerPool::new(4, Duration::from_secs(30), Duration::from_secs(120));
        let jobs = vec![sleeper(40, 0), sleeper(10, 1), sleeper(30, 2), sleeper(20, 3)];
        let out = pool.run(jobs).await;

        assert!(!out.timed_out);
        assert_eq!(
            out.slots,
            vec![
                JobSlot::Done(0),
                JobSlot::Done(1),
                JobSlot::Done(2),
                JobSlot::Done(3)
            ]
        );
        assert!(out.states.iter().all(|s| *s == JobState::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_timeout_leaves_pending_slots() {
        let pool = WorkerPool::new(4, Duration::from_secs(30), Duration::from_secs(1));
        let jobs = vec![
            sleeper(10_000, 0),
            sleeper(10, 1),
            sleeper(20_000, 2),
            sleeper(30, 3),
        ];
        let out = pool.run(jobs).await;

        assert!(out.timed_out);
        assert_eq!(out.completed(), 2);
        assert_eq!(out.slots[0], JobSlot::Pending);
        assert_eq!(out.slots[1], JobSlot::Done(1));
        assert_eq!(out.slots[2], JobSlot::Pending);
        assert_eq!(out.slots[3], JobSlot::Done(3));
        assert_eq!(out.states[0], JobState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_timeout_and_failure_are_isolated() {
        let pool = WorkerPool::new(1, Duration::from_millis(50), Duration::from_secs(10));
        let failing = || -> JobFuture {
            Box::pin(async { Err(CompareError::Config("boom".into())) })
        };
        let jobs: Vec<Box<dyn FnOnce() -> JobFuture + Send>> = vec![
            Box::new(sleeper(1_000, 0)),
            Box::new(failing),
            Box::new(sleeper(5, 2)),
        ];
        let out = pool.run(jobs).await;

        assert!(!out.timed_out);
        assert_eq!(out.slots[0], JobSlot::TimedOut(Duration::from_millis(50)));
        assert!(matches!(out.slots[1], JobSlot::Failed(ref m) if m.contains("boom")));
        assert_eq!(out.slots[2], JobSlot::Done(2));
        assert_eq!(
            out.states,
            vec![JobState::TimedOut, JobState::Failed, JobState::Succeeded]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_timeout_stops_running_jobs() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counting = |finished: Arc<AtomicUsize>| {
            move || async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CompareError>(())
            }
        };
        let pool = WorkerPool::new(2, Duration::from_secs(30), Duration::from_secs(1));
        let out = pool
            .run(vec![counting(finished.clone()), counting(finished.clone())])
            .await;
        assert!(out.timed_out);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_timeout_stops_the_job() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let job = move || async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CompareError>(())
        };
        let pool = WorkerPool::new(1, Duration::from_secs(1), Duration::from_secs(60));
        let out = pool.run(vec![job]).await;
        assert_eq!(out.slots[0], JobSlot::TimedOut(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let pool = WorkerPool::new(4, Duration::from_secs(1), Duration::from_secs(1));
        let out = pool.run(Vec::<fn() -> std::future::Ready<Result<()>>>::new()).await;
        assert!(out.slots.is_empty());
        assert!(!out.timed_out);
    }
}
