//! Bounded job scheduler.
//!
//! At most `limit` jobs run at once. [`BoundedScheduler::submit`] suspends
//! while the scheduler is full, waiting for whichever running job finishes
//! first, so a slow image never holds back the admission of others.
//!
//! ```text
//! limit = 2
//!
//! submit(a)  → [a]
//! submit(b)  → [a, b]
//! submit(c)  → full: wait for any … b done → [a, c], returns [b's output]
//! drain()    → waits for a and c,           returns [a's, c's output]
//! ```
//!
//! The in-flight set is owned by the caller (the coordinator task), so
//! admission and completion never race. Jobs that panic or are cancelled are
//! logged and dropped from the set; callers that need a result for every job
//! catch panics inside the job itself.

use std::future::Future;

use tokio::task::{JoinError, JoinSet};
use tracing::warn;

pub const DEFAULT_LIMIT: usize = 20;

pub struct BoundedScheduler<T> {
    limit: usize,
    jobs: JoinSet<T>,
}

impl<T: Send + 'static> BoundedScheduler<T> {
    /// A scheduler admitting at most `limit` jobs (minimum 1).
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            jobs: JoinSet::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Jobs admitted and not yet collected.
    pub fn in_flight(&self) -> usize {
        self.jobs.len()
    }

    /// Admit `job`, first waiting for a free slot if the scheduler is full.
    ///
    /// Returns the outputs of every job that finished in the meantime,
    /// including ones that were already done when this was called.
    pub async fn submit<F>(&mut self, job: F) -> Vec<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut finished = Vec::new();
        while self.jobs.len() >= self.limit {
            match self.jobs.join_next().await {
                Some(joined) => collect(joined, &mut finished),
                None => break,
            }
        }
        while let Some(joined) = self.jobs.try_join_next() {
            collect(joined, &mut finished);
        }
        self.jobs.spawn(job);
        finished
    }

    /// Wait for every admitted job and return their outputs in completion order.
    pub async fn drain(&mut self) -> Vec<T> {
        let mut finished = Vec::with_capacity(self.jobs.len());
        while let Some(joined) = self.jobs.join_next().await {
            collect(joined, &mut finished);
        }
        finished
    }
}

fn collect<T>(joined: Result<T, JoinError>, finished: &mut Vec<T>) {
    match joined {
        Ok(output) => finished.push(output),
        Err(e) if e.is_panic() => warn!("Scheduled job panicked: {e}"),
        Err(e) => warn!("Scheduled job cancelled: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts running jobs and remembers the highest count seen.
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Gauge {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn delayed(gauge: Arc<Gauge>, id: usize, ms: u64) -> impl Future<Output = usize> + Send {
        async move {
            gauge.enter();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            gauge.leave();
            id
        }
    }

    #[tokio::test]
    async fn peak_concurrency_never_exceeds_limit() {
        let gauge = Arc::new(Gauge::default());
        let mut scheduler = BoundedScheduler::new(2);
        let mut done = Vec::new();

        for id in 0..5 {
            done.extend(scheduler.submit(delayed(gauge.clone(), id, 30)).await);
            assert!(scheduler.in_flight() <= 2);
        }
        done.extend(scheduler.drain().await);

        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
        done.sort();
        assert_eq!(done, [0, 1, 2, 3, 4]);
        assert_eq!(scheduler.in_flight(), 0);
    }

    #[tokio::test]
    async fn admission_waits_for_first_to_finish() {
        let gauge = Arc::new(Gauge::default());
        let mut scheduler = BoundedScheduler::new(2);

        assert!(scheduler.submit(delayed(gauge.clone(), 0, 500)).await.is_empty());
        assert!(scheduler.submit(delayed(gauge.clone(), 1, 10)).await.is_empty());
        // Full: the fast job frees the slot long before the slow one
        let freed = scheduler.submit(delayed(gauge.clone(), 2, 10)).await;
        assert_eq!(freed, [1]);
        assert_eq!(scheduler.in_flight(), 2);

        let mut rest = scheduler.drain().await;
        rest.sort();
        assert_eq!(rest, [0, 2]);
    }

    #[tokio::test]
    async fn submit_below_limit_does_not_wait() {
        let mut scheduler = BoundedScheduler::new(3);
        let started = tokio::time::Instant::now();
        for id in 0..3 {
            scheduler
                .submit(async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    id
                })
                .await;
        }
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(scheduler.drain().await.len(), 3);
    }

    #[tokio::test]
    async fn panicking_job_releases_its_slot() {
        let mut scheduler = BoundedScheduler::new(1);
        scheduler
            .submit(async {
                if true {
                    panic!("job blew up");
                }
                0usize
            })
            .await;
        let finished = scheduler.submit(async { 7usize }).await;
        assert!(finished.is_empty());
        assert_eq!(scheduler.drain().await, [7]);
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let scheduler: BoundedScheduler<()> = BoundedScheduler::new(0);
        assert_eq!(scheduler.limit(), 1);
    }
}
