//! Bounded pool for fire-and-forget bookkeeping
//!
//! Login submits its counter updates here instead of awaiting them. Jobs run on their own tokio
//! tasks, so a cancelled request never aborts a job it submitted, and a panicking job only takes
//! down its own task.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tokio::sync::{Mutex, Notify, mpsc, watch};

use crate::config::BackgroundConfig;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct NamedJob {
    name: &'static str,
    future: Job,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// A fixed set of workers draining a bounded job queue.
pub struct BackgroundTasks {
    sender: mpsc::Sender<NamedJob>,
    in_flight: Arc<InFlight>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl BackgroundTasks {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn new(config: BackgroundConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let in_flight = Arc::new(InFlight::default());
        let (shutdown, _) = watch::channel(false);

        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&in_flight),
                    shutdown.subscribe(),
                ))
            })
            .collect();

        Self {
            sender,
            in_flight,
            shutdown,
            workers: Mutex::new(workers),
        }
    }

    /// Queue a job without waiting. Returns `false` if the job was dropped because the queue is
    /// full or the pool has shut down.
    pub fn submit<F>(&self, name: &'static str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.in_flight.start();

        match self.sender.try_send(NamedJob {
            name,
            future: Box::pin(job),
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(job = job.name, "Background queue is full, dropping job");
                self.in_flight.finish();
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(job = job.name, "Background pool is shut down, dropping job");
                self.in_flight.finish();
                false
            }
        }
    }

    /// Jobs queued or running
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Drain outstanding jobs, then stop the workers
    pub async fn shutdown(&self) {
        self.wait_idle().await;
        let _ = self.shutdown.send(true);

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background worker ended abnormally");
            }
        }
        tracing::debug!("Background pool stopped");
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<NamedJob>>>,
    in_flight: Arc<InFlight>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            tokio::select! {
                job = receiver.recv() => job,
                _ = shutdown.changed() => None,
            }
        };

        let Some(job) = job else {
            tracing::debug!(worker = id, "Background worker exiting");
            break;
        };

        if let Err(e) = tokio::spawn(job.future).await {
            tracing::error!(worker = id, job = job.name, error = %e, "Background job panicked");
        }
        in_flight.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_jobs_run_and_wait_idle() {
        let pool = BackgroundTasks::new(BackgroundConfig::default());
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = Arc::clone(&counter);
            assert!(pool.submit("count", async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.wait_idle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_drops_jobs() {
        let pool = BackgroundTasks::new(BackgroundConfig {
            workers: 1,
            queue_capacity: 1,
        });
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();

        assert!(pool.submit("blocker", async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
        }));
        started_rx.await.unwrap();

        // The worker is busy, one slot in the queue
        assert!(pool.submit("queued", async {}));
        assert!(!pool.submit("dropped", async {}));
        assert_eq!(pool.pending(), 2);

        release_tx.send(()).unwrap();
        pool.wait_idle().await;
        assert_eq!(pool.pending(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_worker() {
        let pool = BackgroundTasks::new(BackgroundConfig {
            workers: 1,
            queue_capacity: 8,
        });
        let ran = Arc::new(AtomicUsize::new(0));

        pool.submit("panics", async { panic!("boom"); });
        let after = Arc::clone(&ran);
        pool.submit("after", async move {
            after.fetch_add(1, Ordering::SeqCst);
        });

        pool.wait_idle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_rejects() {
        let pool = BackgroundTasks::new(BackgroundConfig::default());
        let ran = Arc::new(AtomicUsize::new(0));

        let job = Arc::clone(&ran);
        pool.submit("slow", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            job.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!pool.submit("late", async {}));
    }
}
