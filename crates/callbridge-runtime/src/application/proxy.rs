//! Main-thread proxy for the blocking strategy.
//!
//! Under [`ResumeStrategy::BlockingProxy`](crate::domain::config::ResumeStrategy)
//! native code runs on worker threads that are allowed to block, but browser
//! work may only be started from the main thread.  A worker therefore posts
//! a job through [`MainThreadProxy`] and blocks; the main thread drains jobs
//! with [`MainThreadPump`].
//!
//! ```text
//!  worker ──post(job)──► channel ──► MainThreadPump::pump() ──► job()
//!     │                                                        │
//!     └──────── blocking_recv() ◄──── completer fires ◄────────┘
//! ```
//!
//! A job that is never run (the pump was dropped) drops whatever completer it
//! captured, which resumes the blocked worker with a failure record.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Work to run on the main thread.
pub type MainThreadJob = Box<dyn FnOnce() + Send>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProxyError {
    /// The main-thread pump no longer exists.
    #[error("main-thread pump is gone")]
    Closed,
}

/// Worker-side handle for posting jobs.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct MainThreadProxy {
    tx: mpsc::UnboundedSender<MainThreadJob>,
}

/// Main-thread side that runs posted jobs.
#[derive(Debug)]
pub struct MainThreadPump {
    rx: mpsc::UnboundedReceiver<MainThreadJob>,
}

/// Creates a connected proxy/pump pair.
pub fn main_thread_channel() -> (MainThreadProxy, MainThreadPump) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MainThreadProxy { tx }, MainThreadPump { rx })
}

impl MainThreadProxy {
    pub fn post(&self, job: MainThreadJob) -> Result<(), ProxyError> {
        self.tx.send(job).map_err(|_| ProxyError::Closed)
    }
}

impl MainThreadPump {
    /// Runs every job already posted and returns how many ran.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Runs jobs as they arrive until every proxy has been dropped.
    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
        debug!("all main-thread proxies dropped; pump stopping");
    }

    /// Waits for one job and runs it.  Returns `false` once every proxy is gone.
    pub async fn run_one(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_pump_runs_posted_jobs_in_order() {
        // Arrange
        let (proxy, mut pump) = main_thread_channel();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        for n in 0..3 {
            let log = Arc::clone(&log);
            proxy.post(Box::new(move || log.lock().unwrap().push(n))).unwrap();
        }

        // Act
        let ran = pump.pump();

        // Assert
        assert_eq!(ran, 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_post_after_pump_dropped_fails() {
        let (proxy, pump) = main_thread_channel();
        drop(pump);
        assert_eq!(proxy.post(Box::new(|| {})), Err(ProxyError::Closed));
    }

    #[test]
    fn test_pump_with_nothing_posted_returns_zero() {
        let (_proxy, mut pump) = main_thread_channel();
        assert_eq!(pump.pump(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_when_proxies_dropped() {
        let (proxy, pump) = main_thread_channel();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        proxy
            .post(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        drop(proxy);

        pump.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
