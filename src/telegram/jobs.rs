//! Named repeating jobs started by tracking commands

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const JOB_STATS: &str = "fstats";
pub const JOB_ALERTS: &str = "falert_track";
pub const JOB_REPLIES: &str = "freplies_track";

/// Returned by a tick; `Stop` ends the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControl {
    Continue,
    Stop,
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `tick` now and then every `every`, replacing a job of the same name
    pub fn schedule<F, Fut>(&self, name: &str, every: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = JobControl> + Send + 'static,
    {
        let job = name.to_string();
        let every = every.max(Duration::from_secs(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await == JobControl::Stop {
                    tracing::info!("Job {} removed itself", job);
                    break;
                }
            }
        });

        if let Some(old) = self.jobs.lock().insert(name.to_string(), handle) {
            tracing::info!("Replacing job {}", name);
            old.abort();
        }
    }

    /// Returns whether a running job was cancelled
    pub fn cancel(&self, name: &str) -> bool {
        match self.jobs.lock().remove(name) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs
            .lock()
            .get(name)
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn shutdown(&self) {
        for (name, handle) in self.jobs.lock().drain() {
            tracing::debug!("Stopping job {}", name);
            handle.abort();
        }
    }
}

impl Drop for JobRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
