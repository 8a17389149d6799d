// Background scheduler owning the two periodic jobs: the activity sweep
// and the balance reconciler. Each job runs on its own task, observes a
// cancellation signal on stop, can be force-triggered by the control
// surface, and spreads its wake-ups with a small random jitter so a
// fleet never stampedes the chain RPC.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use custos_common::{
    api::MonitoringStatusResult,
    config::SCHEDULER_JITTER_PERCENT,
    tokio::{select, sleep, spawn_task, watch, JoinError, JoinHandle, Mutex, Notify},
};

use crate::custodian::Custodian;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job {0} is already running")]
    AlreadyRunning(&'static str),

    #[error("job {0} is not running")]
    NotRunning(&'static str),

    #[error(transparent)]
    TaskError(#[from] JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    ActivitySweep,
    Reconcile,
}

struct RunningJob {
    handle: JoinHandle<()>,
    cancel: watch::Sender<bool>,
}

struct Job {
    name: &'static str,
    interval: Duration,
    running: Mutex<Option<RunningJob>>,
    force: Arc<Notify>,
}

impl Job {
    fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            running: Mutex::new(None),
            force: Arc::new(Notify::new()),
        }
    }
}

fn jittered(interval: Duration) -> Duration {
    let percent = rand::thread_rng()
        .gen_range(100 - SCHEDULER_JITTER_PERCENT..=100 + SCHEDULER_JITTER_PERCENT);
    interval * percent as u32 / 100
}

pub struct Scheduler {
    custodian: Arc<Custodian>,
    activity: Job,
    reconcile: Job,
}

impl Scheduler {
    pub fn new(custodian: Arc<Custodian>) -> Arc<Self> {
        let config = custodian.config();
        let activity = Job::new(
            "activity-sweep",
            Duration::from_secs(config.check_interval_minutes * 60),
        );
        let reconcile = Job::new(
            "reconcile",
            Duration::from_secs(config.reconcile_interval_seconds),
        );
        Arc::new(Self {
            custodian,
            activity,
            reconcile,
        })
    }

    fn job(&self, kind: JobKind) -> &Job {
        match kind {
            JobKind::ActivitySweep => &self.activity,
            JobKind::Reconcile => &self.reconcile,
        }
    }

    pub async fn start(self: &Arc<Self>, kind: JobKind) -> Result<(), SchedulerError> {
        let job = self.job(kind);
        let mut slot = job.running.lock().await;
        if slot
            .as_ref()
            .map_or(false, |running| !running.handle.is_finished())
        {
            return Err(SchedulerError::AlreadyRunning(job.name));
        }

        let (cancel, mut cancel_rx) = watch::channel(false);
        let force = Arc::clone(&job.force);
        let interval = job.interval;
        let name = job.name;
        let zelf = Arc::clone(self);

        let handle = spawn_task(name, async move {
            info!("job {} started, interval {:?}", name, interval);
            loop {
                let delay = jittered(interval);
                select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = force.notified() => {
                        debug!("job {} force-triggered", name);
                    },
                    _ = sleep(delay) => {},
                }

                let watcher = cancel_rx.clone();
                let is_cancelled = move || *watcher.borrow();
                zelf.run_once(kind, &is_cancelled).await;

                if *cancel_rx.borrow() {
                    break;
                }
            }
            info!("job {} stopped", name);
        });

        *slot = Some(RunningJob { handle, cancel });
        Ok(())
    }

    async fn run_once(&self, kind: JobKind, is_cancelled: &(dyn Fn() -> bool + Sync)) {
        match kind {
            JobKind::ActivitySweep => {
                if let Err(err) = self.custodian.activity_sweep_with(is_cancelled).await {
                    error!("activity sweep failed: {}", err);
                }
            }
            JobKind::Reconcile => {
                if let Err(err) = self.custodian.reconcile_sweep_with(is_cancelled).await {
                    error!("reconcile sweep failed: {}", err);
                }
            }
        }
    }

    /// Signal the job to stop and wait for the current cycle to finish
    /// its in-flight step.
    pub async fn stop(&self, kind: JobKind) -> Result<(), SchedulerError> {
        let job = self.job(kind);
        let running = job
            .running
            .lock()
            .await
            .take()
            .ok_or(SchedulerError::NotRunning(job.name))?;

        // The receiver side may already be gone if the task exited
        let _ = running.cancel.send(true);
        running.handle.await?;
        Ok(())
    }

    /// Run the job now, outside its schedule.
    pub async fn trigger(&self, kind: JobKind) -> Result<(), SchedulerError> {
        let job = self.job(kind);
        if !self.is_running(kind).await {
            return Err(SchedulerError::NotRunning(job.name));
        }
        job.force.notify_one();
        Ok(())
    }

    pub async fn is_running(&self, kind: JobKind) -> bool {
        self.job(kind)
            .running
            .lock()
            .await
            .as_ref()
            .map_or(false, |running| !running.handle.is_finished())
    }

    pub async fn status(&self) -> MonitoringStatusResult {
        MonitoringStatusResult {
            activity_sweeper_running: self.is_running(JobKind::ActivitySweep).await,
            reconciler_running: self.is_running(JobKind::Reconcile).await,
        }
    }

    pub async fn start_all(self: &Arc<Self>) -> Result<(), SchedulerError> {
        self.start(JobKind::ActivitySweep).await?;
        self.start(JobKind::Reconcile).await?;
        Ok(())
    }

    pub async fn stop_all(&self) {
        for kind in [JobKind::ActivitySweep, JobKind::Reconcile] {
            match self.stop(kind).await {
                Ok(()) | Err(SchedulerError::NotRunning(_)) => {}
                Err(err) => warn!("error stopping job: {}", err),
            }
        }
    }
}
