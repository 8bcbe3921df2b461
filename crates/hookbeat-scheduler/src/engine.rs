//! Process-facing scheduling facade.
//!
//! One [`SchedulerEngine`] lives for the process lifetime. It owns the
//! schedule table, the dispatcher, and the timer loop task; the HTTP layer
//! talks to it through `add` / `remove` / `reload` / `run_now`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use hookbeat_core::config::SHUTDOWN_GRACE_SECS;
use hookbeat_storage::{Job, Repository, StorageError};

use crate::error::{Result, SchedulerError};
use crate::executor::Executor;
use crate::table::ScheduleTable;

pub struct SchedulerEngine {
    repo: Repository,
    table: Arc<ScheduleTable>,
    executor: Executor,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    loop_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerEngine {
    pub fn new(repo: Repository) -> Self {
        let executor = Executor::new(repo.clone());
        let table = Arc::new(ScheduleTable::new(executor.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            repo,
            table,
            executor,
            shutdown_tx,
            shutdown_rx,
            loop_handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Load all active jobs, arm them, and start the timer loop.
    ///
    /// A job that fails to schedule is logged and skipped so one bad
    /// expression never blocks the rest; only the storage read itself is
    /// fatal.
    pub async fn start(&self) -> Result<()> {
        let jobs = self.repo.list_active_jobs()?;
        let total = jobs.len();
        let mut armed = 0usize;
        for job in jobs {
            let (id, name) = (job.id, job.name.clone());
            match self.table.insert(job) {
                Ok(()) => armed += 1,
                Err(e) => warn!(job_id = id, name = %name, error = %e, "failed to schedule job"),
            }
        }

        let table = Arc::clone(&self.table);
        let shutdown_rx = self.shutdown_rx.clone();
        let handle = tokio::spawn(async move { table.run(shutdown_rx).await });
        *self.loop_handle.lock().await = Some(handle);

        info!(armed, total, "scheduler started");
        Ok(())
    }

    /// Stop the timer loop, then wait up to the shutdown grace for
    /// in-flight dispatches to finish. Dispatches are never aborted —
    /// cutting one short could lose its outcome row — so anything still
    /// running after the grace is left to its own timeout.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "schedule loop join failed");
            }
        }

        self.table.tracker.close();
        let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
        if tokio::time::timeout(grace, self.table.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                grace_secs = SHUTDOWN_GRACE_SECS,
                "dispatches still running after grace period"
            );
        }
        info!("scheduler stopped");
    }

    /// Arm (or re-arm) `job` according to its active flag. An existing
    /// entry for the same id is replaced, never duplicated.
    pub fn add(&self, job: Job) -> Result<()> {
        self.table.insert(job)
    }

    /// Disarm a job. Always succeeds, including for unknown ids.
    pub fn remove(&self, id: i64) {
        self.table.remove(id)
    }

    /// Re-fetch a job from storage and re-arm it. Covers both edits and
    /// activation toggles — a deactivated job routes through `add`'s
    /// active-flag check and ends up unscheduled.
    pub fn reload(&self, id: i64) -> Result<()> {
        let job = self.fetch(id)?;
        self.add(job)
    }

    /// Dispatch a job immediately, bypassing the schedule table: no entry
    /// is created or consulted, and the job's active flag is ignored.
    pub fn run_now(&self, id: i64) -> Result<()> {
        let job = self.fetch(id)?;
        info!(job_id = id, name = %job.name, "manual dispatch");
        let executor = self.executor.clone();
        self.table.tracker.spawn(async move {
            if let Err(e) = executor.execute(&job).await {
                error!(job_id = job.id, error = %e, "manual dispatch could not record its outcome");
            }
        });
        Ok(())
    }

    /// Whether a schedule entry currently exists for `id`.
    pub fn is_armed(&self, id: i64) -> bool {
        self.table.is_armed(id)
    }

    /// Number of currently armed jobs.
    pub fn armed_count(&self) -> usize {
        self.table.armed_count()
    }

    /// The next trigger instant for an armed job, if any.
    pub fn next_trigger(&self, id: i64) -> Option<chrono::DateTime<chrono::Local>> {
        self.table.next_trigger(id)
    }

    fn fetch(&self, id: i64) -> Result<Job> {
        self.repo.get_job(id).map_err(|e| match e {
            StorageError::JobNotFound { id } => SchedulerError::JobNotFound { id },
            other => SchedulerError::Storage(other),
        })
    }
}
