//! The live registry of armed jobs and the timer loop that fires them.
//!
//! All reads and writes of the entry map go through one mutex, so the
//! loop and the mutation API never race. Dispatches run on a
//! [`TaskTracker`], off the loop — a slow or hanging outbound call never
//! delays another job's trigger, and shutdown can still wait for whatever
//! is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};
use tokio::sync::{watch, Notify};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use hookbeat_storage::Job;

use crate::cron::CronExpr;
use crate::error::{Result, SchedulerError};
use crate::executor::Executor;

/// One armed job: its definition snapshot, parsed schedule, and the next
/// instant it is due.
struct ScheduleEntry {
    job: Job,
    expr: CronExpr,
    next_at: DateTime<Local>,
}

pub(crate) struct ScheduleTable {
    entries: Mutex<HashMap<i64, ScheduleEntry>>,
    /// Wakes the loop whenever the entry set changes.
    changed: Notify,
    executor: Executor,
    /// Supervises every spawned dispatch so `stop` can bound them.
    pub(crate) tracker: TaskTracker,
}

impl ScheduleTable {
    pub(crate) fn new(executor: Executor) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            changed: Notify::new(),
            executor,
            tracker: TaskTracker::new(),
        }
    }

    /// Arm `job`, replacing any existing entry for its id. Inactive jobs
    /// are left unscheduled. Fails with `InvalidExpression` when the cron
    /// expression cannot be parsed or never fires again; the job stays
    /// unscheduled in that case.
    pub(crate) fn insert(&self, job: Job) -> Result<()> {
        let result = {
            let mut entries = self.entries.lock().unwrap();
            entries.remove(&job.id);

            if !job.is_active {
                debug!(job_id = job.id, "job inactive — left unscheduled");
                Ok(())
            } else {
                match arm(job) {
                    Ok((id, entry)) => {
                        info!(
                            job_id = id,
                            name = %entry.job.name,
                            next = %entry.next_at.to_rfc3339(),
                            "job armed"
                        );
                        entries.insert(id, entry);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        };
        self.changed.notify_one();
        result
    }

    /// Disarm a job. Safe for unknown ids.
    pub(crate) fn remove(&self, id: i64) {
        if self.entries.lock().unwrap().remove(&id).is_some() {
            info!(job_id = id, "job disarmed");
        }
        self.changed.notify_one();
    }

    pub(crate) fn is_armed(&self, id: i64) -> bool {
        self.entries.lock().unwrap().contains_key(&id)
    }

    pub(crate) fn armed_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub(crate) fn next_trigger(&self, id: i64) -> Option<DateTime<Local>> {
        self.entries.lock().unwrap().get(&id).map(|e| e.next_at)
    }

    fn next_deadline(&self) -> Option<DateTime<Local>> {
        self.entries
            .lock()
            .unwrap()
            .values()
            .map(|e| e.next_at)
            .min()
    }

    /// Timer loop. Sleeps until the nearest trigger, wakes early on any
    /// table mutation, and exits when `shutdown` flips to true.
    pub(crate) async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("schedule loop started");
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown too.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.changed.notified() => {
                    // Entry set changed; recompute the nearest deadline.
                }
                _ = sleep_until(deadline) => self.fire_due(),
            }
        }
        info!("schedule loop stopped");
    }

    /// Hand every due job to the dispatcher and re-arm it from the fired
    /// instant. A job whose schedule has no future instant is unscheduled.
    fn fire_due(&self) {
        let now = Local::now();
        let mut entries = self.entries.lock().unwrap();
        let due: Vec<i64> = entries
            .iter()
            .filter(|(_, e)| e.next_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(entry) = entries.get_mut(&id) else {
                continue;
            };

            let job = entry.job.clone();
            info!(job_id = id, name = %job.name, "job due — dispatching");
            let executor = self.executor.clone();
            self.tracker.spawn(async move {
                if let Err(e) = executor.execute(&job).await {
                    error!(job_id = job.id, error = %e, "dispatch could not record its outcome");
                }
            });

            match entry.expr.next_after(now) {
                Some(next_at) => {
                    debug!(job_id = id, next = %next_at.to_rfc3339(), "job re-armed");
                    entry.next_at = next_at;
                }
                None => {
                    warn!(job_id = id, "schedule has no future trigger — job unscheduled");
                    entries.remove(&id);
                }
            }
        }
    }
}

fn arm(job: Job) -> Result<(i64, ScheduleEntry)> {
    let expr: CronExpr = job.cron_expr.parse()?;
    let next_at = expr.next_after(Local::now()).ok_or_else(|| {
        SchedulerError::InvalidExpression(format!(
            "schedule {:?} has no future trigger",
            job.cron_expr
        ))
    })?;
    Ok((job.id, ScheduleEntry { job, expr, next_at }))
}

async fn sleep_until(deadline: Option<DateTime<Local>>) {
    match deadline {
        Some(at) => {
            let wait = (at - Local::now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(wait).await;
        }
        // Nothing armed: park until a mutation wakes the loop.
        None => std::future::pending().await,
    }
}
