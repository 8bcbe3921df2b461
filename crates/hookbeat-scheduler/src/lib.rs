//! `hookbeat-scheduler` — the scheduling and execution engine.
//!
//! # Overview
//!
//! [`SchedulerEngine`] arms one timer entry per active job. A single loop
//! sleeps until the nearest trigger, hands due jobs to the dispatcher
//! off-loop, and re-arms each fired job from its fired instant. Mutations
//! (add / remove / reload) serialize against the loop through the entry
//! table's lock, so the armed set always mirrors the active job set.
//!
//! | Module     | Role                                                  |
//! |------------|-------------------------------------------------------|
//! | `cron`     | six-field expression parsing + next-trigger search    |
//! | `executor` | one bounded outbound HTTP call per firing             |
//! | `table`    | armed-entry registry + timer loop                     |
//! | `engine`   | process-facing start/stop and mutation API            |

pub mod cron;
pub mod engine;
pub mod error;
pub mod executor;
mod table;

pub use cron::CronExpr;
pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use executor::Executor;
