//! Deterministic id helpers shared across crates.
//!
//! Nothing here reads the system clock or RNG; callers supply
//! timestamps explicitly so every id-producing operation stays
//! reproducible in tests (spec §4.F's Planner requirement, applied
//! workspace-wide).

use chrono::{DateTime, Utc};

/// Build a task id in the `task-{yyyymmdd-HHMM}-{step-name}` format
/// used by the Planner (spec §4.F).
pub fn task_id(now: DateTime<Utc>, step_name: &str) -> String {
    format!("task-{}-{}", now.format("%Y%m%d-%H%M"), step_name)
}
