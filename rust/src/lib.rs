//! Rust implementation of the duty roster engine.
//!
//! Assigns a fixed team to daily duty categories over a month of work days,
//! honoring headcount, lead coverage, spacing and avoidance rules, and
//! balancing the soft rules through a weighted objective.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::NaiveDate;
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

pub mod catalog;
mod config;
pub mod engine;
pub mod history;
pub mod logging;
mod models;
pub mod stats;
pub mod validation;

pub use catalog::{CatalogError, CategoryCounts, DutyCategory, SlotSpec, SubPosition};
pub use config::SolverConfig;
pub use engine::{RosterSolver, ScheduleResult, SolveError};
pub use history::HistoryDigest;
pub use models::{AvoidanceGroup, DailyRecord, DutyRecord, LockedCell, Person};
pub use stats::{CategoryDistribution, ScheduleStatistics};
pub use validation::{validate_day, validate_month, Finding, FindingKind};

impl From<SolveError> for PyErr {
    fn from(err: SolveError) -> PyErr {
        if err.is_configuration() {
            PyValueError::new_err(err.to_string())
        } else {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

/// Generate a month of duty assignments.
///
/// # Arguments
/// * `roster` - The 17 team members in roster order; the first is the anchor
/// * `work_days` - Strictly increasing work days of the month
/// * `avoidance_groups` - Groups whose members never share a category on a day
/// * `prior_days` - Records of the previous month's work days (any order)
/// * `locked_cells` - Caller-pinned cells; unknown people or days are ignored
/// * `config` - Search budget, rule policy and weights (defaults if omitted)
///
/// # Returns
/// * ScheduleResult with per-day records, statistics and ignored locks
///
/// # Raises
/// * ValueError for a roster, work-day list or configuration that does not fit
/// * RuntimeError if no feasible schedule is found within the time limit
#[pyfunction]
#[pyo3(signature = (roster, work_days, avoidance_groups=Vec::new(), prior_days=Vec::new(), locked_cells=Vec::new(), config=None))]
fn generate_schedule(
    py: Python<'_>,
    roster: Vec<Person>,
    work_days: Vec<NaiveDate>,
    avoidance_groups: Vec<AvoidanceGroup>,
    prior_days: Vec<DailyRecord>,
    locked_cells: Vec<LockedCell>,
    config: Option<SolverConfig>,
) -> PyResult<ScheduleResult> {
    let solver = RosterSolver::new(
        roster,
        work_days,
        avoidance_groups,
        prior_days,
        locked_cells,
        config.unwrap_or_default(),
    )?;
    // The search is CPU-bound; let other Python threads run meanwhile.
    let result = py.allow_threads(|| solver.solve())?;
    Ok(result)
}

/// Check one day's records and return the findings (empty when valid).
#[pyfunction]
#[pyo3(name = "validate_day", signature = (day, records, roster, avoidance_groups=Vec::new()))]
fn py_validate_day(
    day: NaiveDate,
    records: Vec<DutyRecord>,
    roster: Vec<Person>,
    avoidance_groups: Vec<AvoidanceGroup>,
) -> Vec<Finding> {
    validate_day(day, &records, &roster, &avoidance_groups)
}

/// Check a month of records, including senior-night fairness and repeated categories.
#[pyfunction]
#[pyo3(name = "validate_month", signature = (days, roster, avoidance_groups=Vec::new()))]
fn py_validate_month(
    days: Vec<DailyRecord>,
    roster: Vec<Person>,
    avoidance_groups: Vec<AvoidanceGroup>,
) -> Vec<Finding> {
    validate_month(&days, &roster, &avoidance_groups)
}

/// Summarize prior-month records: last duties, counts and the anchor's phase.
#[pyfunction]
#[pyo3(signature = (prior_days, anchor_id=None))]
fn digest_history(prior_days: Vec<DailyRecord>, anchor_id: Option<String>) -> HistoryDigest {
    HistoryDigest::build(&prior_days, anchor_id.as_deref())
}

/// The duty_roster.rust Python module.
#[pymodule]
fn rust(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data types
    m.add_class::<Person>()?;
    m.add_class::<AvoidanceGroup>()?;
    m.add_class::<LockedCell>()?;
    m.add_class::<DutyRecord>()?;
    m.add_class::<DailyRecord>()?;
    m.add_class::<HistoryDigest>()?;

    // Results
    m.add_class::<ScheduleResult>()?;
    m.add_class::<ScheduleStatistics>()?;
    m.add_class::<CategoryDistribution>()?;
    m.add_class::<Finding>()?;

    // Config types
    m.add_class::<SolverConfig>()?;

    // Algorithms
    m.add_function(wrap_pyfunction!(generate_schedule, m)?)?;
    m.add_function(wrap_pyfunction!(py_validate_day, m)?)?;
    m.add_function(wrap_pyfunction!(py_validate_month, m)?)?;
    m.add_function(wrap_pyfunction!(digest_history, m)?)?;

    Ok(())
}
