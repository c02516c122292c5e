//! Solve orchestration: input validation, model pipeline and result assembly.

use chrono::NaiveDate;
use pyo3::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;
use thiserror::Error;

use crate::catalog::{LEAD_COUNT, TEAM_SIZE};
use crate::config::SolverConfig;
use crate::history::HistoryDigest;
use crate::models::{AvoidanceGroup, DailyRecord, LockedCell, Person};
use crate::stats::ScheduleStatistics;
use crate::{log_debug, log_progress, log_summary};

use super::constraints::compile;
use super::extract::extract;
use super::model::{ConstraintKind, RosterModel};
use super::penalties::encode;
use super::search::{self, SearchParams};
use super::{CellLock, RosterProblem};

/// Errors that can occur while building or solving a roster.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("Roster must have exactly {expected} people, got {actual}")]
    RosterSize { expected: usize, actual: usize },
    #[error("Roster must have exactly {expected} lead-qualified people, got {actual}")]
    LeadCount { expected: usize, actual: usize },
    #[error("Duplicate person id: {0}")]
    DuplicatePerson(String),
    #[error("Work-day list is empty")]
    NoWorkDays,
    #[error("Work days must be strictly increasing: {day} follows {previous}")]
    UnorderedWorkDays { day: NaiveDate, previous: NaiveDate },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("No feasible schedule found in {elapsed_ms} ms ({violations} rule violations, mostly {worst})")]
    Infeasible {
        elapsed_ms: u64,
        violations: i64,
        worst: String,
    },
}

impl SolveError {
    /// True for input errors that are rejected before any search runs.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, SolveError::Infeasible { .. })
    }
}

/// A produced month: per-day records plus statistics.
#[pyclass]
#[derive(Clone, Debug)]
pub struct ScheduleResult {
    #[pyo3(get)]
    pub schedule: Vec<DailyRecord>,
    #[pyo3(get)]
    pub statistics: ScheduleStatistics,
    /// Locked cells that named an unknown person or day and were skipped.
    #[pyo3(get)]
    pub ignored_locks: Vec<LockedCell>,
    /// Objective value of the returned assignment.
    #[pyo3(get)]
    pub objective: i64,
    #[pyo3(get)]
    pub elapsed_ms: u64,
}

#[pymethods]
impl ScheduleResult {
    fn __repr__(&self) -> String {
        format!(
            "ScheduleResult(days={}, objective={}, ignored_locks={}, elapsed_ms={})",
            self.schedule.len(),
            self.objective,
            self.ignored_locks.len(),
            self.elapsed_ms
        )
    }
}

/// One roster solve: validated inputs plus the pipeline that turns them into a month.
pub struct RosterSolver {
    problem: RosterProblem,
    ignored_locks: Vec<LockedCell>,
}

impl RosterSolver {
    /// Validate inputs and resolve them against the roster.
    ///
    /// Rejects rosters that do not match the staffing model, empty or
    /// unordered work-day lists and unusable configurations. Locked cells that
    /// name an unknown person or day are kept aside and reported in the result.
    pub fn new(
        roster: Vec<Person>,
        work_days: Vec<NaiveDate>,
        avoidance_groups: Vec<AvoidanceGroup>,
        prior_days: Vec<DailyRecord>,
        locked_cells: Vec<LockedCell>,
        config: SolverConfig,
    ) -> Result<Self, SolveError> {
        if roster.len() != TEAM_SIZE {
            return Err(SolveError::RosterSize {
                expected: TEAM_SIZE,
                actual: roster.len(),
            });
        }
        let leads = roster.iter().filter(|p| p.lead_qualified).count();
        if leads != LEAD_COUNT {
            return Err(SolveError::LeadCount {
                expected: LEAD_COUNT,
                actual: leads,
            });
        }
        let mut seen = FxHashSet::default();
        for person in &roster {
            if !seen.insert(person.id.as_str()) {
                return Err(SolveError::DuplicatePerson(person.id.clone()));
            }
        }
        if work_days.is_empty() {
            return Err(SolveError::NoWorkDays);
        }
        for pair in work_days.windows(2) {
            if pair[1] <= pair[0] {
                return Err(SolveError::UnorderedWorkDays {
                    day: pair[1],
                    previous: pair[0],
                });
            }
        }
        config.validate().map_err(SolveError::InvalidConfig)?;

        let verbosity = config.verbosity;
        let person_index: FxHashMap<&str, usize> = roster
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();
        let day_index: FxHashMap<NaiveDate, usize> = work_days
            .iter()
            .enumerate()
            .map(|(i, &d)| (d, i))
            .collect();

        let groups = resolve_groups(&roster, &person_index, &avoidance_groups);

        let mut locks = Vec::with_capacity(locked_cells.len());
        let mut ignored_locks = Vec::new();
        for cell in locked_cells {
            match (
                person_index.get(cell.person_id.as_str()),
                day_index.get(&cell.day),
            ) {
                (Some(&person), Some(&day)) => locks.push(CellLock {
                    person,
                    day,
                    category: cell.category,
                }),
                _ => {
                    log_progress!(
                        verbosity,
                        "Ignoring locked cell {} on {}: not in this roster or month",
                        cell.person_id,
                        cell.day
                    );
                    ignored_locks.push(cell);
                }
            }
        }

        let history = HistoryDigest::build(&prior_days, Some(roster[0].id.as_str()));
        let problem = RosterProblem::new(roster, work_days, groups, history, &locks, config);
        Ok(Self {
            problem,
            ignored_locks,
        })
    }

    pub fn problem(&self) -> &RosterProblem {
        &self.problem
    }

    /// Compile the model, run the bounded search and extract the month.
    pub fn solve(&self) -> Result<ScheduleResult, SolveError> {
        let start = Instant::now();
        let problem = &self.problem;
        let config = &problem.config;
        let verbosity = config.verbosity;

        log_summary!(
            verbosity,
            "Solving {} people x {} work days ({} locks, {} prior days, anchor phase {})",
            problem.n_people(),
            problem.n_days(),
            problem.lock_count(),
            problem.history.prior_day_count(),
            problem.history.anchor_phase()
        );

        // Absent a fixed seed, every call draws a fresh one.
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut model = RosterModel::new(problem.n_people(), problem.n_days(), &problem.lead_flags());
        let rules = compile(problem, &mut model);
        encode(problem, &mut model, &rules, &mut rng);
        for (kind, count) in model.constraint_census() {
            log_debug!(verbosity, "  {:<26} {}", kind.as_str(), count);
        }
        log_debug!(
            verbosity,
            "Model: {} variables, {} constraints, {} indicators",
            model.var_count(),
            model.constraints.len(),
            model.indicators.len()
        );

        let params = SearchParams {
            deadline: start.checked_add(config.time_limit()).unwrap_or(start),
            max_idle_moves: config.max_idle_moves,
            workers: config.worker_count(),
            seed: rng.gen(),
            start_temperature: config.adjacent_weight as f64 / 2.0,
            verbosity,
        };
        let outcome = search::run(&model, &params);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !outcome.is_feasible() {
            let worst = most_frequent(&outcome.violated_kinds)
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            log_summary!(
                verbosity,
                "No feasible schedule after {} ms: {} violations ({})",
                elapsed_ms,
                outcome.violations,
                worst
            );
            return Err(SolveError::Infeasible {
                elapsed_ms,
                violations: outcome.violations,
                worst,
            });
        }

        let schedule = extract(problem, &model, &outcome.cells);
        let statistics = ScheduleStatistics::compute(&problem.people, &schedule, &problem.history);
        log_summary!(
            verbosity,
            "Solved in {} ms: objective={}, fairness_score={}, worker {} after {} moves",
            elapsed_ms,
            outcome.objective,
            statistics.fairness_score,
            outcome.worker,
            outcome.moves
        );

        Ok(ScheduleResult {
            schedule,
            statistics,
            ignored_locks: self.ignored_locks.clone(),
            objective: outcome.objective,
            elapsed_ms,
        })
    }
}

/// Merge explicit groups with per-person group ids; unknown member ids are dropped.
fn resolve_groups(
    roster: &[Person],
    person_index: &FxHashMap<&str, usize>,
    explicit: &[AvoidanceGroup],
) -> Vec<Vec<usize>> {
    let mut order: Vec<String> = Vec::new();
    let mut members: FxHashMap<String, Vec<usize>> = FxHashMap::default();
    let mut add = |group: &str, person: usize| {
        let entry = members.entry(group.to_string()).or_insert_with(|| {
            order.push(group.to_string());
            Vec::new()
        });
        if !entry.contains(&person) {
            entry.push(person);
        }
    };

    for group in explicit {
        for id in &group.member_ids {
            if let Some(&person) = person_index.get(id.as_str()) {
                add(&group.id, person);
            }
        }
    }
    for (person, p) in roster.iter().enumerate() {
        if let Some(group) = &p.avoidance_group {
            add(group, person);
        }
    }

    order
        .iter()
        .filter_map(|id| members.remove(id))
        .filter(|m| m.len() > 1)
        .map(|mut m| {
            m.sort_unstable();
            m
        })
        .collect()
}

fn most_frequent(kinds: &[ConstraintKind]) -> Option<ConstraintKind> {
    let mut counts: FxHashMap<ConstraintKind, usize> = FxHashMap::default();
    for &kind in kinds {
        *counts.entry(kind).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(kind, _)| kind)
}
