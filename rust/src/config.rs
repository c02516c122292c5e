//! Configuration types for the roster engine.

use pyo3::prelude::*;
use std::time::Duration;

use crate::catalog::DutyCategory;

/// Largest accepted search budget (one day).
pub const MAX_TIME_LIMIT_SECS: f64 = 86_400.0;

/// Search budget, rule policy and objective weights for one solve.
#[pyclass]
#[derive(Clone, Debug)]
pub struct SolverConfig {
    /// Wall-clock budget for the search in seconds
    #[pyo3(get, set)]
    pub time_limit_secs: f64,
    /// Stop once a feasible schedule exists and this many moves pass without improvement
    #[pyo3(get, set)]
    pub max_idle_moves: u64,
    /// Number of parallel search workers
    #[pyo3(get, set)]
    pub workers: usize,
    /// Fixed random seed; None re-seeds from the process RNG on every call
    #[pyo3(get, set)]
    pub seed: Option<u64>,
    /// Verbosity level: 0=silent, 1=summary, 2=progress, 3=debug
    #[pyo3(get, set)]
    pub verbosity: u8,
    /// Maximum lead-qualified people on sleep duty per day (minimum is always 1)
    #[pyo3(get, set)]
    pub sleep_lead_max: u32,
    /// Maximum lead-qualified people on short-night duty per day
    #[pyo3(get, set)]
    pub short_night_lead_max: u32,
    /// Maximum lead-qualified people on senior-night duty per day
    #[pyo3(get, set)]
    pub senior_night_lead_max: u32,
    /// Minimum work days between two senior-night duties of one person
    #[pyo3(get, set)]
    pub senior_night_min_gap: usize,
    /// Target maximum gap between senior-night duties for leads
    #[pyo3(get, set)]
    pub senior_night_max_gap_lead: usize,
    /// Target maximum gap between senior-night duties for staff
    #[pyo3(get, set)]
    pub senior_night_max_gap_staff: usize,
    /// Minimum work days between day duties of non-lead staff
    #[pyo3(get, set)]
    pub day_min_gap: usize,
    /// Target maximum gap between day duties
    #[pyo3(get, set)]
    pub day_max_gap: usize,
    /// Cap on back-to-back day-duty pairs per lead per month
    #[pyo3(get, set)]
    pub lead_day_pair_cap: u32,
    /// Penalty per same-category duty on adjacent work days
    #[pyo3(get, set)]
    pub adjacent_weight: i64,
    /// Penalty per spacing-target violation
    #[pyo3(get, set)]
    pub gap_weight: i64,
    /// Penalty per unit of cohort fairness spread
    #[pyo3(get, set)]
    pub fairness_weight: i64,
    /// Largest random tie-break coefficient per assignment
    #[pyo3(get, set)]
    pub tie_break_max: i64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 30.0,
            max_idle_moves: 2_000_000,
            workers: 4,
            seed: None,
            verbosity: 0,
            sleep_lead_max: 2,
            short_night_lead_max: 2,
            senior_night_lead_max: 1,
            senior_night_min_gap: 3,
            senior_night_max_gap_lead: 5,
            senior_night_max_gap_staff: 6,
            day_min_gap: 1,
            day_max_gap: 3,
            lead_day_pair_cap: 3,
            adjacent_weight: 10_000,
            gap_weight: 1_000,
            fairness_weight: 100,
            tie_break_max: 3,
        }
    }
}

#[pymethods]
impl SolverConfig {
    #[new]
    #[pyo3(signature = (
        time_limit_secs=None,
        max_idle_moves=None,
        workers=None,
        seed=None,
        verbosity=None,
        sleep_lead_max=None,
        short_night_lead_max=None,
        senior_night_lead_max=None,
        senior_night_min_gap=None,
        senior_night_max_gap_lead=None,
        senior_night_max_gap_staff=None,
        day_min_gap=None,
        day_max_gap=None,
        lead_day_pair_cap=None,
        adjacent_weight=None,
        gap_weight=None,
        fairness_weight=None,
        tie_break_max=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn py_new(
        time_limit_secs: Option<f64>,
        max_idle_moves: Option<u64>,
        workers: Option<usize>,
        seed: Option<u64>,
        verbosity: Option<u8>,
        sleep_lead_max: Option<u32>,
        short_night_lead_max: Option<u32>,
        senior_night_lead_max: Option<u32>,
        senior_night_min_gap: Option<usize>,
        senior_night_max_gap_lead: Option<usize>,
        senior_night_max_gap_staff: Option<usize>,
        day_min_gap: Option<usize>,
        day_max_gap: Option<usize>,
        lead_day_pair_cap: Option<u32>,
        adjacent_weight: Option<i64>,
        gap_weight: Option<i64>,
        fairness_weight: Option<i64>,
        tie_break_max: Option<i64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            time_limit_secs: time_limit_secs.unwrap_or(defaults.time_limit_secs),
            max_idle_moves: max_idle_moves.unwrap_or(defaults.max_idle_moves),
            workers: workers.unwrap_or(defaults.workers),
            seed,
            verbosity: verbosity.unwrap_or(defaults.verbosity),
            sleep_lead_max: sleep_lead_max.unwrap_or(defaults.sleep_lead_max),
            short_night_lead_max: short_night_lead_max.unwrap_or(defaults.short_night_lead_max),
            senior_night_lead_max: senior_night_lead_max
                .unwrap_or(defaults.senior_night_lead_max),
            senior_night_min_gap: senior_night_min_gap.unwrap_or(defaults.senior_night_min_gap),
            senior_night_max_gap_lead: senior_night_max_gap_lead
                .unwrap_or(defaults.senior_night_max_gap_lead),
            senior_night_max_gap_staff: senior_night_max_gap_staff
                .unwrap_or(defaults.senior_night_max_gap_staff),
            day_min_gap: day_min_gap.unwrap_or(defaults.day_min_gap),
            day_max_gap: day_max_gap.unwrap_or(defaults.day_max_gap),
            lead_day_pair_cap: lead_day_pair_cap.unwrap_or(defaults.lead_day_pair_cap),
            adjacent_weight: adjacent_weight.unwrap_or(defaults.adjacent_weight),
            gap_weight: gap_weight.unwrap_or(defaults.gap_weight),
            fairness_weight: fairness_weight.unwrap_or(defaults.fairness_weight),
            tie_break_max: tie_break_max.unwrap_or(defaults.tie_break_max),
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "SolverConfig(time_limit_secs={}, workers={}, seed={:?}, weights=({}, {}, {}))",
            self.time_limit_secs,
            self.workers,
            self.seed,
            self.adjacent_weight,
            self.gap_weight,
            self.fairness_weight
        )
    }
}

impl SolverConfig {
    /// Check that the policy is usable; returns a description of the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.time_limit_secs > 0.0 && self.time_limit_secs <= MAX_TIME_LIMIT_SECS) {
            return Err(format!(
                "time_limit_secs must be in (0, {}], got {}",
                MAX_TIME_LIMIT_SECS, self.time_limit_secs
            ));
        }
        for category in DutyCategory::LEAD_ELIGIBLE {
            if self.lead_max(category) < 1 {
                return Err(format!("lead maximum for {} must be at least 1", category));
            }
        }
        if self.senior_night_min_gap == 0 {
            return Err("senior_night_min_gap must be at least 1".to_string());
        }
        if self.tie_break_max < 0 || self.fairness_weight <= 0 {
            return Err("weights must be positive".to_string());
        }
        // Each tier must dominate the next one by an order of magnitude.
        if self.adjacent_weight < 10 * self.gap_weight
            || self.gap_weight < 10 * self.fairness_weight
            || self.fairness_weight < 10 * self.tie_break_max
        {
            return Err(format!(
                "weights must be separated by at least 10x: adjacent={}, gap={}, fairness={}, tie_break_max={}",
                self.adjacent_weight, self.gap_weight, self.fairness_weight, self.tie_break_max
            ));
        }
        Ok(())
    }

    /// Search budget, clamped to `MAX_TIME_LIMIT_SECS`.
    pub fn time_limit(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_limit_secs.min(MAX_TIME_LIMIT_SECS))
            .unwrap_or(Duration::ZERO)
    }

    /// Upper bound on lead-qualified people in a lead-eligible category.
    pub fn lead_max(&self, category: DutyCategory) -> u32 {
        match category {
            DutyCategory::Day => u32::MAX,
            DutyCategory::Sleep => self.sleep_lead_max,
            DutyCategory::ShortNight => self.short_night_lead_max,
            DutyCategory::SeniorNight => self.senior_night_lead_max,
        }
    }

    pub fn senior_night_max_gap(&self, lead_qualified: bool) -> usize {
        if lead_qualified {
            self.senior_night_max_gap_lead
        } else {
            self.senior_night_max_gap_staff
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }
}
