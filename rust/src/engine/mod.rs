//! Constraint-based roster engine.
//!
//! Pipeline: inputs are resolved into a [`RosterProblem`], the model builder
//! allocates the boolean variables, the constraint compiler and penalty
//! encoder fill in hard rules and objective terms, the search driver finds an
//! assignment, and the extractor turns it into per-day records.

pub mod constraints;
pub mod core;
pub mod extract;
pub mod model;
pub mod penalties;
pub mod search;

pub use self::core::{RosterSolver, ScheduleResult, SolveError};

use chrono::NaiveDate;

use crate::catalog::DutyCategory;
use crate::config::SolverConfig;
use crate::history::HistoryDigest;
use crate::models::Person;

/// A locked cell resolved to roster and work-day indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellLock {
    pub person: usize,
    pub day: usize,
    pub category: DutyCategory,
}

/// Validated solve inputs, indexed by roster position and work-day position.
#[derive(Clone, Debug)]
pub struct RosterProblem {
    pub people: Vec<Person>,
    pub work_days: Vec<NaiveDate>,
    /// Avoidance groups as roster indices, each with at least two members.
    pub groups: Vec<Vec<usize>>,
    pub history: HistoryDigest,
    pub config: SolverConfig,
    locks: Vec<Option<DutyCategory>>,
}

impl RosterProblem {
    pub fn new(
        people: Vec<Person>,
        work_days: Vec<NaiveDate>,
        groups: Vec<Vec<usize>>,
        history: HistoryDigest,
        locks: &[CellLock],
        config: SolverConfig,
    ) -> Self {
        let n_days = work_days.len();
        let mut grid = vec![None; people.len() * n_days];
        // Later entries for the same cell win.
        for lock in locks {
            grid[lock.person * n_days + lock.day] = Some(lock.category);
        }
        Self {
            people,
            work_days,
            groups,
            history,
            config,
            locks: grid,
        }
    }

    pub fn n_people(&self) -> usize {
        self.people.len()
    }

    pub fn n_days(&self) -> usize {
        self.work_days.len()
    }

    /// The person bound to the fixed rotation: first in roster order.
    pub fn anchor(&self) -> usize {
        0
    }

    pub fn is_lead(&self, person: usize) -> bool {
        self.people[person].lead_qualified
    }

    pub fn lead_flags(&self) -> Vec<bool> {
        self.people.iter().map(|p| p.lead_qualified).collect()
    }

    pub fn person_id(&self, person: usize) -> &str {
        &self.people[person].id
    }

    pub fn locked(&self, person: usize, day: usize) -> Option<DutyCategory> {
        self.locks[person * self.n_days() + day]
    }

    pub fn lock_count(&self) -> usize {
        self.locks.iter().filter(|l| l.is_some()).count()
    }

    /// Category the anchor's rotation prescribes for `day`.
    pub fn anchor_category(&self, day: usize) -> DutyCategory {
        if (day + self.history.anchor_phase()) % crate::history::ANCHOR_CYCLE == 0 {
            DutyCategory::Day
        } else {
            DutyCategory::Sleep
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared builders for engine tests.

    use super::*;
    use crate::catalog::{LEAD_COUNT, TEAM_SIZE};

    pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// 17 people; the first six are lead-qualified.
    pub fn make_roster() -> Vec<Person> {
        (0..TEAM_SIZE)
            .map(|i| Person::new(format!("p{:02}", i), format!("Person {}", i), i < LEAD_COUNT))
            .collect()
    }

    /// `n` work days, three calendar days apart.
    pub fn make_days(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| d(2026, 3, 1) + chrono::Days::new(3 * i as u64))
            .collect()
    }

    pub fn test_config() -> SolverConfig {
        SolverConfig {
            time_limit_secs: 20.0,
            max_idle_moves: 300_000,
            workers: 2,
            seed: Some(7),
            ..SolverConfig::default()
        }
    }

    pub fn make_problem(n_days: usize) -> RosterProblem {
        RosterProblem::new(
            make_roster(),
            make_days(n_days),
            Vec::new(),
            HistoryDigest::default(),
            &[],
            test_config(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_anchor_category_follows_phase() {
        let problem = make_problem(6);
        let pattern: Vec<DutyCategory> = (0..6).map(|i| problem.anchor_category(i)).collect();
        assert_eq!(
            pattern,
            vec![
                DutyCategory::Day,
                DutyCategory::Sleep,
                DutyCategory::Sleep,
                DutyCategory::Day,
                DutyCategory::Sleep,
                DutyCategory::Sleep
            ]
        );
    }

    #[test]
    fn test_lock_grid_last_entry_wins() {
        let locks = [
            CellLock {
                person: 3,
                day: 1,
                category: DutyCategory::Day,
            },
            CellLock {
                person: 3,
                day: 1,
                category: DutyCategory::SeniorNight,
            },
        ];
        let problem = RosterProblem::new(
            make_roster(),
            make_days(3),
            Vec::new(),
            HistoryDigest::default(),
            &locks,
            test_config(),
        );
        assert_eq!(problem.locked(3, 1), Some(DutyCategory::SeniorNight));
        assert_eq!(problem.locked(3, 0), None);
        assert_eq!(problem.lock_count(), 1);
    }
}
