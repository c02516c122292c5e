//! Prior-month digest used to seed continuity rules.
//!
//! The digest is computed once per solve from the caller-supplied records of
//! the preceding work days. It is never re-optimized: it only provides
//! carry-in distances, prior counts for the two-month fairness window and the
//! anchor's rotation phase.

use chrono::NaiveDate;
use pyo3::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

use crate::catalog::{CategoryCounts, DutyCategory, NIGHT_WINDOW_DAYS};
use crate::models::DailyRecord;

/// Length of the anchor's rotation: one day duty, then two sleep duties.
pub const ANCHOR_CYCLE: usize = 3;

/// What the prior month says about one person.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonHistory {
    pub last_senior_night: Option<NaiveDate>,
    /// Prior work days that followed the last senior-night duty.
    pub senior_night_trailing: Option<usize>,
    pub last_day_duty: Option<NaiveDate>,
    /// Prior work days that followed the last day duty.
    pub day_duty_trailing: Option<usize>,
    pub counts: CategoryCounts,
    /// Category worked on the final prior work day, if the person was rostered.
    pub last_category: Option<DutyCategory>,
    /// Night duty on the prior work day `i` days before the last one.
    pub recent_nights: [bool; NIGHT_WINDOW_DAYS - 1],
}

/// Immutable summary of the prior month.
#[pyclass]
#[derive(Clone, Debug, Default)]
pub struct HistoryDigest {
    people: FxHashMap<String, PersonHistory>,
    prior_day_count: usize,
    anchor_phase: usize,
}

impl HistoryDigest {
    /// Build the digest from prior daily records (any order).
    pub fn build(prior_days: &[DailyRecord], anchor_id: Option<&str>) -> Self {
        let mut days: Vec<&DailyRecord> = prior_days.iter().collect();
        days.sort_by_key(|d| d.day);

        let last_index = days.len().saturating_sub(1);
        let mut people: FxHashMap<String, PersonHistory> = FxHashMap::default();
        let mut anchor_tail: Vec<DutyCategory> = Vec::new();

        for (position, daily) in days.iter().enumerate() {
            let trailing = last_index - position;
            for record in &daily.records {
                let entry = people.entry(record.person_id.clone()).or_default();
                entry.counts.increment(record.category);
                match record.category {
                    DutyCategory::SeniorNight => {
                        entry.last_senior_night = Some(daily.day);
                        entry.senior_night_trailing = Some(trailing);
                    }
                    DutyCategory::Day => {
                        entry.last_day_duty = Some(daily.day);
                        entry.day_duty_trailing = Some(trailing);
                    }
                    _ => {}
                }
                if position == last_index {
                    entry.last_category = Some(record.category);
                }
                if trailing < NIGHT_WINDOW_DAYS - 1 && record.category.is_night() {
                    entry.recent_nights[trailing] = true;
                }
                if anchor_id == Some(record.person_id.as_str()) {
                    anchor_tail.push(record.category);
                }
            }
        }

        Self {
            people,
            prior_day_count: days.len(),
            anchor_phase: replay_anchor_phase(&anchor_tail),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prior_day_count == 0
    }

    pub fn prior_day_count(&self) -> usize {
        self.prior_day_count
    }

    /// Offset into the day/sleep/sleep cycle for the first new work day.
    pub fn anchor_phase(&self) -> usize {
        self.anchor_phase
    }

    pub fn person(&self, person_id: &str) -> Option<&PersonHistory> {
        self.people.get(person_id)
    }

    pub fn prior_counts(&self, person_id: &str) -> CategoryCounts {
        self.person(person_id)
            .map(|h| h.counts)
            .unwrap_or_default()
    }

    /// Work-day distance from the last prior senior-night duty to new day `day_index`.
    pub fn senior_night_distance(&self, person_id: &str, day_index: usize) -> Option<usize> {
        self.person(person_id)
            .and_then(|h| h.senior_night_trailing)
            .map(|trailing| trailing + day_index + 1)
    }

    /// Work-day distance from the last prior day duty to new day `day_index`.
    pub fn day_duty_distance(&self, person_id: &str, day_index: usize) -> Option<usize> {
        self.person(person_id)
            .and_then(|h| h.day_duty_trailing)
            .map(|trailing| trailing + day_index + 1)
    }

    pub fn last_category(&self, person_id: &str) -> Option<DutyCategory> {
        self.person(person_id).and_then(|h| h.last_category)
    }

    /// Night duties among the last `days` prior work days.
    pub fn trailing_nights(&self, person_id: &str, days: usize) -> usize {
        self.person(person_id).map_or(0, |h| {
            h.recent_nights
                .iter()
                .take(days)
                .filter(|&&night| night)
                .count()
        })
    }
}

/// Replay the anchor's trailing categories to find where the cycle resumes.
///
/// Phase 0 is the day duty, phases 1 and 2 the two sleep duties. The tail
/// after the last day duty tells how far into the cycle the anchor already is.
fn replay_anchor_phase(tail: &[DutyCategory]) -> usize {
    if tail.is_empty() {
        return 0;
    }
    let since_day = match tail.iter().rposition(|&c| c == DutyCategory::Day) {
        Some(index) => tail.len() - 1 - index,
        None => tail.len(),
    };
    (since_day + 1) % ANCHOR_CYCLE
}

#[pymethods]
impl HistoryDigest {
    #[getter(anchor_phase)]
    fn py_anchor_phase(&self) -> usize {
        self.anchor_phase
    }

    #[getter(prior_day_count)]
    fn py_prior_day_count(&self) -> usize {
        self.prior_day_count
    }

    #[pyo3(name = "last_senior_night")]
    fn py_last_senior_night(&self, person_id: &str) -> Option<NaiveDate> {
        self.person(person_id).and_then(|h| h.last_senior_night)
    }

    #[pyo3(name = "last_day_duty")]
    fn py_last_day_duty(&self, person_id: &str) -> Option<NaiveDate> {
        self.person(person_id).and_then(|h| h.last_day_duty)
    }

    #[pyo3(name = "prior_counts")]
    fn py_prior_counts(&self, person_id: &str) -> HashMap<String, u32> {
        let counts = self.prior_counts(person_id);
        DutyCategory::ALL
            .iter()
            .map(|&c| (c.as_str().to_string(), counts.get(c)))
            .collect()
    }

    fn __repr__(&self) -> String {
        format!(
            "HistoryDigest(prior_days={}, people={}, anchor_phase={})",
            self.prior_day_count,
            self.people.len(),
            self.anchor_phase
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DutyRecord;
    use crate::catalog::DutyCategory::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn day_of(day: NaiveDate, entries: &[(&str, DutyCategory)]) -> DailyRecord {
        DailyRecord::new(
            day,
            entries
                .iter()
                .map(|(id, c)| DutyRecord::new(*id, day, *c, None))
                .collect(),
        )
    }

    #[test]
    fn test_anchor_phase_replay() {
        assert_eq!(replay_anchor_phase(&[]), 0);
        assert_eq!(replay_anchor_phase(&[Sleep, Sleep, Day]), 1);
        assert_eq!(replay_anchor_phase(&[Sleep, Day, Sleep]), 2);
        assert_eq!(replay_anchor_phase(&[Day, Sleep, Sleep]), 0);
        assert_eq!(replay_anchor_phase(&[Sleep]), 2);
        assert_eq!(replay_anchor_phase(&[Sleep, Sleep]), 0);
    }

    #[test]
    fn test_digest_tracks_last_duties() {
        // Supplied out of order on purpose.
        let prior = vec![
            day_of(d(2026, 2, 27), &[("a", Day), ("b", SeniorNight)]),
            day_of(d(2026, 2, 21), &[("a", SeniorNight), ("b", Day)]),
            day_of(d(2026, 2, 24), &[("a", Sleep), ("b", Sleep)]),
        ];
        let digest = HistoryDigest::build(&prior, Some("a"));

        assert_eq!(digest.prior_day_count(), 3);
        let a = digest.person("a").unwrap();
        assert_eq!(a.last_senior_night, Some(d(2026, 2, 21)));
        assert_eq!(a.senior_night_trailing, Some(2));
        assert_eq!(a.last_day_duty, Some(d(2026, 2, 27)));
        assert_eq!(a.last_category, Some(Day));
        assert_eq!(a.counts, CategoryCounts([1, 1, 0, 1]));
        assert_eq!(a.recent_nights, [false, true, true]);
        assert_eq!(digest.trailing_nights("a", 1), 0);
        assert_eq!(digest.trailing_nights("a", 3), 2);
        assert_eq!(digest.trailing_nights("b", 1), 1);
        assert_eq!(digest.trailing_nights("zz", 3), 0);

        assert_eq!(digest.senior_night_distance("b", 0), Some(1));
        assert_eq!(digest.senior_night_distance("a", 1), Some(4));
        assert_eq!(digest.senior_night_distance("zz", 0), None);
        assert_eq!(digest.day_duty_distance("a", 0), Some(1));

        // Anchor tail: SeniorNight, Sleep, Day -> first new day is sleep #1.
        assert_eq!(digest.anchor_phase(), 1);
    }

    #[test]
    fn test_empty_history() {
        let digest = HistoryDigest::build(&[], Some("a"));
        assert!(digest.is_empty());
        assert_eq!(digest.anchor_phase(), 0);
        assert_eq!(digest.prior_counts("a"), CategoryCounts::default());
    }
}
