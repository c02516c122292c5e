//! Post-hoc validator for solver-produced or manually edited records.
//!
//! Pure verification with the engine's rule vocabulary: nothing here searches
//! or repairs, it only reports findings.

use chrono::NaiveDate;
use pyo3::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

use crate::catalog::{DutyCategory, TEAM_SIZE};
use crate::models::{AvoidanceGroup, DailyRecord, DutyRecord, Person};

/// Population std-dev of senior-night counts above which a month is flagged.
pub const FAIRNESS_STDDEV_LIMIT: f64 = 2.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FindingKind {
    HeadcountMismatch,
    CategoryCountMismatch,
    LeadMissing,
    LeadDuplicate,
    LeadNotQualified,
    AvoidanceConflict,
    DuplicateAssignment,
    FairnessImbalance,
    ConsecutiveSameCategory,
}

impl FindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::HeadcountMismatch => "HEADCOUNT_MISMATCH",
            FindingKind::CategoryCountMismatch => "CATEGORY_COUNT_MISMATCH",
            FindingKind::LeadMissing => "LEAD_MISSING",
            FindingKind::LeadDuplicate => "LEAD_DUPLICATE",
            FindingKind::LeadNotQualified => "LEAD_NOT_QUALIFIED",
            FindingKind::AvoidanceConflict => "AVOIDANCE_CONFLICT",
            FindingKind::DuplicateAssignment => "DUPLICATE_ASSIGNMENT",
            FindingKind::FairnessImbalance => "FAIRNESS_IMBALANCE",
            FindingKind::ConsecutiveSameCategory => "CONSECUTIVE_SAME_CATEGORY",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rule breach found in a day or month of records.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub kind: FindingKind,
    /// Day the finding refers to; month-level findings have none.
    #[pyo3(get)]
    pub day: Option<NaiveDate>,
    #[pyo3(get)]
    pub person_ids: Vec<String>,
    #[pyo3(get)]
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, day: Option<NaiveDate>, person_ids: Vec<String>, message: String) -> Self {
        Self {
            kind,
            day,
            person_ids,
            message,
        }
    }
}

#[pymethods]
impl Finding {
    #[getter(kind)]
    fn py_kind(&self) -> &'static str {
        self.kind.as_str()
    }

    fn __repr__(&self) -> String {
        format!("Finding({}, day={:?}, {:?})", self.kind, self.day, self.message)
    }
}

/// Avoidance groups as id sets: explicit groups merged with per-person group ids.
fn group_sets(roster: &[Person], groups: &[AvoidanceGroup]) -> Vec<FxHashSet<String>> {
    let mut sets: Vec<(String, FxHashSet<String>)> = groups
        .iter()
        .map(|g| (g.id.clone(), g.member_ids.iter().cloned().collect()))
        .collect();
    for person in roster {
        let Some(group) = &person.avoidance_group else {
            continue;
        };
        match sets.iter_mut().find(|(id, _)| id == group) {
            Some((_, members)) => {
                members.insert(person.id.clone());
            }
            None => sets.push((group.clone(), [person.id.clone()].into_iter().collect())),
        }
    }
    sets.into_iter()
        .map(|(_, members)| members)
        .filter(|m| m.len() > 1)
        .collect()
}

/// Check one day's records.
pub fn validate_day(
    day: NaiveDate,
    records: &[DutyRecord],
    roster: &[Person],
    groups: &[AvoidanceGroup],
) -> Vec<Finding> {
    check_day(day, records, roster, &group_sets(roster, groups))
}

fn check_day(
    day: NaiveDate,
    records: &[DutyRecord],
    roster: &[Person],
    groups: &[FxHashSet<String>],
) -> Vec<Finding> {
    let mut findings = Vec::new();
    let leads: FxHashSet<&str> = roster
        .iter()
        .filter(|p| p.lead_qualified)
        .map(|p| p.id.as_str())
        .collect();
    let expected_total = if roster.is_empty() { TEAM_SIZE } else { roster.len() };

    if records.len() != expected_total {
        findings.push(Finding::new(
            FindingKind::HeadcountMismatch,
            Some(day),
            Vec::new(),
            format!("expected {} people, found {}", expected_total, records.len()),
        ));
    }

    for category in DutyCategory::ALL {
        let members: Vec<&DutyRecord> = records.iter().filter(|r| r.category == category).collect();
        let ids = || members.iter().map(|r| r.person_id.clone()).collect::<Vec<_>>();
        if members.len() as i32 != category.headcount() {
            findings.push(Finding::new(
                FindingKind::CategoryCountMismatch,
                Some(day),
                ids(),
                format!(
                    "{} needs {} people, found {}",
                    category,
                    category.headcount(),
                    members.len()
                ),
            ));
        }

        if !category.is_lead_eligible() {
            continue;
        }
        let seated: Vec<&DutyRecord> = members.iter().copied().filter(|r| r.holds_lead_seat()).collect();
        // Records without seats (manual edits) fall back to counting qualified people.
        let unseated = members.iter().all(|r| r.sub_position.is_none());
        let has_lead = if unseated {
            members.iter().any(|r| leads.contains(r.person_id.as_str()))
        } else {
            !seated.is_empty()
        };
        if !has_lead {
            findings.push(Finding::new(
                FindingKind::LeadMissing,
                Some(day),
                ids(),
                format!("{} has no lead-of-record", category),
            ));
        }
        if seated.len() > 1 {
            findings.push(Finding::new(
                FindingKind::LeadDuplicate,
                Some(day),
                seated.iter().map(|r| r.person_id.clone()).collect(),
                format!("{} has {} lead seats filled", category, seated.len()),
            ));
        }
        for record in seated.iter().filter(|r| !leads.contains(r.person_id.as_str())) {
            findings.push(Finding::new(
                FindingKind::LeadNotQualified,
                Some(day),
                vec![record.person_id.clone()],
                format!("{} holds the {} lead seat without qualification", record.person_id, category),
            ));
        }
    }

    for group in groups {
        for category in DutyCategory::ALL {
            let clashing: Vec<String> = records
                .iter()
                .filter(|r| r.category == category && group.contains(&r.person_id))
                .map(|r| r.person_id.clone())
                .collect();
            if clashing.len() > 1 {
                findings.push(Finding::new(
                    FindingKind::AvoidanceConflict,
                    Some(day),
                    clashing.clone(),
                    format!("{} share {}: {}", clashing.len(), category, clashing.join(", ")),
                ));
            }
        }
    }

    let mut seen = FxHashSet::default();
    let mut duplicates: Vec<String> = Vec::new();
    for record in records {
        if !seen.insert(record.person_id.as_str()) && !duplicates.contains(&record.person_id) {
            duplicates.push(record.person_id.clone());
        }
    }
    if !duplicates.is_empty() {
        findings.push(Finding::new(
            FindingKind::DuplicateAssignment,
            Some(day),
            duplicates.clone(),
            format!("assigned more than once: {}", duplicates.join(", ")),
        ));
    }

    findings
}

/// Check a month: every day, then senior-night fairness and consecutive categories.
pub fn validate_month(
    days: &[DailyRecord],
    roster: &[Person],
    groups: &[AvoidanceGroup],
) -> Vec<Finding> {
    let sets = group_sets(roster, groups);
    let mut ordered: Vec<&DailyRecord> = days.iter().collect();
    ordered.sort_by_key(|d| d.day);

    let mut findings: Vec<Finding> = ordered
        .iter()
        .flat_map(|daily| check_day(daily.day, &daily.records, roster, &sets))
        .collect();
    findings.extend(check_fairness(&ordered, roster));
    findings.extend(check_consecutive(&ordered));
    findings
}

fn check_fairness(days: &[&DailyRecord], roster: &[Person]) -> Option<Finding> {
    if roster.is_empty() {
        return None;
    }
    let mut counts: FxHashMap<&str, u32> = roster.iter().map(|p| (p.id.as_str(), 0)).collect();
    for daily in days {
        for record in daily.records.iter().filter(|r| r.category == DutyCategory::SeniorNight) {
            if let Some(count) = counts.get_mut(record.person_id.as_str()) {
                *count += 1;
            }
        }
    }
    let values: Vec<f64> = roster.iter().map(|p| f64::from(counts[p.id.as_str()])).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let stddev = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if stddev <= FAIRNESS_STDDEV_LIMIT {
        return None;
    }

    let max = counts.values().copied().max().unwrap_or(0);
    let min = counts.values().copied().min().unwrap_or(0);
    let extremes: Vec<String> = roster
        .iter()
        .filter(|p| {
            let c = counts[p.id.as_str()];
            c == max || c == min
        })
        .map(|p| p.id.clone())
        .collect();
    Some(Finding::new(
        FindingKind::FairnessImbalance,
        None,
        extremes,
        format!(
            "senior-night counts uneven (stddev {:.2}, max {}, min {})",
            stddev, max, min
        ),
    ))
}

fn check_consecutive(days: &[&DailyRecord]) -> Vec<Finding> {
    let mut findings = Vec::new();
    for pair in days.windows(2) {
        let (today, next) = (pair[0], pair[1]);
        for record in &today.records {
            if let Some(following) = next.record_for(&record.person_id) {
                if following.category == record.category {
                    findings.push(Finding::new(
                        FindingKind::ConsecutiveSameCategory,
                        Some(today.day),
                        vec![record.person_id.clone()],
                        format!(
                            "{} works {} on {} and {}",
                            record.person_id, record.category, today.day, next.day
                        ),
                    ));
                }
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SubPosition;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn make_roster() -> Vec<Person> {
        (0..17)
            .map(|i| Person::new(format!("p{:02}", i), format!("Person {}", i), i < 6))
            .collect()
    }

    /// A valid day: leads 1-3 hold the night lead seats.
    fn valid_day(day: NaiveDate) -> Vec<DutyRecord> {
        use DutyCategory::*;
        use SubPosition::*;
        let layout = [
            (Day, DayRegular),
            (Sleep, SleepLead),
            (ShortNight, ShortNightLead),
            (SeniorNight, SeniorNightLead),
            (Day, DayRegular),
            (Day, DayRegular),
            (Day, DayRegular),
            (Day, DayRegular),
            (Day, DayRegular),
            (Sleep, SleepNorthwest),
            (Sleep, SleepNorthwest),
            (Sleep, SleepSoutheast),
            (Sleep, SleepSoutheast),
            (ShortNight, ShortNightRegular),
            (ShortNight, ShortNightRegular),
            (SeniorNight, SeniorNightRegular),
            (SeniorNight, SeniorNightRegular),
        ];
        layout
            .iter()
            .enumerate()
            .map(|(i, &(c, s))| DutyRecord::new(format!("p{:02}", i), day, c, Some(s)))
            .collect()
    }

    fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
        findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_valid_day_has_no_findings() {
        let day = d(2026, 3, 1);
        assert!(validate_day(day, &valid_day(day), &make_roster(), &[]).is_empty());
    }

    #[test]
    fn test_counts_and_duplicates() {
        let day = d(2026, 3, 1);
        let mut records = valid_day(day);
        records[16].person_id = "p15".to_string();
        records[15].category = DutyCategory::Day;
        let findings = validate_day(day, &records, &make_roster(), &[]);
        let found = kinds(&findings);
        assert!(found.contains(&FindingKind::CategoryCountMismatch));
        assert!(found.contains(&FindingKind::DuplicateAssignment));
        assert!(!found.contains(&FindingKind::HeadcountMismatch));
    }

    #[test]
    fn test_lead_seat_checks() {
        let day = d(2026, 3, 1);
        let roster = make_roster();

        let mut records = valid_day(day);
        records[3].sub_position = Some(SubPosition::SeniorNightRegular);
        assert_eq!(kinds(&validate_day(day, &records, &roster, &[])), vec![FindingKind::LeadMissing]);

        let mut records = valid_day(day);
        records[15].sub_position = Some(SubPosition::SeniorNightLead);
        let found = kinds(&validate_day(day, &records, &roster, &[]));
        assert!(found.contains(&FindingKind::LeadDuplicate));
        assert!(found.contains(&FindingKind::LeadNotQualified));
    }

    #[test]
    fn test_unseated_records_count_qualified_people() {
        let day = d(2026, 3, 1);
        let mut records = valid_day(day);
        for r in records.iter_mut() {
            r.sub_position = None;
        }
        assert!(validate_day(day, &records, &make_roster(), &[]).is_empty());
    }

    #[test]
    fn test_avoidance_conflict() {
        let day = d(2026, 3, 1);
        let groups = vec![AvoidanceGroup::new("g", &["p09", "p10"])];
        let findings = validate_day(day, &valid_day(day), &make_roster(), &groups);
        assert_eq!(kinds(&findings), vec![FindingKind::AvoidanceConflict]);
        assert_eq!(findings[0].person_ids, vec!["p09", "p10"]);

        // Membership through the person's own group id works the same way.
        let roster: Vec<Person> = make_roster()
            .into_iter()
            .map(|p| if p.id == "p13" || p.id == "p14" { p.with_avoidance_group("x") } else { p })
            .collect();
        let findings = validate_day(day, &valid_day(day), &roster, &[]);
        assert_eq!(kinds(&findings), vec![FindingKind::AvoidanceConflict]);
    }

    #[test]
    fn test_month_consecutive_and_fairness() {
        let roster = make_roster();
        let days: Vec<DailyRecord> = (1..=3)
            .map(|i| DailyRecord::new(d(2026, 3, i), valid_day(d(2026, 3, i))))
            .collect();
        let findings = validate_month(&days, &roster, &[]);
        // Every person repeats their category on both transitions.
        let consecutive = findings
            .iter()
            .filter(|f| f.kind == FindingKind::ConsecutiveSameCategory)
            .count();
        assert_eq!(consecutive, 17 * 2);
        assert!(!kinds(&findings).contains(&FindingKind::FairnessImbalance));

        // Twelve days with the same three senior-night people: stddev > 2.
        let days: Vec<DailyRecord> = (1..=12)
            .map(|i| DailyRecord::new(d(2026, 3, i), valid_day(d(2026, 3, i))))
            .collect();
        let findings = validate_month(&days, &roster, &[]);
        let fairness: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.kind == FindingKind::FairnessImbalance)
            .collect();
        assert_eq!(fairness.len(), 1);
        assert!(fairness[0].day.is_none());
        assert_eq!(fairness[0].person_ids.len(), 17);
    }
}
