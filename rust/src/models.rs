//! Core data types exchanged with the roster engine.

use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::catalog::{DutyCategory, SubPosition};

// Note: categories are stored typed and exposed to Python as wire names

/// A team member.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Person {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub name: String,
    /// Whether this person may hold a lead seat.
    #[pyo3(get, set)]
    pub lead_qualified: bool,
    /// Optional avoidance-group membership.
    #[pyo3(get, set)]
    pub avoidance_group: Option<String>,
}

#[pymethods]
impl Person {
    #[new]
    #[pyo3(signature = (id, name, lead_qualified=false, avoidance_group=None))]
    fn py_new(
        id: String,
        name: String,
        lead_qualified: bool,
        avoidance_group: Option<String>,
    ) -> Self {
        Self {
            id,
            name,
            lead_qualified,
            avoidance_group,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Person(id={:?}, name={:?}, lead_qualified={}, avoidance_group={:?})",
            self.id, self.name, self.lead_qualified, self.avoidance_group
        )
    }
}

impl Person {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lead_qualified: bool) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lead_qualified,
            avoidance_group: None,
        }
    }

    pub fn with_avoidance_group(mut self, group: impl Into<String>) -> Self {
        self.avoidance_group = Some(group.into());
        self
    }
}

/// People who must never share a category on the same day.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AvoidanceGroup {
    #[pyo3(get, set)]
    pub id: String,
    #[pyo3(get, set)]
    pub member_ids: Vec<String>,
}

#[pymethods]
impl AvoidanceGroup {
    #[new]
    #[pyo3(signature = (id, member_ids=Vec::new()))]
    fn py_new(id: String, member_ids: Vec<String>) -> Self {
        Self { id, member_ids }
    }

    fn __repr__(&self) -> String {
        format!(
            "AvoidanceGroup(id={:?}, members={})",
            self.id,
            self.member_ids.len()
        )
    }
}

impl AvoidanceGroup {
    pub fn new(id: impl Into<String>, member_ids: &[&str]) -> Self {
        Self {
            id: id.into(),
            member_ids: member_ids.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// A caller-pinned (person, day) cell.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedCell {
    #[pyo3(get, set)]
    pub person_id: String,
    #[pyo3(get, set)]
    pub day: NaiveDate,
    pub category: DutyCategory,
}

#[pymethods]
impl LockedCell {
    #[new]
    fn py_new(person_id: String, day: NaiveDate, category: &str) -> PyResult<Self> {
        let category = category
            .parse::<DutyCategory>()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self {
            person_id,
            day,
            category,
        })
    }

    #[getter(category)]
    fn py_category(&self) -> &'static str {
        self.category.as_str()
    }

    fn __repr__(&self) -> String {
        format!(
            "LockedCell(person_id={:?}, day={}, category={})",
            self.person_id, self.day, self.category
        )
    }
}

impl LockedCell {
    pub fn new(person_id: impl Into<String>, day: NaiveDate, category: DutyCategory) -> Self {
        Self {
            person_id: person_id.into(),
            day,
            category,
        }
    }
}

/// One person's duty on one work day.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DutyRecord {
    #[pyo3(get, set)]
    pub person_id: String,
    #[pyo3(get, set)]
    pub day: NaiveDate,
    pub category: DutyCategory,
    /// Seat within the category; manually edited records may omit it.
    pub sub_position: Option<SubPosition>,
}

#[pymethods]
impl DutyRecord {
    #[new]
    #[pyo3(signature = (person_id, day, category, sub_position=None))]
    fn py_new(
        person_id: String,
        day: NaiveDate,
        category: &str,
        sub_position: Option<String>,
    ) -> PyResult<Self> {
        let category = category
            .parse::<DutyCategory>()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let sub_position = sub_position
            .as_deref()
            .map(str::parse::<SubPosition>)
            .transpose()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(Self {
            person_id,
            day,
            category,
            sub_position,
        })
    }

    #[getter(category)]
    fn py_category(&self) -> &'static str {
        self.category.as_str()
    }

    #[getter(sub_position)]
    fn py_sub_position(&self) -> Option<&'static str> {
        self.sub_position.map(|s| s.as_str())
    }

    fn __repr__(&self) -> String {
        format!(
            "DutyRecord(person_id={:?}, day={}, category={}, sub_position={:?})",
            self.person_id,
            self.day,
            self.category,
            self.sub_position.map(|s| s.as_str())
        )
    }
}

impl DutyRecord {
    pub fn new(
        person_id: impl Into<String>,
        day: NaiveDate,
        category: DutyCategory,
        sub_position: Option<SubPosition>,
    ) -> Self {
        Self {
            person_id: person_id.into(),
            day,
            category,
            sub_position,
        }
    }

    /// True when the record occupies its category's lead seat.
    pub fn holds_lead_seat(&self) -> bool {
        self.sub_position.is_some_and(|s| s.is_lead_seat())
    }
}

/// All records of one work day.
#[pyclass]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DailyRecord {
    #[pyo3(get, set)]
    pub day: NaiveDate,
    #[pyo3(get, set)]
    pub records: Vec<DutyRecord>,
}

#[pymethods]
impl DailyRecord {
    #[new]
    #[pyo3(signature = (day, records=Vec::new()))]
    fn py_new(day: NaiveDate, records: Vec<DutyRecord>) -> Self {
        Self { day, records }
    }

    fn __repr__(&self) -> String {
        format!("DailyRecord(day={}, records={})", self.day, self.records.len())
    }
}

impl DailyRecord {
    pub fn new(day: NaiveDate, records: Vec<DutyRecord>) -> Self {
        Self { day, records }
    }

    /// The record for `person_id`, if present.
    pub fn record_for(&self, person_id: &str) -> Option<&DutyRecord> {
        self.records.iter().find(|r| r.person_id == person_id)
    }

    /// Number of records in `category`.
    pub fn count(&self, category: DutyCategory) -> usize {
        self.records
            .iter()
            .filter(|r| r.category == category)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_daily_record_lookup() {
        let day = d(2026, 3, 2);
        let daily = DailyRecord::new(
            day,
            vec![
                DutyRecord::new("a", day, DutyCategory::Sleep, Some(SubPosition::SleepLead)),
                DutyRecord::new("b", day, DutyCategory::Day, Some(SubPosition::DayRegular)),
                DutyRecord::new("c", day, DutyCategory::Day, None),
            ],
        );
        assert_eq!(daily.count(DutyCategory::Day), 2);
        assert!(daily.record_for("a").unwrap().holds_lead_seat());
        assert!(!daily.record_for("c").unwrap().holds_lead_seat());
        assert!(daily.record_for("z").is_none());
    }

    #[test]
    fn test_person_builder() {
        let p = Person::new("7", "Seven", true).with_avoidance_group("g1");
        assert!(p.lead_qualified);
        assert_eq!(p.avoidance_group.as_deref(), Some("g1"));
    }
}
