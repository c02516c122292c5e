//! Statistics aggregator: per-person counts and per-category distributions.

use pyo3::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::HashMap;

use crate::catalog::{CategoryCounts, DutyCategory};
use crate::history::HistoryDigest;
use crate::models::{DailyRecord, Person};

/// Summary of one category's counts across the roster.
#[pyclass]
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryDistribution {
    #[pyo3(get)]
    pub min: u32,
    #[pyo3(get)]
    pub max: u32,
    /// Mean, rounded to two decimals
    #[pyo3(get)]
    pub mean: f64,
    /// Sample standard deviation, rounded to two decimals (0 for fewer than two people)
    #[pyo3(get)]
    pub stddev: f64,
    #[pyo3(get)]
    pub spread: u32,
}

impl CategoryDistribution {
    pub fn from_counts(counts: &[u32]) -> Self {
        let (Some(&min), Some(&max)) = (counts.iter().min(), counts.iter().max()) else {
            return Self {
                min: 0,
                max: 0,
                mean: 0.0,
                stddev: 0.0,
                spread: 0,
            };
        };
        let n = counts.len() as f64;
        let mean = counts.iter().map(|&c| f64::from(c)).sum::<f64>() / n;
        let stddev = if counts.len() > 1 {
            let variance = counts
                .iter()
                .map(|&c| (f64::from(c) - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };
        Self {
            min,
            max,
            mean: round2(mean),
            stddev: round2(stddev),
            spread: max - min,
        }
    }
}

#[pymethods]
impl CategoryDistribution {
    fn __repr__(&self) -> String {
        format!(
            "CategoryDistribution(min={}, max={}, mean={}, stddev={}, spread={})",
            self.min, self.max, self.mean, self.stddev, self.spread
        )
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fairness statistics for one produced month.
#[pyclass]
#[derive(Clone, Debug)]
pub struct ScheduleStatistics {
    pub person_ids: Vec<String>,
    pub current: Vec<CategoryCounts>,
    pub two_month: Vec<CategoryCounts>,
    pub current_distribution: Vec<CategoryDistribution>,
    pub two_month_distribution: Vec<CategoryDistribution>,
    /// Sum of two-month spreads across categories; lower is fairer.
    #[pyo3(get)]
    pub fairness_score: u32,
    #[pyo3(get)]
    pub has_prior_history: bool,
    #[pyo3(get)]
    pub total_work_days: usize,
}

impl ScheduleStatistics {
    pub fn compute(roster: &[Person], schedule: &[DailyRecord], history: &HistoryDigest) -> Self {
        let position: FxHashMap<&str, usize> = roster
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.as_str(), i))
            .collect();

        let mut current = vec![CategoryCounts::default(); roster.len()];
        for daily in schedule {
            for record in &daily.records {
                if let Some(&i) = position.get(record.person_id.as_str()) {
                    current[i].increment(record.category);
                }
            }
        }
        let two_month: Vec<CategoryCounts> = roster
            .iter()
            .zip(&current)
            .map(|(person, &counts)| counts + history.prior_counts(&person.id))
            .collect();

        let distribution = |counts: &[CategoryCounts]| -> Vec<CategoryDistribution> {
            DutyCategory::ALL
                .iter()
                .map(|&category| {
                    let values: Vec<u32> = counts.iter().map(|c| c.get(category)).collect();
                    CategoryDistribution::from_counts(&values)
                })
                .collect()
        };
        let current_distribution = distribution(&current);
        let two_month_distribution = distribution(&two_month);
        let fairness_score = two_month_distribution.iter().map(|d| d.spread).sum();

        Self {
            person_ids: roster.iter().map(|p| p.id.clone()).collect(),
            current,
            two_month,
            current_distribution,
            two_month_distribution,
            fairness_score,
            has_prior_history: !history.is_empty(),
            total_work_days: schedule.len(),
        }
    }

    pub fn distribution(&self, category: DutyCategory) -> &CategoryDistribution {
        &self.current_distribution[category.index()]
    }

    pub fn two_month_distribution(&self, category: DutyCategory) -> &CategoryDistribution {
        &self.two_month_distribution[category.index()]
    }
}

fn counts_by_person(ids: &[String], counts: &[CategoryCounts]) -> HashMap<String, HashMap<String, u32>> {
    ids.iter()
        .zip(counts)
        .map(|(id, c)| {
            let per_category = DutyCategory::ALL
                .iter()
                .map(|&category| (category.as_str().to_string(), c.get(category)))
                .collect();
            (id.clone(), per_category)
        })
        .collect()
}

fn by_category(distributions: &[CategoryDistribution]) -> HashMap<String, CategoryDistribution> {
    DutyCategory::ALL
        .iter()
        .zip(distributions)
        .map(|(c, d)| (c.as_str().to_string(), d.clone()))
        .collect()
}

#[pymethods]
impl ScheduleStatistics {
    #[getter(person_counts)]
    fn py_person_counts(&self) -> HashMap<String, HashMap<String, u32>> {
        counts_by_person(&self.person_ids, &self.current)
    }

    #[getter(two_month_counts)]
    fn py_two_month_counts(&self) -> HashMap<String, HashMap<String, u32>> {
        counts_by_person(&self.person_ids, &self.two_month)
    }

    #[getter(distributions)]
    fn py_distributions(&self) -> HashMap<String, CategoryDistribution> {
        by_category(&self.current_distribution)
    }

    #[getter(two_month_distributions)]
    fn py_two_month_distributions(&self) -> HashMap<String, CategoryDistribution> {
        by_category(&self.two_month_distribution)
    }

    fn __repr__(&self) -> String {
        format!(
            "ScheduleStatistics(people={}, days={}, fairness_score={}, has_prior_history={})",
            self.person_ids.len(),
            self.total_work_days,
            self.fairness_score,
            self.has_prior_history
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DutyRecord;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_distribution_sample_stddev() {
        let dist = CategoryDistribution::from_counts(&[2, 4, 4, 4, 5, 5, 7, 9]);
        assert_eq!(dist.min, 2);
        assert_eq!(dist.max, 9);
        assert_eq!(dist.spread, 7);
        assert!((dist.mean - 5.0).abs() < 1e-9);
        // sample variance 32 / 7
        assert!((dist.stddev - 2.14).abs() < 1e-9);
    }

    #[test]
    fn test_distribution_single_value() {
        let dist = CategoryDistribution::from_counts(&[3]);
        assert_eq!(dist.stddev, 0.0);
        assert_eq!(dist.spread, 0);
        assert_eq!(CategoryDistribution::from_counts(&[]).max, 0);
    }

    #[test]
    fn test_two_month_counts_and_fairness() {
        let roster = vec![Person::new("a", "A", true), Person::new("b", "B", false)];
        let prior_day = d(2026, 2, 27);
        let prior = vec![DailyRecord::new(
            prior_day,
            vec![
                DutyRecord::new("a", prior_day, DutyCategory::SeniorNight, None),
                DutyRecord::new("b", prior_day, DutyCategory::Day, None),
            ],
        )];
        let history = HistoryDigest::build(&prior, Some("a"));

        let day = d(2026, 3, 2);
        let schedule = vec![DailyRecord::new(
            day,
            vec![
                DutyRecord::new("a", day, DutyCategory::SeniorNight, None),
                DutyRecord::new("b", day, DutyCategory::Day, None),
            ],
        )];
        let stats = ScheduleStatistics::compute(&roster, &schedule, &history);

        assert!(stats.has_prior_history);
        assert_eq!(stats.current[0].get(DutyCategory::SeniorNight), 1);
        assert_eq!(stats.two_month[0].get(DutyCategory::SeniorNight), 2);
        assert_eq!(stats.distribution(DutyCategory::Day).spread, 1);
        // Two-month spreads: day 2, senior night 2, others 0.
        assert_eq!(stats.two_month_distribution(DutyCategory::Day).spread, 2);
        assert_eq!(stats.fairness_score, 4);
    }
}
