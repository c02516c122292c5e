//! Penalty encoder: soft rules as weighted objective terms.
//!
//! Three tiers, each at least ten times the next:
//! - adjacency (`adjacent_weight`): same category on consecutive work days,
//!   including the step from the last prior-month day into the month;
//! - spacing (`gap_weight`): senior-night and day-duty gaps beyond target,
//!   plus every back-to-back day-duty pair of a lead;
//! - fairness (`fairness_weight`): max - min two-month count per cohort and
//!   category.
//!
//! A random tie-break below the fairness tier is re-rolled on every call.

use rand::Rng;

use crate::catalog::DutyCategory;
use crate::log_debug;

use super::constraints::CompiledRules;
use super::model::{Lit, RosterModel, SpreadMember, VarId};
use super::RosterProblem;

/// Add every soft term for `problem` to the model's objective.
pub fn encode<R: Rng>(
    problem: &RosterProblem,
    model: &mut RosterModel,
    rules: &CompiledRules,
    rng: &mut R,
) {
    let before = model.indicators.len();
    adjacency(problem, model, rules);
    senior_night_gaps(problem, model);
    day_gaps(problem, model);
    fairness(problem, model);
    tie_break(problem, model, rng);
    log_debug!(
        problem.config.verbosity,
        "Encoded {} penalty indicators, {} spread terms, {} objective terms",
        model.indicators.len() - before,
        model.spreads.len(),
        model.objective.len()
    );
}

fn adjacency(problem: &RosterProblem, model: &mut RosterModel, rules: &CompiledRules) {
    let weight = problem.config.adjacent_weight;
    let gap_weight = problem.config.gap_weight;
    let n_days = problem.n_days();

    for person in 0..problem.n_people() {
        for day in 0..n_days.saturating_sub(1) {
            let (here, next) = (model.pinned(person, day), model.pinned(person, day + 1));
            for category in DutyCategory::ALL {
                if let (Some(a), Some(b)) = (here, next) {
                    // Both ends fixed: the penalty is a constant.
                    if a == category && b == category {
                        model.objective_constant += weight;
                    }
                    continue;
                }
                let pair = match rules.lead_day_pairs.get(&(person, day)) {
                    Some(&pair) if category == DutyCategory::Day => {
                        model.add_objective(pair, gap_weight);
                        pair
                    }
                    _ => {
                        let lits = vec![
                            Lit::pos(model.assign(person, day, category)),
                            Lit::pos(model.assign(person, day + 1, category)),
                        ];
                        model.new_indicator(lits)
                    }
                };
                model.add_objective(pair, weight);
            }
        }

        if n_days > 0 {
            if let Some(last) = problem.history.last_category(problem.person_id(person)) {
                let first = model.assign(person, 0, last);
                model.add_objective(first, weight);
            }
        }
    }
}

fn senior_night_gaps(problem: &RosterProblem, model: &mut RosterModel) {
    let weight = problem.config.gap_weight;
    let n_days = problem.n_days();

    for person in (0..problem.n_people()).filter(|&p| p != problem.anchor()) {
        let max_gap = problem.config.senior_night_max_gap(problem.is_lead(person));

        // A duty on `day` with none in the following max_gap + 1 work days.
        for day in 0..n_days {
            let end = day + max_gap + 1;
            if end >= n_days {
                break;
            }
            let mut lits = vec![Lit::pos(model.assign(person, day, DutyCategory::SeniorNight))];
            lits.extend(
                (day + 1..=end).map(|d| Lit::neg(model.assign(person, d, DutyCategory::SeniorNight))),
            );
            let gap = model.new_indicator(lits);
            model.add_objective(gap, weight);
        }

        // Leading gap, measured from the last prior-month duty.
        let id = problem.person_id(person);
        if let Some(trailing) = problem
            .history
            .person(id)
            .and_then(|h| h.senior_night_trailing)
        {
            if trailing <= max_gap && max_gap - trailing < n_days {
                let lits = (0..=max_gap - trailing)
                    .map(|d| Lit::neg(model.assign(person, d, DutyCategory::SeniorNight)))
                    .collect();
                let gap = model.new_indicator(lits);
                model.add_objective(gap, weight);
            }
        }
    }
}

fn day_gaps(problem: &RosterProblem, model: &mut RosterModel) {
    let weight = problem.config.gap_weight;
    let window = problem.config.day_max_gap + 1;
    let n_days = problem.n_days();
    if n_days < window {
        return;
    }
    for person in (0..problem.n_people()).filter(|&p| p != problem.anchor()) {
        for start in 0..=n_days - window {
            let lits = (start..start + window)
                .map(|d| Lit::neg(model.assign(person, d, DutyCategory::Day)))
                .collect();
            let gap = model.new_indicator(lits);
            model.add_objective(gap, weight);
        }
    }
}

fn fairness(problem: &RosterProblem, model: &mut RosterModel) {
    let anchor = problem.anchor();
    let leads: Vec<usize> = (0..problem.n_people())
        .filter(|&p| p != anchor && problem.is_lead(p))
        .collect();
    let staff: Vec<usize> = (0..problem.n_people())
        .filter(|&p| p != anchor && !problem.is_lead(p))
        .collect();

    for (label, cohort) in [("leads", &leads), ("staff", &staff)] {
        for category in DutyCategory::ALL {
            let members = cohort
                .iter()
                .map(|&person| SpreadMember {
                    vars: (0..problem.n_days())
                        .map(|d| model.assign(person, d, category))
                        .collect(),
                    offset: problem
                        .history
                        .prior_counts(problem.person_id(person))
                        .get(category) as i32,
                })
                .collect();
            model.add_spread(
                format!("{}/{}", label, category),
                members,
                problem.config.fairness_weight,
            );
        }
    }
}

fn tie_break<R: Rng>(problem: &RosterProblem, model: &mut RosterModel, rng: &mut R) {
    let max = problem.config.tie_break_max;
    if max <= 0 {
        return;
    }
    for person in 0..problem.n_people() {
        for day in 0..problem.n_days() {
            if model.pinned(person, day).is_some() {
                continue;
            }
            for category in DutyCategory::ALL {
                let var: VarId = model.assign(person, day, category);
                model.add_objective(var, rng.gen_range(0..=max));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::constraints::compile;
    use crate::engine::fixtures::*;
    use crate::engine::model::VarKind;
    use crate::history::HistoryDigest;
    use crate::models::{DailyRecord, DutyRecord};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn encoded(problem: &RosterProblem) -> RosterModel {
        let mut model = RosterModel::new(problem.n_people(), problem.n_days(), &problem.lead_flags());
        let rules = compile(problem, &mut model);
        let mut rng = StdRng::seed_from_u64(1);
        encode(problem, &mut model, &rules, &mut rng);
        model
    }

    #[test]
    fn test_anchor_sleep_pairs_are_constant() {
        let problem = make_problem(6);
        let model = encoded(&problem);
        // Anchor: D S S D S S -> two fixed sleep/sleep adjacencies.
        assert_eq!(model.objective_constant, 2 * problem.config.adjacent_weight);
    }

    #[test]
    fn test_lead_day_pairs_are_reused() {
        let mut problem = make_problem(4);
        problem.config.tie_break_max = 0;
        let model = encoded(&problem);
        let pair_weights: Vec<i64> = model
            .objective
            .iter()
            .filter(|(var, _)| {
                matches!(model.kind(*var), VarKind::Indicator { .. })
                    && model.origin(*var) == Some((1, 0))
            })
            .map(|&(_, w)| w)
            .collect();
        // Lead p01 from day 0: the Day pair carries gap + adjacency weight,
        // the other three categories adjacency only, plus one day-gap window.
        let total: i64 = pair_weights.iter().sum();
        let config = &problem.config;
        assert_eq!(total, 2 * config.gap_weight + 4 * config.adjacent_weight);
    }

    #[test]
    fn test_cohorts_exclude_anchor() {
        let problem = make_problem(5);
        let model = encoded(&problem);
        assert_eq!(model.spreads.len(), 8);
        let leads = model.spreads.iter().find(|s| s.label == "leads/DAY").unwrap();
        assert_eq!(leads.members.len(), 5);
        let staff = model.spreads.iter().find(|s| s.label == "staff/LATE_NIGHT").unwrap();
        assert_eq!(staff.members.len(), 11);
    }

    #[test]
    fn test_prior_counts_offset_fairness() {
        let day = d(2026, 2, 27);
        let prior = vec![DailyRecord::new(
            day,
            vec![DutyRecord::new("p08", day, DutyCategory::Sleep, None)],
        )];
        let mut problem = make_problem(5);
        problem.history = HistoryDigest::build(&prior, Some("p00"));
        let model = encoded(&problem);
        let staff = model.spreads.iter().find(|s| s.label == "staff/SLEEP").unwrap();
        let offsets: Vec<i32> = staff.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets.iter().sum::<i32>(), 1);
        assert_eq!(offsets[2], 1);
    }

    #[test]
    fn test_cross_month_adjacency() {
        let day = d(2026, 2, 27);
        let prior = vec![DailyRecord::new(
            day,
            vec![DutyRecord::new("p10", day, DutyCategory::ShortNight, None)],
        )];
        let mut problem = make_problem(3);
        problem.config.tie_break_max = 0;
        problem.history = HistoryDigest::build(&prior, Some("p00"));
        let model = encoded(&problem);
        let target = model.assign(10, 0, DutyCategory::ShortNight);
        assert!(model
            .objective
            .contains(&(target, problem.config.adjacent_weight)));
    }
}
