//! Constraint compiler: emits every hard rule into the model.
//!
//! Rules, in emission order:
//! 1. exactly one category per person and day;
//! 2. fixed headcount per category and day;
//! 3. one lead-of-record per lead-eligible category and day, flag implies
//!    assignment, at most one flag per person and day;
//! 4. lead headcount between 1 and the configured maximum;
//! 5. avoidance groups never share a category on a day;
//! 6. anchor rotation (day, sleep, sleep) from the replayed phase;
//! 7. at most three night duties in any four consecutive work days, counting
//!    the prior month's last work days;
//! 8. senior-night minimum spacing, including prior-month carry-in;
//! 9. day-duty spacing: hard for staff, run limit and pair cap for leads;
//! 10. locked cells.
//!
//! A locked cell takes precedence over any upper-bound rule: when the locked
//! cells alone already exceed a bound, the bound is raised to the locked
//! count so the remaining cells of that instance stay constrained.

use rustc_hash::FxHashMap;

use crate::catalog::{DutyCategory, NIGHT_WINDOW_DAYS, NIGHT_WINDOW_MAX};
use crate::{log_debug, log_progress};

use super::model::{ConstraintKind, Lit, RosterModel, VarId, VarKind};
use super::RosterProblem;

/// What the compiler hands on to the penalty encoder.
#[derive(Debug, Default)]
pub struct CompiledRules {
    /// Back-to-back day-duty indicators of leads, keyed by (person, first day).
    pub lead_day_pairs: FxHashMap<(usize, usize), VarId>,
    /// Rule instances whose bound was raised to honor locked cells.
    pub relaxed: usize,
}

struct Compiler<'a> {
    problem: &'a RosterProblem,
    model: &'a mut RosterModel,
    rules: CompiledRules,
}

/// Emit all hard rules for `problem` into `model`.
pub fn compile(problem: &RosterProblem, model: &mut RosterModel) -> CompiledRules {
    let mut compiler = Compiler {
        problem,
        model,
        rules: CompiledRules::default(),
    };
    compiler.single_category();
    compiler.headcounts();
    compiler.lead_of_record();
    compiler.lead_headcounts();
    compiler.avoidance();
    compiler.anchor_rotation();
    compiler.night_load();
    compiler.senior_night_spacing();
    compiler.day_spacing();
    compiler.locked_cells();

    let verbosity = problem.config.verbosity;
    log_debug!(
        verbosity,
        "Compiled {} hard constraints ({} relaxed for locks)",
        compiler.model.constraints.len(),
        compiler.rules.relaxed
    );
    compiler.rules
}

impl<'a> Compiler<'a> {
    fn n_days(&self) -> usize {
        self.problem.n_days()
    }

    fn day_var(&self, person: usize, day: usize) -> VarId {
        self.model.assign(person, day, DutyCategory::Day)
    }

    /// Value a variable is forced to by locked cells alone, if any.
    fn locked_value(&self, var: VarId) -> Option<bool> {
        match self.model.kind(var) {
            VarKind::Assign {
                person,
                day,
                category,
            } => self.problem.locked(person, day).map(|c| c == category),
            VarKind::LeadFlag { .. } => None,
            VarKind::Indicator { index } => {
                let mut determined = true;
                for lit in &self.model.indicators[index].lits {
                    match self.locked_value(lit.var) {
                        Some(value) if lit.holds(value) => {}
                        Some(_) => return Some(false),
                        None => determined = false,
                    }
                }
                determined.then_some(true)
            }
        }
    }

    /// `sum(vars) <= hi`, raised to the locked count when locks already exceed it.
    fn at_most(&mut self, kind: ConstraintKind, vars: &[VarId], hi: i32) {
        let forced = vars
            .iter()
            .filter(|&&v| self.locked_value(v) == Some(true))
            .count() as i32;
        let hi = if forced > hi {
            self.rules.relaxed += 1;
            let cell = vars.first().and_then(|&v| self.model.origin(v));
            log_progress!(
                self.problem.config.verbosity,
                "Locked cells exceed {} bound {} at {:?}; raised to {}",
                kind.as_str(),
                hi,
                cell.map(|(p, d)| (self.problem.person_id(p), self.problem.work_days[d])),
                forced
            );
            forced
        } else {
            hi
        };
        self.model.add_sum(kind, vars, 0, hi);
    }

    fn single_category(&mut self) {
        for person in 0..self.problem.n_people() {
            for day in 0..self.n_days() {
                let vars: Vec<VarId> = DutyCategory::ALL
                    .iter()
                    .map(|&c| self.model.assign(person, day, c))
                    .collect();
                self.model
                    .add_sum(ConstraintKind::OneCategoryPerDay, &vars, 1, 1);
            }
        }
    }

    fn headcounts(&mut self) {
        for day in 0..self.n_days() {
            for category in DutyCategory::ALL {
                let vars: Vec<VarId> = (0..self.problem.n_people())
                    .map(|p| self.model.assign(p, day, category))
                    .collect();
                let n = category.headcount();
                self.model.add_sum(ConstraintKind::Headcount, &vars, n, n);
            }
        }
    }

    fn lead_of_record(&mut self) {
        let leads = self.model.leads().to_vec();
        for day in 0..self.n_days() {
            for category in DutyCategory::LEAD_ELIGIBLE {
                let mut flags = Vec::with_capacity(leads.len());
                for &lead in &leads {
                    let Some(flag) = self.model.lead_flag(lead, day, category) else {
                        continue;
                    };
                    let assigned = self.model.assign(lead, day, category);
                    self.model.add_linear(
                        ConstraintKind::LeadImpliesAssignment,
                        vec![(flag, 1), (assigned, -1)],
                        -1,
                        0,
                    );
                    flags.push(flag);
                }
                self.model.add_sum(ConstraintKind::LeadOfRecord, &flags, 1, 1);
            }
            for &lead in &leads {
                let flags: Vec<VarId> = DutyCategory::LEAD_ELIGIBLE
                    .iter()
                    .filter_map(|&c| self.model.lead_flag(lead, day, c))
                    .collect();
                self.model
                    .add_sum(ConstraintKind::OneLeadFlagPerPerson, &flags, 0, 1);
            }
        }
    }

    fn lead_headcounts(&mut self) {
        let leads = self.model.leads().to_vec();
        for day in 0..self.n_days() {
            for category in DutyCategory::LEAD_ELIGIBLE {
                let vars: Vec<VarId> = leads
                    .iter()
                    .map(|&p| self.model.assign(p, day, category))
                    .collect();
                let max = self.problem.config.lead_max(category).min(leads.len() as u32) as i32;
                let forced = vars
                    .iter()
                    .filter(|&&v| self.locked_value(v) == Some(true))
                    .count() as i32;
                if forced > max {
                    self.rules.relaxed += 1;
                    log_progress!(
                        self.problem.config.verbosity,
                        "Locked cells place {} leads on {} on {}; lead maximum raised",
                        forced,
                        category,
                        self.problem.work_days[day]
                    );
                }
                self.model
                    .add_sum(ConstraintKind::LeadHeadcount, &vars, 1, max.max(forced));
            }
        }
    }

    fn avoidance(&mut self) {
        let groups = self.problem.groups.clone();
        for members in &groups {
            for day in 0..self.n_days() {
                for category in DutyCategory::ALL {
                    let vars: Vec<VarId> = members
                        .iter()
                        .map(|&p| self.model.assign(p, day, category))
                        .collect();
                    self.at_most(ConstraintKind::Avoidance, &vars, 1);
                }
            }
        }
    }

    fn anchor_rotation(&mut self) {
        let anchor = self.problem.anchor();
        for day in 0..self.n_days() {
            // A lock on the anchor overrides the rotation for that cell only.
            if self.problem.locked(anchor, day).is_some() {
                continue;
            }
            let category = self.problem.anchor_category(day);
            let var = self.model.assign(anchor, day, category);
            self.model
                .add_sum(ConstraintKind::AnchorRotation, &[var], 1, 1);
            self.model.pin(anchor, day, category);
        }
    }

    fn night_vars(&self, person: usize, days: std::ops::Range<usize>) -> Vec<VarId> {
        days.flat_map(|day| DutyCategory::NIGHTS.into_iter().map(move |c| (day, c)))
            .map(|(day, c)| self.model.assign(person, day, c))
            .collect()
    }

    fn night_load(&mut self) {
        let n_days = self.n_days();
        for person in 0..self.problem.n_people() {
            // Windows that start in the prior month: `carried` prior days plus the month's first days.
            let id = self.problem.person_id(person).to_string();
            for carried in 1..NIGHT_WINDOW_DAYS {
                let fresh = NIGHT_WINDOW_DAYS - carried;
                let prior = self.problem.history.trailing_nights(&id, carried) as i32;
                if prior == 0 || fresh > n_days {
                    continue;
                }
                let vars = self.night_vars(person, 0..fresh);
                self.at_most(ConstraintKind::NightLoad, &vars, NIGHT_WINDOW_MAX - prior);
            }
        }
        if n_days < NIGHT_WINDOW_DAYS {
            return;
        }
        for person in 0..self.problem.n_people() {
            for start in 0..=n_days - NIGHT_WINDOW_DAYS {
                let vars = self.night_vars(person, start..start + NIGHT_WINDOW_DAYS);
                self.at_most(ConstraintKind::NightLoad, &vars, NIGHT_WINDOW_MAX);
            }
        }
    }

    fn senior_night_spacing(&mut self) {
        let min_gap = self.problem.config.senior_night_min_gap;
        let n_days = self.n_days();
        for person in 0..self.problem.n_people() {
            for day in 0..n_days {
                let here = self.model.assign(person, day, DutyCategory::SeniorNight);
                for next in (day + 1)..=(day + min_gap).min(n_days.saturating_sub(1)) {
                    let there = self.model.assign(person, next, DutyCategory::SeniorNight);
                    self.at_most(ConstraintKind::SeniorNightSpacing, &[here, there], 1);
                }
            }

            let id = self.problem.person_id(person).to_string();
            for day in 0..n_days {
                match self.problem.history.senior_night_distance(&id, day) {
                    Some(distance) if distance <= min_gap => {
                        let var = self.model.assign(person, day, DutyCategory::SeniorNight);
                        self.at_most(ConstraintKind::SeniorNightCarryIn, &[var], 0);
                    }
                    _ => break,
                }
            }
        }
    }

    fn day_spacing(&mut self) {
        let anchor = self.problem.anchor();
        let min_gap = self.problem.config.day_min_gap;
        let pair_cap = self.problem.config.lead_day_pair_cap as i32;
        let n_days = self.n_days();

        for person in (0..self.problem.n_people()).filter(|&p| p != anchor) {
            if !self.problem.is_lead(person) {
                for day in 0..n_days {
                    let here = self.day_var(person, day);
                    for next in (day + 1)..=(day + min_gap).min(n_days.saturating_sub(1)) {
                        let there = self.day_var(person, next);
                        self.at_most(ConstraintKind::DaySpacing, &[here, there], 1);
                    }
                }
                let id = self.problem.person_id(person).to_string();
                for day in 0..n_days {
                    match self.problem.history.day_duty_distance(&id, day) {
                        Some(distance) if distance <= min_gap => {
                            let var = self.day_var(person, day);
                            self.at_most(ConstraintKind::DayCarryIn, &[var], 0);
                        }
                        _ => break,
                    }
                }
                continue;
            }

            // Leads: never three day duties in a row, and a capped number of pairs.
            for start in 0..n_days.saturating_sub(2) {
                let vars: Vec<VarId> = (start..start + 3).map(|d| self.day_var(person, d)).collect();
                self.at_most(ConstraintKind::LeadDayRun, &vars, 2);
            }
            let mut pairs = Vec::with_capacity(n_days);
            for day in 0..n_days.saturating_sub(1) {
                let lits = vec![
                    Lit::pos(self.day_var(person, day)),
                    Lit::pos(self.day_var(person, day + 1)),
                ];
                let pair = self.model.new_indicator(lits);
                self.rules.lead_day_pairs.insert((person, day), pair);
                pairs.push(pair);
            }
            if !pairs.is_empty() {
                self.at_most(ConstraintKind::LeadDayPairCap, &pairs, pair_cap);
            }
        }
    }

    fn locked_cells(&mut self) {
        for person in 0..self.problem.n_people() {
            for day in 0..self.n_days() {
                if let Some(category) = self.problem.locked(person, day) {
                    let var = self.model.assign(person, day, category);
                    self.model.add_sum(ConstraintKind::LockedCell, &[var], 1, 1);
                    self.model.pin(person, day, category);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::*;
    use crate::engine::CellLock;
    use crate::history::HistoryDigest;
    use crate::models::{DailyRecord, DutyRecord};

    fn compiled(problem: &RosterProblem) -> (RosterModel, CompiledRules) {
        let mut model = RosterModel::new(problem.n_people(), problem.n_days(), &problem.lead_flags());
        let rules = compile(problem, &mut model);
        (model, rules)
    }

    fn count(model: &RosterModel, kind: ConstraintKind) -> usize {
        model.constraints.iter().filter(|c| c.kind == kind).count()
    }

    #[test]
    fn test_rule_counts() {
        let problem = make_problem(10);
        let (model, rules) = compiled(&problem);
        assert_eq!(count(&model, ConstraintKind::OneCategoryPerDay), 17 * 10);
        assert_eq!(count(&model, ConstraintKind::Headcount), 4 * 10);
        assert_eq!(count(&model, ConstraintKind::LeadOfRecord), 3 * 10);
        assert_eq!(count(&model, ConstraintKind::LeadImpliesAssignment), 6 * 3 * 10);
        assert_eq!(count(&model, ConstraintKind::AnchorRotation), 10);
        // 17 people, 7 windows of four days each
        assert_eq!(count(&model, ConstraintKind::NightLoad), 17 * 7);
        // 5 non-anchor leads, 9 pairs each
        assert_eq!(rules.lead_day_pairs.len(), 5 * 9);
        assert_eq!(count(&model, ConstraintKind::LeadDayPairCap), 5);
        assert_eq!(count(&model, ConstraintKind::LeadDayRun), 5 * 8);
        // 11 staff with a one-day gap
        assert_eq!(count(&model, ConstraintKind::DaySpacing), 11 * 9);
        assert_eq!(rules.relaxed, 0);
    }

    #[test]
    fn test_anchor_cells_are_pinned() {
        let problem = make_problem(4);
        let (model, _) = compiled(&problem);
        assert_eq!(model.pinned(0, 0), Some(DutyCategory::Day));
        assert_eq!(model.pinned(0, 1), Some(DutyCategory::Sleep));
        assert_eq!(model.pinned(0, 3), Some(DutyCategory::Day));
        assert_eq!(model.pinned(1, 0), None);
    }

    #[test]
    fn test_senior_night_carry_in() {
        let prior_day = d(2026, 2, 27);
        let prior = vec![DailyRecord::new(
            prior_day,
            vec![DutyRecord::new("p07", prior_day, DutyCategory::SeniorNight, None)],
        )];
        let mut problem = make_problem(6);
        problem.history = HistoryDigest::build(&prior, Some("p00"));
        let (model, _) = compiled(&problem);

        let carried: Vec<usize> = model
            .constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::SeniorNightCarryIn)
            .filter_map(|c| model.origin(c.terms[0].0))
            .map(|(_, day)| day)
            .collect();
        assert_eq!(carried, vec![0, 1, 2]);
    }

    #[test]
    fn test_night_load_reaches_into_prior_month() {
        let tail = [
            (d(2026, 2, 21), DutyCategory::ShortNight),
            (d(2026, 2, 24), DutyCategory::Sleep),
            (d(2026, 2, 27), DutyCategory::SeniorNight),
        ];
        let prior: Vec<DailyRecord> = tail
            .iter()
            .map(|&(day, category)| {
                DailyRecord::new(day, vec![DutyRecord::new("p08", day, category, None)])
            })
            .collect();
        let mut problem = make_problem(5);
        problem.history = HistoryDigest::build(&prior, Some("p00"));
        let (model, _) = compiled(&problem);
        let model_ref = &model;

        let nights = |days: std::ops::Range<usize>| -> Vec<VarId> {
            days.flat_map(|day| {
                DutyCategory::NIGHTS
                    .into_iter()
                    .map(move |c| model_ref.assign(8, day, c))
            })
            .collect()
        };
        let bound = |vars: Vec<VarId>| {
            model
                .constraints
                .iter()
                .find(|c| {
                    c.kind == ConstraintKind::NightLoad
                        && c.terms.iter().map(|t| t.0).collect::<Vec<_>>() == vars
                })
                .map(|c| c.hi)
        };
        // Three prior nights: the first new day cannot be a night.
        assert_eq!(bound(nights(0..1)), Some(0));
        assert_eq!(bound(nights(0..2)), Some(1));
        assert_eq!(bound(nights(0..3)), Some(2));
        // 17 people x 2 in-month windows, plus three carried windows for p08.
        assert_eq!(count(&model, ConstraintKind::NightLoad), 17 * 2 + 3);
    }

    #[test]
    fn test_locks_raise_violated_bounds() {
        // Two senior nights on adjacent days for the same person.
        let locks = [
            CellLock {
                person: 9,
                day: 0,
                category: DutyCategory::SeniorNight,
            },
            CellLock {
                person: 9,
                day: 1,
                category: DutyCategory::SeniorNight,
            },
        ];
        let problem = RosterProblem::new(
            make_roster(),
            make_days(5),
            Vec::new(),
            HistoryDigest::default(),
            &locks,
            test_config(),
        );
        let (model, rules) = compiled(&problem);
        assert_eq!(rules.relaxed, 1);
        assert_eq!(count(&model, ConstraintKind::LockedCell), 2);
        assert_eq!(model.pinned(9, 1), Some(DutyCategory::SeniorNight));

        let first = model.assign(9, 0, DutyCategory::SeniorNight);
        let second = model.assign(9, 1, DutyCategory::SeniorNight);
        let relaxed = model
            .constraints
            .iter()
            .find(|c| {
                c.kind == ConstraintKind::SeniorNightSpacing
                    && c.terms.iter().map(|t| t.0).collect::<Vec<_>>() == vec![first, second]
            })
            .unwrap();
        assert_eq!(relaxed.hi, 2);
    }

    #[test]
    fn test_anchor_lock_overrides_rotation() {
        let locks = [CellLock {
            person: 0,
            day: 0,
            category: DutyCategory::ShortNight,
        }];
        let problem = RosterProblem::new(
            make_roster(),
            make_days(3),
            Vec::new(),
            HistoryDigest::default(),
            &locks,
            test_config(),
        );
        let (model, _) = compiled(&problem);
        assert_eq!(model.pinned(0, 0), Some(DutyCategory::ShortNight));
        assert_eq!(count(&model, ConstraintKind::AnchorRotation), 2);
    }
}
