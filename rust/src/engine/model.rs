//! Boolean decision model for one solve.
//!
//! Every variable is a 0/1 value identified by a dense `VarId`:
//! - `x[person, day, category]` assignment bits, allocated first so their id
//!   is a pure index computation;
//! - `c[lead, day, category]` lead-of-record flags for lead-qualified people
//!   and lead-eligible categories;
//! - reified indicators, each equal to the conjunction of a literal list.
//!
//! Hard rules are linear constraints `lo <= sum(coef * var) <= hi`; soft rules
//! are objective terms over indicators plus cohort spread terms.

use crate::catalog::DutyCategory;

/// Dense variable identifier.
pub type VarId = u32;

/// A variable or its negation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lit {
    pub var: VarId,
    pub positive: bool,
}

impl Lit {
    pub fn pos(var: VarId) -> Self {
        Self {
            var,
            positive: true,
        }
    }

    pub fn neg(var: VarId) -> Self {
        Self {
            var,
            positive: false,
        }
    }

    #[inline]
    pub fn holds(self, value: bool) -> bool {
        value == self.positive
    }
}

/// What a variable stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VarKind {
    Assign {
        person: usize,
        day: usize,
        category: DutyCategory,
    },
    LeadFlag {
        person: usize,
        day: usize,
        category: DutyCategory,
    },
    Indicator {
        index: usize,
    },
}

/// Rule family of a hard constraint, used for diagnostics and relaxation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    OneCategoryPerDay,
    Headcount,
    LeadOfRecord,
    LeadImpliesAssignment,
    OneLeadFlagPerPerson,
    LeadHeadcount,
    Avoidance,
    AnchorRotation,
    NightLoad,
    SeniorNightSpacing,
    SeniorNightCarryIn,
    DaySpacing,
    DayCarryIn,
    LeadDayRun,
    LeadDayPairCap,
    LockedCell,
}

impl ConstraintKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConstraintKind::OneCategoryPerDay => "one_category_per_day",
            ConstraintKind::Headcount => "headcount",
            ConstraintKind::LeadOfRecord => "lead_of_record",
            ConstraintKind::LeadImpliesAssignment => "lead_implies_assignment",
            ConstraintKind::OneLeadFlagPerPerson => "one_lead_flag_per_person",
            ConstraintKind::LeadHeadcount => "lead_headcount",
            ConstraintKind::Avoidance => "avoidance",
            ConstraintKind::AnchorRotation => "anchor_rotation",
            ConstraintKind::NightLoad => "night_load",
            ConstraintKind::SeniorNightSpacing => "senior_night_spacing",
            ConstraintKind::SeniorNightCarryIn => "senior_night_carry_in",
            ConstraintKind::DaySpacing => "day_spacing",
            ConstraintKind::DayCarryIn => "day_carry_in",
            ConstraintKind::LeadDayRun => "lead_day_run",
            ConstraintKind::LeadDayPairCap => "lead_day_pair_cap",
            ConstraintKind::LockedCell => "locked_cell",
        }
    }
}

/// `lo <= sum(coef * var) <= hi`.
#[derive(Clone, Debug)]
pub struct LinearConstraint {
    pub kind: ConstraintKind,
    pub terms: Vec<(VarId, i32)>,
    pub lo: i32,
    pub hi: i32,
}

impl LinearConstraint {
    /// Distance of `sum` from the feasible interval.
    #[inline]
    pub fn violation(&self, sum: i32) -> i32 {
        if sum < self.lo {
            self.lo - sum
        } else if sum > self.hi {
            sum - self.hi
        } else {
            0
        }
    }
}

/// Reified conjunction: `var == AND(lits)`.
#[derive(Clone, Debug)]
pub struct Indicator {
    pub var: VarId,
    pub lits: Vec<Lit>,
}

/// One member of a fairness cohort: its count is `offset + sum(vars)`.
#[derive(Clone, Debug)]
pub struct SpreadMember {
    pub vars: Vec<VarId>,
    pub offset: i32,
}

/// Weighted `max - min` of member counts.
#[derive(Clone, Debug)]
pub struct SpreadTerm {
    pub label: String,
    pub members: Vec<SpreadMember>,
    pub weight: i64,
}

/// Result of evaluating the model on a full assignment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Sum of constraint violations.
    pub violations: i64,
    /// Kinds of the violated constraints, one entry per violated constraint.
    pub violated_kinds: Vec<ConstraintKind>,
    /// Weighted objective value.
    pub objective: i64,
}

/// The compiled decision model.
#[derive(Clone, Debug)]
pub struct RosterModel {
    n_people: usize,
    n_days: usize,
    leads: Vec<usize>,
    lead_flag_index: Vec<Option<VarId>>,
    kinds: Vec<VarKind>,
    pinned: Vec<Option<DutyCategory>>,
    pub constraints: Vec<LinearConstraint>,
    pub indicators: Vec<Indicator>,
    pub spreads: Vec<SpreadTerm>,
    pub objective: Vec<(VarId, i64)>,
    /// Objective contribution that does not depend on any variable.
    pub objective_constant: i64,
}

impl RosterModel {
    /// Allocate assignment bits for every cell and lead flags for qualified people.
    pub fn new(n_people: usize, n_days: usize, lead_qualified: &[bool]) -> Self {
        let mut kinds = Vec::with_capacity(n_people * n_days * DutyCategory::COUNT);
        for person in 0..n_people {
            for day in 0..n_days {
                for category in DutyCategory::ALL {
                    kinds.push(VarKind::Assign {
                        person,
                        day,
                        category,
                    });
                }
            }
        }

        let leads: Vec<usize> = (0..n_people)
            .filter(|&p| lead_qualified.get(p).copied().unwrap_or(false))
            .collect();

        let mut lead_flag_index = vec![None; n_people * n_days * DutyCategory::COUNT];
        for &person in &leads {
            for day in 0..n_days {
                for category in DutyCategory::LEAD_ELIGIBLE {
                    let var = kinds.len() as VarId;
                    kinds.push(VarKind::LeadFlag {
                        person,
                        day,
                        category,
                    });
                    lead_flag_index[(person * n_days + day) * DutyCategory::COUNT
                        + category.index()] = Some(var);
                }
            }
        }

        Self {
            n_people,
            n_days,
            leads,
            lead_flag_index,
            kinds,
            pinned: vec![None; n_people * n_days],
            constraints: Vec::new(),
            indicators: Vec::new(),
            spreads: Vec::new(),
            objective: Vec::new(),
            objective_constant: 0,
        }
    }

    pub fn n_people(&self) -> usize {
        self.n_people
    }

    pub fn n_days(&self) -> usize {
        self.n_days
    }

    pub fn var_count(&self) -> usize {
        self.kinds.len()
    }

    /// Lead-qualified people in roster order.
    pub fn leads(&self) -> &[usize] {
        &self.leads
    }

    pub fn is_lead(&self, person: usize) -> bool {
        self.leads.binary_search(&person).is_ok()
    }

    pub fn kind(&self, var: VarId) -> VarKind {
        self.kinds[var as usize]
    }

    #[inline]
    pub fn cell_index(&self, person: usize, day: usize) -> usize {
        person * self.n_days + day
    }

    /// `x[person, day, category]`.
    #[inline]
    pub fn assign(&self, person: usize, day: usize, category: DutyCategory) -> VarId {
        (self.cell_index(person, day) * DutyCategory::COUNT + category.index()) as VarId
    }

    /// `c[person, day, category]`, if the person is a lead and the category has a lead seat.
    #[inline]
    pub fn lead_flag(&self, person: usize, day: usize, category: DutyCategory) -> Option<VarId> {
        self.lead_flag_index[self.cell_index(person, day) * DutyCategory::COUNT + category.index()]
    }

    /// The (person, day) cell a variable belongs to, if any.
    pub fn origin(&self, var: VarId) -> Option<(usize, usize)> {
        match self.kind(var) {
            VarKind::Assign { person, day, .. } | VarKind::LeadFlag { person, day, .. } => {
                Some((person, day))
            }
            VarKind::Indicator { index } => self.indicators[index]
                .lits
                .first()
                .and_then(|lit| self.origin(lit.var)),
        }
    }

    /// Add a reified conjunction and return its variable.
    pub fn new_indicator(&mut self, lits: Vec<Lit>) -> VarId {
        let var = self.kinds.len() as VarId;
        let index = self.indicators.len();
        self.kinds.push(VarKind::Indicator { index });
        self.indicators.push(Indicator { var, lits });
        var
    }

    pub fn add_linear(&mut self, kind: ConstraintKind, terms: Vec<(VarId, i32)>, lo: i32, hi: i32) {
        self.constraints.push(LinearConstraint { kind, terms, lo, hi });
    }

    /// `sum(vars) in [lo, hi]` with unit coefficients.
    pub fn add_sum(&mut self, kind: ConstraintKind, vars: &[VarId], lo: i32, hi: i32) {
        let terms = vars.iter().map(|&v| (v, 1)).collect();
        self.add_linear(kind, terms, lo, hi);
    }

    pub fn add_objective(&mut self, var: VarId, coef: i64) {
        if coef != 0 {
            self.objective.push((var, coef));
        }
    }

    pub fn add_spread(&mut self, label: String, members: Vec<SpreadMember>, weight: i64) {
        if members.len() > 1 && weight != 0 {
            self.spreads.push(SpreadTerm {
                label,
                members,
                weight,
            });
        }
    }

    /// Fix a cell so the search never moves it.
    pub fn pin(&mut self, person: usize, day: usize, category: DutyCategory) {
        let cell = self.cell_index(person, day);
        self.pinned[cell] = Some(category);
    }

    pub fn pinned(&self, person: usize, day: usize) -> Option<DutyCategory> {
        self.pinned[self.cell_index(person, day)]
    }

    /// Who holds the lead flag for `category` on `day`: the first lead in roster order.
    pub fn lead_of_record<F>(&self, day: usize, category: DutyCategory, category_of: F) -> Option<usize>
    where
        F: Fn(usize, usize) -> DutyCategory,
    {
        if !category.is_lead_eligible() {
            return None;
        }
        self.leads
            .iter()
            .copied()
            .find(|&lead| category_of(lead, day) == category)
    }

    /// Expand a cell grid (category per person and day) into a full variable assignment.
    pub fn derive_values(&self, cells: &[DutyCategory]) -> Vec<bool> {
        let mut values = vec![false; self.var_count()];
        for person in 0..self.n_people {
            for day in 0..self.n_days {
                let category = cells[self.cell_index(person, day)];
                values[self.assign(person, day, category) as usize] = true;
            }
        }
        let category_of = |p: usize, d: usize| cells[self.cell_index(p, d)];
        for day in 0..self.n_days {
            for category in DutyCategory::LEAD_ELIGIBLE {
                if let Some(lead) = self.lead_of_record(day, category, category_of) {
                    if let Some(var) = self.lead_flag(lead, day, category) {
                        values[var as usize] = true;
                    }
                }
            }
        }
        for indicator in &self.indicators {
            values[indicator.var as usize] = indicator
                .lits
                .iter()
                .all(|lit| lit.holds(values[lit.var as usize]));
        }
        values
    }

    /// Evaluate every constraint and objective term from scratch.
    pub fn evaluate(&self, values: &[bool]) -> Evaluation {
        let mut evaluation = Evaluation {
            objective: self.objective_constant,
            ..Evaluation::default()
        };
        for constraint in &self.constraints {
            let sum: i32 = constraint
                .terms
                .iter()
                .map(|&(var, coef)| if values[var as usize] { coef } else { 0 })
                .sum();
            let violation = constraint.violation(sum);
            if violation > 0 {
                evaluation.violations += i64::from(violation);
                evaluation.violated_kinds.push(constraint.kind);
            }
        }
        for &(var, coef) in &self.objective {
            if values[var as usize] {
                evaluation.objective += coef;
            }
        }
        for spread in &self.spreads {
            evaluation.objective += spread.weight * i64::from(spread_value(spread, values));
        }
        evaluation
    }

    /// Number of constraints per rule family, for logging.
    pub fn constraint_census(&self) -> Vec<(ConstraintKind, usize)> {
        let mut census: Vec<(ConstraintKind, usize)> = Vec::new();
        for constraint in &self.constraints {
            match census.iter_mut().find(|(k, _)| *k == constraint.kind) {
                Some((_, n)) => *n += 1,
                None => census.push((constraint.kind, 1)),
            }
        }
        census.sort();
        census
    }
}

fn spread_value(spread: &SpreadTerm, values: &[bool]) -> i32 {
    let counts = spread.members.iter().map(|member| {
        member.offset
            + member
                .vars
                .iter()
                .filter(|&&v| values[v as usize])
                .count() as i32
    });
    let (min, max) = counts.fold((i32::MAX, i32::MIN), |(lo, hi), c| (lo.min(c), hi.max(c)));
    if min > max {
        0
    } else {
        max - min
    }
}
