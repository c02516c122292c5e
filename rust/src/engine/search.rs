//! Search driver: parallel local search over the compiled model.
//!
//! Each worker builds a random schedule that already meets the daily
//! headcounts, then explores it with same-day swaps of two people's
//! categories. Swaps keep headcount and single-category rules intact, so the
//! search only has to repair the remaining rules. Evaluation is incremental:
//! every variable carries a watch list of the constraints, indicators and
//! spread terms it feeds.
//!
//! Acceptance is lexicographic on (hard violations, objective): fewer
//! violations always win, more are taken only as rare noise, and equal
//! violation counts are decided by annealing on the objective with periodic
//! reheats from the best schedule.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::time::Instant;

use crate::catalog::DutyCategory;
use crate::{log_debug, log_progress};

use super::model::{ConstraintKind, RosterModel, VarId, VarKind};

/// Probability of accepting a move that adds hard violations.
const HARD_NOISE: f64 = 0.002;

/// Share of moves aimed at a violated constraint while any exist.
const CONFLICT_BIAS: f64 = 0.5;

/// Moves per annealing cycle before reheating.
const CYCLE_MOVES: u64 = 200_000;

/// Final temperature of each cycle.
const END_TEMPERATURE: f64 = 1.0;

/// Deadline checks happen every this many moves.
const CLOCK_STRIDE: u64 = 256;

/// Search budget and seeding for one solve.
#[derive(Clone, Debug)]
pub struct SearchParams {
    pub deadline: Instant,
    pub max_idle_moves: u64,
    pub workers: usize,
    pub seed: u64,
    /// Starting temperature of each annealing cycle.
    pub start_temperature: f64,
    pub verbosity: u8,
}

/// Best assignment found by the search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// Category per (person, day), person-major.
    pub cells: Vec<DutyCategory>,
    pub violations: i64,
    pub violated_kinds: Vec<ConstraintKind>,
    pub objective: i64,
    pub moves: u64,
    pub worker: usize,
}

impl SearchOutcome {
    pub fn is_feasible(&self) -> bool {
        self.violations == 0
    }

    fn rank(&self) -> (i64, i64) {
        (self.violations, self.objective)
    }
}

/// Run all workers and return the best outcome.
pub fn run(model: &RosterModel, params: &SearchParams) -> SearchOutcome {
    let watches = WatchIndex::build(model);
    let outcomes: Vec<SearchOutcome> = (0..params.workers.max(1))
        .into_par_iter()
        .map(|worker| run_worker(model, &watches, params, worker))
        .collect();

    for outcome in &outcomes {
        log_debug!(
            params.verbosity,
            "Worker {}: {} moves, violations={}, objective={}",
            outcome.worker,
            outcome.moves,
            outcome.violations,
            outcome.objective
        );
    }

    // Ties go to the lowest worker index so fixed seeds stay reproducible.
    let mut best: Option<SearchOutcome> = None;
    for outcome in outcomes {
        if best.as_ref().map_or(true, |b| outcome.rank() < b.rank()) {
            best = Some(outcome);
        }
    }
    best.unwrap_or_else(|| empty_outcome(model))
}

fn empty_outcome(model: &RosterModel) -> SearchOutcome {
    let cells = vec![DutyCategory::Day; model.n_people() * model.n_days()];
    let evaluation = model.evaluate(&model.derive_values(&cells));
    SearchOutcome {
        cells,
        violations: evaluation.violations,
        violated_kinds: evaluation.violated_kinds,
        objective: evaluation.objective,
        moves: 0,
        worker: 0,
    }
}

/// Lexicographic acceptance on (hard delta, soft delta).
fn accept<R: Rng>(delta_hard: i64, delta_soft: i64, temperature: f64, rng: &mut R) -> bool {
    match delta_hard.cmp(&0) {
        Ordering::Less => true,
        Ordering::Greater => rng.gen_bool(HARD_NOISE),
        Ordering::Equal => {
            delta_soft <= 0 || rng.gen::<f64>() < (-(delta_soft as f64) / temperature).exp()
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Watch {
    Constraint { index: u32, coef: i32 },
    Indicator { index: u32, positive: bool },
    Spread { term: u32, member: u32 },
}

/// Per-variable watch lists and objective coefficients, shared by all workers.
struct WatchIndex {
    watches: Vec<Vec<Watch>>,
    objective: Vec<i64>,
}

impl WatchIndex {
    fn build(model: &RosterModel) -> Self {
        let mut watches: Vec<Vec<Watch>> = vec![Vec::new(); model.var_count()];
        for (index, constraint) in model.constraints.iter().enumerate() {
            for &(var, coef) in &constraint.terms {
                watches[var as usize].push(Watch::Constraint {
                    index: index as u32,
                    coef,
                });
            }
        }
        for (index, indicator) in model.indicators.iter().enumerate() {
            for lit in &indicator.lits {
                watches[lit.var as usize].push(Watch::Indicator {
                    index: index as u32,
                    positive: lit.positive,
                });
            }
        }
        for (term, spread) in model.spreads.iter().enumerate() {
            for (member, m) in spread.members.iter().enumerate() {
                for &var in &m.vars {
                    watches[var as usize].push(Watch::Spread {
                        term: term as u32,
                        member: member as u32,
                    });
                }
            }
        }
        let mut objective = vec![0i64; model.var_count()];
        for &(var, coef) in &model.objective {
            objective[var as usize] += coef;
        }
        Self { watches, objective }
    }
}

/// Set with O(1) insert, remove and uniform sampling.
#[derive(Clone, Debug)]
struct IndexedSet {
    items: Vec<u32>,
    positions: Vec<u32>,
}

impl IndexedSet {
    const ABSENT: u32 = u32::MAX;

    fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            positions: vec![Self::ABSENT; capacity],
        }
    }

    fn insert(&mut self, item: u32) {
        if self.positions[item as usize] == Self::ABSENT {
            self.positions[item as usize] = self.items.len() as u32;
            self.items.push(item);
        }
    }

    fn remove(&mut self, item: u32) {
        let position = self.positions[item as usize];
        if position == Self::ABSENT {
            return;
        }
        self.items.swap_remove(position as usize);
        if let Some(&moved) = self.items.get(position as usize) {
            self.positions[moved as usize] = position;
        }
        self.positions[item as usize] = Self::ABSENT;
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn choose<R: Rng>(&self, rng: &mut R) -> Option<u32> {
        self.items.choose(rng).copied()
    }
}

/// Incrementally maintained assignment.
struct SearchState<'m> {
    model: &'m RosterModel,
    index: &'m WatchIndex,
    values: Vec<bool>,
    cells: Vec<DutyCategory>,
    /// Lead-of-record per (day, category).
    lead_holder: Vec<Option<usize>>,
    sums: Vec<i32>,
    violated: IndexedSet,
    hard: i64,
    satisfied: Vec<u32>,
    spread_counts: Vec<Vec<i32>>,
    spread_values: Vec<i32>,
    soft: i64,
}

impl<'m> SearchState<'m> {
    fn new(model: &'m RosterModel, index: &'m WatchIndex, cells: Vec<DutyCategory>) -> Self {
        let values = model.derive_values(&cells);

        let mut sums = Vec::with_capacity(model.constraints.len());
        let mut violated = IndexedSet::new(model.constraints.len());
        let mut hard = 0i64;
        for (i, constraint) in model.constraints.iter().enumerate() {
            let sum: i32 = constraint
                .terms
                .iter()
                .map(|&(var, coef)| if values[var as usize] { coef } else { 0 })
                .sum();
            let violation = constraint.violation(sum);
            if violation > 0 {
                violated.insert(i as u32);
                hard += i64::from(violation);
            }
            sums.push(sum);
        }

        let satisfied = model
            .indicators
            .iter()
            .map(|ind| ind.lits.iter().filter(|l| l.holds(values[l.var as usize])).count() as u32)
            .collect();

        let spread_counts: Vec<Vec<i32>> = model
            .spreads
            .iter()
            .map(|spread| {
                spread
                    .members
                    .iter()
                    .map(|m| m.offset + m.vars.iter().filter(|&&v| values[v as usize]).count() as i32)
                    .collect()
            })
            .collect();
        let spread_values: Vec<i32> = spread_counts.iter().map(|c| spread_of(c)).collect();

        let mut soft = model.objective_constant;
        for (var, &value) in values.iter().enumerate() {
            if value {
                soft += index.objective[var];
            }
        }
        for (spread, &value) in model.spreads.iter().zip(&spread_values) {
            soft += spread.weight * i64::from(value);
        }

        let n_days = model.n_days();
        let mut lead_holder = vec![None; n_days * DutyCategory::COUNT];
        for day in 0..n_days {
            for category in DutyCategory::LEAD_ELIGIBLE {
                lead_holder[day * DutyCategory::COUNT + category.index()] = model
                    .lead_of_record(day, category, |p, d| cells[model.cell_index(p, d)]);
            }
        }

        Self {
            model,
            index,
            values,
            cells,
            lead_holder,
            sums,
            violated,
            hard,
            satisfied,
            spread_counts,
            spread_values,
            soft,
        }
    }

    fn rank(&self) -> (i64, i64) {
        (self.hard, self.soft)
    }

    fn cell(&self, person: usize, day: usize) -> DutyCategory {
        self.cells[self.model.cell_index(person, day)]
    }

    fn set_var(&mut self, var: VarId, value: bool) {
        let v = var as usize;
        if self.values[v] == value {
            return;
        }
        self.values[v] = value;
        let delta: i32 = if value { 1 } else { -1 };
        let watch_index = self.index;
        let model = self.model;
        self.soft += watch_index.objective[v] * i64::from(delta);

        for watch in &watch_index.watches[v] {
            match *watch {
                Watch::Constraint { index, coef } => {
                    let i = index as usize;
                    let constraint = &model.constraints[i];
                    let before = constraint.violation(self.sums[i]);
                    self.sums[i] += coef * delta;
                    let after = constraint.violation(self.sums[i]);
                    if before != after {
                        self.hard += i64::from(after - before);
                        if after == 0 {
                            self.violated.remove(index);
                        } else if before == 0 {
                            self.violated.insert(index);
                        }
                    }
                }
                Watch::Indicator { index, positive } => {
                    let i = index as usize;
                    let indicator = &model.indicators[i];
                    let len = indicator.lits.len() as u32;
                    let was = self.satisfied[i] == len;
                    if value == positive {
                        self.satisfied[i] += 1;
                    } else {
                        self.satisfied[i] -= 1;
                    }
                    let now = self.satisfied[i] == len;
                    if was != now {
                        self.set_var(indicator.var, now);
                    }
                }
                Watch::Spread { term, member } => {
                    let (t, m) = (term as usize, member as usize);
                    self.spread_counts[t][m] += delta;
                    let spread = spread_of(&self.spread_counts[t]);
                    let change = spread - self.spread_values[t];
                    if change != 0 {
                        self.spread_values[t] = spread;
                        self.soft += model.spreads[t].weight * i64::from(change);
                    }
                }
            }
        }
    }

    /// Exchange the categories of two people on one day. Applying it twice undoes it.
    fn swap(&mut self, day: usize, p: usize, q: usize) {
        let a = self.cell(p, day);
        let b = self.cell(q, day);
        if a == b {
            return;
        }
        let model = self.model;
        self.set_var(model.assign(p, day, a), false);
        self.set_var(model.assign(q, day, b), false);
        self.set_var(model.assign(p, day, b), true);
        self.set_var(model.assign(q, day, a), true);
        self.cells[model.cell_index(p, day)] = b;
        self.cells[model.cell_index(q, day)] = a;
        self.refresh_lead(day, a);
        self.refresh_lead(day, b);
    }

    fn refresh_lead(&mut self, day: usize, category: DutyCategory) {
        if !category.is_lead_eligible() {
            return;
        }
        let model = self.model;
        let cells = &self.cells;
        let holder = model.lead_of_record(day, category, |p, d| cells[model.cell_index(p, d)]);
        let slot = day * DutyCategory::COUNT + category.index();
        let previous = self.lead_holder[slot];
        if previous == holder {
            return;
        }
        if let Some(flag) = previous.and_then(|p| model.lead_flag(p, day, category)) {
            self.set_var(flag, false);
        }
        if let Some(flag) = holder.and_then(|p| model.lead_flag(p, day, category)) {
            self.set_var(flag, true);
        }
        self.lead_holder[slot] = holder;
    }

    fn snapshot(&self, moves: u64, worker: usize) -> SearchOutcome {
        let violated_kinds = self
            .violated
            .items
            .iter()
            .map(|&i| self.model.constraints[i as usize].kind)
            .collect();
        SearchOutcome {
            cells: self.cells.clone(),
            violations: self.hard,
            violated_kinds,
            objective: self.soft,
            moves,
            worker,
        }
    }
}

fn spread_of(counts: &[i32]) -> i32 {
    match (counts.iter().min(), counts.iter().max()) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => 0,
    }
}

/// Random schedule honoring pins and daily headcounts, with a lead in every lead category.
fn construct<R: Rng>(model: &RosterModel, rng: &mut R) -> Vec<DutyCategory> {
    let (n_people, n_days) = (model.n_people(), model.n_days());
    let mut cells = vec![DutyCategory::Day; n_people * n_days];

    for day in 0..n_days {
        let mut quota: [i32; DutyCategory::COUNT] = [0; DutyCategory::COUNT];
        for category in DutyCategory::ALL {
            quota[category.index()] = category.headcount();
        }
        let mut free = Vec::with_capacity(n_people);
        for person in 0..n_people {
            match model.pinned(person, day) {
                Some(category) => {
                    cells[model.cell_index(person, day)] = category;
                    quota[category.index()] -= 1;
                }
                None => free.push(person),
            }
        }
        free.shuffle(rng);

        // Seat a lead in every lead category that has none yet.
        for category in DutyCategory::LEAD_ELIGIBLE {
            let has_lead = model
                .leads()
                .iter()
                .any(|&l| model.pinned(l, day) == Some(category));
            if has_lead || quota[category.index()] <= 0 {
                continue;
            }
            if let Some(pos) = free.iter().position(|&p| model.is_lead(p)) {
                let lead = free.swap_remove(pos);
                cells[model.cell_index(lead, day)] = category;
                quota[category.index()] -= 1;
            }
        }

        let mut seats: Vec<DutyCategory> = DutyCategory::ALL
            .iter()
            .flat_map(|&c| std::iter::repeat(c).take(quota[c.index()].max(0) as usize))
            .collect();
        seats.shuffle(rng);
        for (i, person) in free.into_iter().enumerate() {
            // More free people than seats only happens with inconsistent locks.
            let category = seats.get(i).copied().unwrap_or(DutyCategory::Day);
            cells[model.cell_index(person, day)] = category;
        }
    }
    cells
}

/// Unpinned people per day.
fn movable_people(model: &RosterModel) -> Vec<Vec<usize>> {
    (0..model.n_days())
        .map(|day| {
            (0..model.n_people())
                .filter(|&p| model.pinned(p, day).is_none())
                .collect()
        })
        .collect()
}

/// Pick a swap aimed at a violated constraint.
fn conflict_move<R: Rng>(
    state: &SearchState,
    movable: &[Vec<usize>],
    rng: &mut R,
) -> Option<(usize, usize, usize)> {
    let model = state.model;
    let constraint = &model.constraints[state.violated.choose(rng)? as usize];
    let &(mut var, _) = constraint.terms.choose(rng)?;
    if let VarKind::Indicator { index } = model.kind(var) {
        var = model.indicators[index].lits.choose(rng)?.var;
    }
    let (person, day, category) = match model.kind(var) {
        VarKind::Assign {
            person,
            day,
            category,
        }
        | VarKind::LeadFlag {
            person,
            day,
            category,
        } => (person, day, category),
        VarKind::Indicator { .. } => return None,
    };
    if model.pinned(person, day).is_some() {
        return None;
    }
    let current = state.cell(person, day);
    let candidates = &movable[day];
    let partner = if current == category {
        // Move the person out of the category.
        let others: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&q| state.cell(q, day) != category)
            .collect();
        *others.choose(rng)?
    } else {
        // Move the person into the category.
        let holders: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&q| state.cell(q, day) == category)
            .collect();
        *holders.choose(rng)?
    };
    Some((day, person, partner))
}

/// Pick a uniform random swap on a random day.
fn random_move<R: Rng>(
    state: &SearchState,
    movable: &[Vec<usize>],
    swap_days: &[usize],
    rng: &mut R,
) -> Option<(usize, usize, usize)> {
    let day = *swap_days.choose(rng)?;
    let people = &movable[day];
    let p = *people.choose(rng)?;
    let q = *people.choose(rng)?;
    if state.cell(p, day) == state.cell(q, day) {
        return None;
    }
    Some((day, p, q))
}

fn run_worker(
    model: &RosterModel,
    watches: &WatchIndex,
    params: &SearchParams,
    worker: usize,
) -> SearchOutcome {
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(worker as u64));
    let cells = construct(model, &mut rng);
    let mut state = SearchState::new(model, watches, cells);
    let mut best = state.snapshot(0, worker);

    let movable = movable_people(model);
    let swap_days: Vec<usize> = (0..model.n_days())
        .filter(|&d| movable[d].len() >= 2)
        .collect();
    if swap_days.is_empty() {
        return best;
    }

    let start_temperature = params.start_temperature.max(END_TEMPERATURE);
    let cooling = (END_TEMPERATURE / start_temperature).powf(1.0 / CYCLE_MOVES as f64);
    let mut temperature = start_temperature;
    let mut moves: u64 = 0;
    let mut idle: u64 = 0;

    loop {
        moves += 1;
        if moves % CLOCK_STRIDE == 0 && Instant::now() >= params.deadline {
            break;
        }
        if best.is_feasible() && idle >= params.max_idle_moves {
            break;
        }

        temperature *= cooling;
        if temperature < END_TEMPERATURE {
            temperature = start_temperature;
            state = SearchState::new(model, watches, best.cells.clone());
        }
        idle += 1;

        let candidate = if !state.violated.is_empty() && rng.gen_bool(CONFLICT_BIAS) {
            conflict_move(&state, &movable, &mut rng)
        } else {
            random_move(&state, &movable, &swap_days, &mut rng)
        };
        let Some((day, p, q)) = candidate else {
            continue;
        };

        let (hard, soft) = state.rank();
        state.swap(day, p, q);
        if !accept(state.hard - hard, state.soft - soft, temperature, &mut rng) {
            state.swap(day, p, q);
            continue;
        }

        if state.rank() < best.rank() {
            let was_feasible = best.is_feasible();
            best = state.snapshot(moves, worker);
            idle = 0;
            if best.is_feasible() {
                if !was_feasible {
                    log_progress!(
                        params.verbosity,
                        "Worker {}: first feasible schedule after {} moves, objective={}",
                        worker,
                        moves,
                        best.objective
                    );
                } else {
                    log_debug!(
                        params.verbosity,
                        "Worker {}: objective={} after {} moves",
                        worker,
                        best.objective,
                        moves
                    );
                }
            }
        }
    }
    best.moves = moves;
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::constraints::compile;
    use crate::engine::fixtures::*;
    use crate::engine::penalties::encode;
    use crate::engine::RosterProblem;
    use std::time::Duration;

    fn full_model(problem: &RosterProblem) -> RosterModel {
        let mut model = RosterModel::new(problem.n_people(), problem.n_days(), &problem.lead_flags());
        let rules = compile(problem, &mut model);
        let mut rng = StdRng::seed_from_u64(3);
        encode(problem, &mut model, &rules, &mut rng);
        model
    }

    fn params(seed: u64) -> SearchParams {
        SearchParams {
            deadline: Instant::now() + Duration::from_secs(20),
            max_idle_moves: 300_000,
            workers: 2,
            seed,
            start_temperature: 5_000.0,
            verbosity: 0,
        }
    }

    #[test]
    fn test_accept_rule() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(accept(-1, 1_000_000, 1.0, &mut rng));
        assert!(accept(0, -5, 1.0, &mut rng));
        assert!(accept(0, 0, 1.0, &mut rng));
        // exp(-10_000) underflows to zero
        assert!(!accept(0, 10_000, 1.0, &mut rng));
    }

    #[test]
    fn test_indexed_set() {
        let mut set = IndexedSet::new(8);
        set.insert(3);
        set.insert(5);
        set.insert(3);
        assert_eq!(set.items.len(), 2);
        set.remove(3);
        assert_eq!(set.items, vec![5]);
        assert_eq!(set.positions[5], 0);
        set.remove(3);
        set.remove(5);
        assert!(set.is_empty());
    }

    #[test]
    fn test_construction_meets_headcounts() {
        let problem = make_problem(6);
        let model = full_model(&problem);
        let mut rng = StdRng::seed_from_u64(11);
        let cells = construct(&model, &mut rng);
        for day in 0..6 {
            for category in DutyCategory::ALL {
                let n = (0..17)
                    .filter(|&p| cells[model.cell_index(p, day)] == category)
                    .count() as i32;
                assert_eq!(n, category.headcount());
            }
        }
        assert_eq!(cells[model.cell_index(0, 0)], DutyCategory::Day);
        assert_eq!(cells[model.cell_index(0, 1)], DutyCategory::Sleep);
    }

    #[test]
    fn test_incremental_matches_full_evaluation() {
        let problem = make_problem(8);
        let model = full_model(&problem);
        let watches = WatchIndex::build(&model);
        let mut rng = StdRng::seed_from_u64(5);
        let cells = construct(&model, &mut rng);
        let mut state = SearchState::new(&model, &watches, cells);
        let movable = movable_people(&model);
        let days: Vec<usize> = (0..8).collect();

        for step in 0..2_000 {
            if let Some((day, p, q)) = random_move(&state, &movable, &days, &mut rng) {
                state.swap(day, p, q);
                if step % 3 == 0 {
                    state.swap(day, p, q);
                }
            }
            if step % 100 == 0 {
                let evaluation = model.evaluate(&model.derive_values(&state.cells));
                assert_eq!(state.hard, evaluation.violations);
                assert_eq!(state.soft, evaluation.objective);
                assert_eq!(state.values, model.derive_values(&state.cells));
            }
        }
    }

    #[test]
    fn test_search_finds_feasible_schedule() {
        let problem = make_problem(10);
        let model = full_model(&problem);
        let outcome = run(&model, &params(42));
        assert!(outcome.is_feasible(), "violations: {:?}", outcome.violated_kinds);
        let evaluation = model.evaluate(&model.derive_values(&outcome.cells));
        assert_eq!(evaluation.violations, 0);
        assert_eq!(evaluation.objective, outcome.objective);
    }

    #[test]
    fn test_fully_pinned_model_is_evaluated_directly() {
        let problem = make_problem(3);
        let mut model = full_model(&problem);
        let mut rng = StdRng::seed_from_u64(9);
        let cells = construct(&model, &mut rng);
        for person in 0..17 {
            for day in 0..3 {
                model.pin(person, day, cells[model.cell_index(person, day)]);
            }
        }
        let outcome = run(&model, &params(1));
        assert_eq!(outcome.moves, 0);
        assert_eq!(outcome.cells, cells);
    }
}
