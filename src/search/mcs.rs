//! Minimal-correction-subset extraction: the CLD and LBX procedures.
//!
//! Both operate on one partition of soft literals under the solver's hard
//! set plus the `keep` literals locked by earlier partitions. CLD grows a
//! maximal satisfiable subset through disjunction rounds, so its complement
//! is a minimum-cost correction subset for the partition; LBX tests one
//! literal at a time and yields an inclusion-minimal correction subset with
//! far fewer solver calls. Either respects a per-partition conflict budget
//! and reports the undecided residue on exhaustion so the caller can fold it
//! into the next partition.

use crate::solver::{ConstraintSolver, Lit, SolverVerdict};
use crate::util::statistics::Stats;

/// How an extraction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// The partition was decided: `satisfied` is maximal, `correction` must
    /// be falsified.
    Proved,
    /// The conflict budget ran out; `residual` holds the undecided terms.
    Budget,
    /// The global deadline expired mid-partition.
    Deadline,
    /// The hard set plus `keep` is itself unsatisfiable.
    Infeasible,
}

/// Outcome of one partition extraction.
#[derive(Debug, Clone)]
pub struct McsResult {
    /// Soft literals witnessed true; lock these for later partitions.
    pub satisfied: Vec<Lit>,
    /// Soft literals proven impossible alongside `satisfied`.
    pub correction: Vec<Lit>,
    /// Undecided literals left behind by budget or deadline exhaustion.
    pub residual: Vec<Lit>,
    /// Terminal status.
    pub status: EngineStatus,
    /// Whether the solver holds a model witnessing `keep ∪ satisfied`.
    pub saw_model: bool,
}

/// Tracks the conflict allowance of one partition across solver calls.
pub struct ConflictAllowance {
    remaining: Option<u64>,
}

impl ConflictAllowance {
    /// `None` means unlimited (the documented behavior of
    /// `part_max_conflicts = 0`).
    pub fn new(limit: Option<u64>) -> ConflictAllowance {
        ConflictAllowance { remaining: limit }
    }

    /// Whether nothing is left to spend.
    pub fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    fn arm<S: ConstraintSolver>(&self, solver: &mut S) {
        solver.set_conflict_budget(self.remaining);
    }

    fn debit<S: ConstraintSolver>(&mut self, solver: &S) {
        if let Some(r) = self.remaining.as_mut() {
            *r = r.saturating_sub(solver.last_call_conflicts());
        }
    }
}

fn lit_holds<S: ConstraintSolver>(solver: &S, l: Lit) -> bool {
    solver.value(l.var()) != l.is_negative()
}

fn solve_tracked<S: ConstraintSolver>(
    solver: &mut S,
    assumptions: &[Lit],
    allowance: &mut ConflictAllowance,
    stats: &Stats,
) -> SolverVerdict {
    allowance.arm(solver);
    Stats::inc(&stats.solver_calls);
    let verdict = solver.solve(assumptions);
    Stats::add(&stats.conflicts, solver.last_call_conflicts());
    allowance.debit(solver);
    match verdict {
        SolverVerdict::Sat => Stats::inc(&stats.sat_calls),
        SolverVerdict::Unsat => Stats::inc(&stats.unsat_calls),
        SolverVerdict::BudgetExceeded => Stats::inc(&stats.budget_calls),
    }
    verdict
}

/// Core-guided linear search with disjoint correction sets.
///
/// 1. Try to satisfy every soft literal at once; success means a zero-cost
///    partition.
/// 2. Otherwise witness the base, then repeatedly require at least one
///    undecided literal through a fresh activation clause. Satisfied
///    literals migrate into the kept set; refutation proves the residue is
///    the correction subset.
pub fn cld<S, D>(
    solver: &mut S,
    keep: &[Lit],
    softs: &[Lit],
    mut allowance: ConflictAllowance,
    expired: D,
    stats: &Stats,
) -> McsResult
where
    S: ConstraintSolver,
    D: Fn() -> bool,
{
    let mut assumptions: Vec<Lit> = keep.to_vec();
    assumptions.extend_from_slice(softs);
    if expired() {
        return deadline_result(softs);
    }
    match solve_tracked(solver, &assumptions, &mut allowance, stats) {
        SolverVerdict::Sat => {
            return McsResult {
                satisfied: softs.to_vec(),
                correction: Vec::new(),
                residual: Vec::new(),
                status: EngineStatus::Proved,
                saw_model: true,
            }
        }
        SolverVerdict::BudgetExceeded => {
            return McsResult {
                satisfied: Vec::new(),
                correction: Vec::new(),
                residual: softs.to_vec(),
                status: EngineStatus::Budget,
                saw_model: false,
            }
        }
        SolverVerdict::Unsat => {}
    }

    // Witness the base before the disjunction rounds.
    if expired() {
        return deadline_result(softs);
    }
    match solve_tracked(solver, keep, &mut allowance, stats) {
        SolverVerdict::Sat => {}
        SolverVerdict::Unsat => {
            return McsResult {
                satisfied: Vec::new(),
                correction: Vec::new(),
                residual: softs.to_vec(),
                status: EngineStatus::Infeasible,
                saw_model: false,
            }
        }
        SolverVerdict::BudgetExceeded => {
            return McsResult {
                satisfied: Vec::new(),
                correction: Vec::new(),
                residual: softs.to_vec(),
                status: EngineStatus::Budget,
                saw_model: false,
            }
        }
    }

    let mut satisfied: Vec<Lit> = Vec::new();
    let mut undecided: Vec<Lit> = softs.to_vec();
    harvest(solver, &mut undecided, &mut satisfied);

    while !undecided.is_empty() {
        if expired() {
            return McsResult {
                satisfied,
                correction: Vec::new(),
                residual: undecided,
                status: EngineStatus::Deadline,
                saw_model: true,
            };
        }
        if allowance.exhausted() {
            return McsResult {
                satisfied,
                correction: Vec::new(),
                residual: undecided,
                status: EngineStatus::Budget,
                saw_model: true,
            };
        }
        let act = Lit::positive(solver.new_var());
        let mut clause = vec![!act];
        clause.extend_from_slice(&undecided);
        solver.add_clause(&clause);

        let mut assumptions: Vec<Lit> = keep.to_vec();
        assumptions.extend_from_slice(&satisfied);
        assumptions.push(act);
        let verdict = solve_tracked(solver, &assumptions, &mut allowance, stats);
        solver.retire(act);
        match verdict {
            SolverVerdict::Sat => {
                let before = undecided.len();
                harvest(solver, &mut undecided, &mut satisfied);
                debug_assert!(undecided.len() < before);
            }
            SolverVerdict::Unsat => {
                return McsResult {
                    satisfied,
                    correction: undecided,
                    residual: Vec::new(),
                    status: EngineStatus::Proved,
                    saw_model: true,
                };
            }
            SolverVerdict::BudgetExceeded => {
                return McsResult {
                    satisfied,
                    correction: Vec::new(),
                    residual: undecided,
                    status: EngineStatus::Budget,
                    saw_model: true,
                };
            }
        }
    }
    McsResult {
        satisfied,
        correction: Vec::new(),
        residual: Vec::new(),
        status: EngineStatus::Proved,
        saw_model: true,
    }
}

/// Literal-based extraction: walk the softs one at a time, fixing those the
/// current model already satisfies, testing the rest individually.
pub fn lbx<S, D>(
    solver: &mut S,
    keep: &[Lit],
    softs: &[Lit],
    mut allowance: ConflictAllowance,
    expired: D,
    stats: &Stats,
) -> McsResult
where
    S: ConstraintSolver,
    D: Fn() -> bool,
{
    if expired() {
        return deadline_result(softs);
    }
    match solve_tracked(solver, keep, &mut allowance, stats) {
        SolverVerdict::Sat => {}
        SolverVerdict::Unsat => {
            return McsResult {
                satisfied: Vec::new(),
                correction: Vec::new(),
                residual: softs.to_vec(),
                status: EngineStatus::Infeasible,
                saw_model: false,
            }
        }
        SolverVerdict::BudgetExceeded => {
            return McsResult {
                satisfied: Vec::new(),
                correction: Vec::new(),
                residual: softs.to_vec(),
                status: EngineStatus::Budget,
                saw_model: false,
            }
        }
    }

    let mut satisfied: Vec<Lit> = Vec::new();
    let mut correction: Vec<Lit> = Vec::new();
    for (i, &l) in softs.iter().enumerate() {
        if lit_holds(solver, l) {
            satisfied.push(l);
            continue;
        }
        if expired() {
            return McsResult {
                satisfied,
                correction,
                residual: softs[i..].to_vec(),
                status: EngineStatus::Deadline,
                saw_model: true,
            };
        }
        if allowance.exhausted() {
            return McsResult {
                satisfied,
                correction,
                residual: softs[i..].to_vec(),
                status: EngineStatus::Budget,
                saw_model: true,
            };
        }
        let mut assumptions: Vec<Lit> = keep.to_vec();
        assumptions.extend_from_slice(&satisfied);
        assumptions.push(l);
        match solve_tracked(solver, &assumptions, &mut allowance, stats) {
            SolverVerdict::Sat => satisfied.push(l),
            SolverVerdict::Unsat => correction.push(l),
            SolverVerdict::BudgetExceeded => {
                return McsResult {
                    satisfied,
                    correction,
                    residual: softs[i..].to_vec(),
                    status: EngineStatus::Budget,
                    saw_model: true,
                };
            }
        }
    }
    // Re-witness keep ∪ satisfied: the last tested literal may have been
    // refuted, leaving the solver's model stale.
    if !correction.is_empty() && !lit_holds_all(solver, &satisfied) {
        let mut assumptions: Vec<Lit> = keep.to_vec();
        assumptions.extend_from_slice(&satisfied);
        match solve_tracked(solver, &assumptions, &mut allowance, stats) {
            SolverVerdict::Sat => {}
            _ => {
                return McsResult {
                    satisfied,
                    correction: Vec::new(),
                    residual: correction,
                    status: EngineStatus::Budget,
                    saw_model: false,
                }
            }
        }
    }
    McsResult {
        satisfied,
        correction,
        residual: Vec::new(),
        status: EngineStatus::Proved,
        saw_model: true,
    }
}

fn lit_holds_all<S: ConstraintSolver>(solver: &S, lits: &[Lit]) -> bool {
    lits.iter().all(|&l| lit_holds(solver, l))
}

fn harvest<S: ConstraintSolver>(solver: &S, undecided: &mut Vec<Lit>, satisfied: &mut Vec<Lit>) {
    let mut rest = Vec::with_capacity(undecided.len());
    for &l in undecided.iter() {
        if lit_holds(solver, l) {
            satisfied.push(l);
        } else {
            rest.push(l);
        }
    }
    *undecided = rest;
}

fn deadline_result(softs: &[Lit]) -> McsResult {
    McsResult {
        satisfied: Vec::new(),
        correction: Vec::new(),
        residual: softs.to_vec(),
        status: EngineStatus::Deadline,
        saw_model: false,
    }
}
