//! Hash-based model enumeration.
//!
//! Random XOR parity constraints of expected density 1/2 slice the solution
//! space; enumerating a few models per slice and resampling yields
//! statistically diverse feasible placements. Slices are installed under
//! activation literals so a spent hash can be retired without rebuilding the
//! solver. Every enumerated model is blocked permanently, so rounds never
//! revisit a placement and the mode terminates once the space is exhausted.

use crate::error::Result;
use crate::search::driver::{ParetoDriver, SearchStatus};
use crate::solver::{ConstraintSolver, Lit, SolverVerdict, Var};
use crate::util::constants::MODELS_PER_HASH_SLICE;
use crate::util::statistics::Stats;
use rand::Rng;

/// Install `count` random parity constraints over `domain`, each guarded by
/// a fresh activation literal. Returns the activation literals to assume.
pub(crate) fn sample_slice<S: ConstraintSolver, R: Rng>(
    solver: &mut S,
    domain: &[Var],
    count: usize,
    rng: &mut R,
) -> Vec<Lit> {
    (0..count)
        .map(|_| {
            let vars: Vec<Var> = domain.iter().copied().filter(|_| rng.random_bool(0.5)).collect();
            let rhs = rng.random_bool(0.5);
            let act = Lit::positive(solver.new_var());
            solver.add_xor(&vars, rhs, Some(act));
            act
        })
        .collect()
}

impl ParetoDriver<'_> {
    pub(crate) fn step_he(&mut self) -> Result<SearchStatus> {
        let mut rng = self.seeds.stream(crate::util::rng::StreamId::Hashing);
        let domain = self.encoding.assignment_vars();
        loop {
            if self.deadline.expired() {
                return Ok(SearchStatus::DeadlineReached);
            }
            let acts = sample_slice(
                &mut self.solver,
                &domain,
                *self.options.hash_functions,
                &mut rng,
            );
            let mut found = 0usize;
            loop {
                if self.deadline.expired() {
                    for &act in &acts {
                        self.solver.retire(act);
                    }
                    return Ok(SearchStatus::DeadlineReached);
                }
                match self.solve_plain(&acts, None) {
                    SolverVerdict::Sat => {
                        let (_, placement, _) = self.record_model()?;
                        let block: Vec<Lit> = self
                            .encoding
                            .placement_literals(&placement)
                            .iter()
                            .map(|&l| !l)
                            .collect();
                        self.solver.add_clause(&block);
                        found += 1;
                        if found >= MODELS_PER_HASH_SLICE {
                            break;
                        }
                    }
                    SolverVerdict::Unsat | SolverVerdict::BudgetExceeded => break,
                }
            }
            for &act in &acts {
                self.solver.retire(act);
            }
            Stats::inc(&self.stats.hash_rounds);
            debug!("hash round closed with {found} models");
            if found == 0 {
                // distinguish a barren slice from an exhausted space
                if self.solve_plain(&[], None) == SolverVerdict::Unsat {
                    return Ok(SearchStatus::Complete);
                }
            }
        }
    }
}
