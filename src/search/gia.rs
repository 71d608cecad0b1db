//! The Guided Improvement Algorithm.
//!
//! Starting from any feasible model, each objective is tightened in turn
//! (`objᵢ` strictly better while every other dimension stays no worse) under
//! an activation literal, until no dimension can improve. The locally
//! non-improvable model is a Pareto point: it is archived, its dominating
//! cone is blocked, and the search restarts from a fresh model until the
//! solver refutes the residual space.

use crate::error::Result;
use crate::search::add_upper_bound;
use crate::search::driver::{ParetoDriver, SearchStatus};
use crate::solver::{ConstraintSolver, Lit, SolverVerdict};

impl ParetoDriver<'_> {
    pub(crate) fn step_gia(&mut self) -> Result<SearchStatus> {
        loop {
            if self.deadline.expired() {
                return Ok(SearchStatus::DeadlineReached);
            }
            match self.solve_plain(&[], None) {
                SolverVerdict::Unsat => return Ok(SearchStatus::Complete),
                SolverVerdict::BudgetExceeded => return Ok(SearchStatus::BudgetExhausted),
                SolverVerdict::Sat => {}
            }
            let mut vector = self.evaluate_model()?;

            'improve: loop {
                let mut improved = false;
                for tightened in self.dims() {
                    if self.deadline.expired() {
                        self.record_model()?;
                        return Ok(SearchStatus::DeadlineReached);
                    }
                    let act = Lit::positive(self.solver.new_var());
                    for dim in self.dims() {
                        let (terms, t) = self.dim_expr(dim, &vector)?;
                        let bound = if dim == tightened { t - 1 } else { t };
                        add_upper_bound(&mut self.solver, &terms, bound, Some(act))?;
                    }
                    let verdict = self.solve_plain(&[act], None);
                    self.solver.retire(act);
                    match verdict {
                        SolverVerdict::Sat => {
                            vector = self.evaluate_model()?;
                            improved = true;
                        }
                        SolverVerdict::Unsat => {}
                        SolverVerdict::BudgetExceeded => break 'improve,
                    }
                }
                if !improved {
                    break;
                }
            }

            let (vector, _, _) = self.record_model()?;
            self.add_cone(&vector)?;
            self.maybe_rebuild()?;
        }
    }
}
