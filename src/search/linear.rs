//! Single-objective optimization modes.
//!
//! `PBO` proves a lexicographically optimal placement: each dimension is
//! tightened to refutation under activation literals, then frozen at its
//! optimum before the next dimension is attacked. `LS` is a SAT-UNSAT
//! linear search on the reduced weighted sum of every objective. Both emit
//! one final model into the archive.

use crate::encoding::ObjectiveKind;
use crate::error::{CoreError, Result};
use crate::search::add_upper_bound;
use crate::search::driver::{ParetoDriver, SearchStatus};
use crate::solver::{ConstraintSolver, Lit, SolverVerdict};
use crate::util::rational::lcm;

impl ParetoDriver<'_> {
    pub(crate) fn step_pbo(&mut self) -> Result<SearchStatus> {
        if self.deadline.expired() {
            return Ok(SearchStatus::DeadlineReached);
        }
        match self.solve_plain(&[], None) {
            SolverVerdict::Unsat => return Ok(SearchStatus::Complete),
            SolverVerdict::BudgetExceeded => return Ok(SearchStatus::BudgetExhausted),
            SolverVerdict::Sat => {}
        }
        let mut vector = self.evaluate_model()?;

        for dim in self.dims() {
            let mut proved = false;
            while !proved {
                if self.deadline.expired() {
                    self.record_model()?;
                    return Ok(SearchStatus::DeadlineReached);
                }
                let (terms, t) = self.dim_expr(dim, &vector)?;
                let act = Lit::positive(self.solver.new_var());
                add_upper_bound(&mut self.solver, &terms, t - 1, Some(act))?;
                let verdict = self.solve_plain(&[act], None);
                self.solver.retire(act);
                match verdict {
                    SolverVerdict::Sat => vector = self.evaluate_model()?,
                    SolverVerdict::Unsat => proved = true,
                    SolverVerdict::BudgetExceeded => {
                        self.record_model()?;
                        return Ok(SearchStatus::BudgetExhausted);
                    }
                }
            }
            // freeze the proved dimension before tightening the next
            let (terms, t) = self.dim_expr(dim, &vector)?;
            add_upper_bound(&mut self.solver, &terms, t, None)?;
            debug!("dimension {dim:?} proved optimal");
        }
        self.record_model()?;
        Ok(SearchStatus::Complete)
    }

    pub(crate) fn step_ls(&mut self) -> Result<SearchStatus> {
        if self.deadline.expired() {
            return Ok(SearchStatus::DeadlineReached);
        }
        match self.solve_plain(&[], None) {
            SolverVerdict::Unsat => return Ok(SearchStatus::Complete),
            SolverVerdict::BudgetExceeded => return Ok(SearchStatus::BudgetExhausted),
            SolverVerdict::Sat => {}
        }

        let (terms, factors) = self.combined_objective()?;
        let mut value = self.combined_value(&factors)?;
        loop {
            if self.deadline.expired() {
                self.record_model()?;
                return Ok(SearchStatus::DeadlineReached);
            }
            let act = Lit::positive(self.solver.new_var());
            add_upper_bound(&mut self.solver, &terms, value - 1, Some(act))?;
            let verdict = self.solve_plain(&[act], None);
            self.solver.retire(act);
            match verdict {
                SolverVerdict::Sat => value = self.combined_value(&factors)?,
                SolverVerdict::Unsat => break,
                SolverVerdict::BudgetExceeded => {
                    self.record_model()?;
                    return Ok(SearchStatus::BudgetExhausted);
                }
            }
        }
        self.record_model()?;
        Ok(SearchStatus::Complete)
    }

    /// The weighted-sum scalarization `energy + wastage_num − wastage_den
    /// [+ migration]` on one common scale, and the per-dimension factors
    /// needed to evaluate it.
    fn combined_objective(&self) -> Result<(Vec<(Lit, i128)>, CombinedFactors)> {
        let objectives = &self.encoding.objectives;
        let energy = objectives.get(ObjectiveKind::Energy).unwrap();
        let num = objectives.get(ObjectiveKind::WastageNum).unwrap();
        let den = objectives.get(ObjectiveKind::WastageDen).unwrap();
        let mut scale = lcm(energy.denominator, num.denominator).ok_or(CoreError::EncodingOverflow)?;
        if !*self.options.ignore_den_alloc {
            scale = lcm(scale, den.denominator).ok_or(CoreError::EncodingOverflow)?;
        }

        let factors = CombinedFactors {
            energy: (scale / energy.denominator) as i128,
            num: (scale / num.denominator) as i128,
            den: if *self.options.ignore_den_alloc {
                0
            } else {
                (scale / den.denominator) as i128
            },
            migration: scale as i128,
        };

        let mut terms: Vec<(Lit, i128)> = Vec::new();
        for &(l, w) in &energy.terms {
            terms.push((l, w as i128 * factors.energy));
        }
        for &(l, w) in &num.terms {
            terms.push((l, w as i128 * factors.num));
        }
        if factors.den != 0 {
            for &(l, w) in &den.terms {
                terms.push((l, -(w as i128) * factors.den));
            }
        }
        if let Some(migration) = objectives.get(ObjectiveKind::Migration) {
            for &(l, w) in &migration.terms {
                terms.push((l, w as i128 * factors.migration));
            }
        }
        Ok((terms, factors))
    }

    fn combined_value(&self, factors: &CombinedFactors) -> Result<i128> {
        let objectives = &self.encoding.objectives;
        let model = |v| self.solver.value(v);
        let mut value = objectives.get(ObjectiveKind::Energy).unwrap().integer_value(&model)
            as i128
            * factors.energy;
        value += objectives.get(ObjectiveKind::WastageNum).unwrap().integer_value(&model) as i128
            * factors.num;
        if factors.den != 0 {
            value -= objectives.get(ObjectiveKind::WastageDen).unwrap().integer_value(&model)
                as i128
                * factors.den;
        }
        if let Some(migration) = objectives.get(ObjectiveKind::Migration) {
            value += migration.integer_value(&model) as i128 * factors.migration;
        }
        Ok(value)
    }
}

struct CombinedFactors {
    energy: i128,
    num: i128,
    den: i128,
    migration: i128,
}
