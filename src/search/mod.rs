//! The constraint-based Pareto search core: the driver state machine, the
//! MCS engines, stratification, the non-dominated archive and the smart
//! services offered to evolutionary callers.

pub mod archive;
pub mod driver;
pub mod gia;
pub mod hash;
pub mod linear;
pub mod mcs;
pub mod smart;
pub mod stratify;

pub use archive::{Archive, ArchiveEntry, InsertOutcome};
pub use driver::{ParetoDriver, SearchOutcome, SearchStatus};
pub use smart::{SmartOutcome, SmartService};

use crate::error::{CoreError, Result};
use crate::solver::{ConstraintSolver, Lit, PbLin, Var};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The global wall-clock budget. Polled before every solver call; on expiry
/// whatever partial result exists is frozen and returned.
#[derive(Debug, Clone)]
pub struct Deadline {
    start: Instant,
    limit: Duration,
}

impl Deadline {
    /// A deadline `seconds` from now.
    pub fn new(seconds: u64) -> Deadline {
        Deadline { start: Instant::now(), limit: Duration::from_secs(seconds) }
    }

    /// Whether the budget is spent.
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.limit
    }
}

/// Add `Σ termᵢ ≤ bound` over possibly-negative integer coefficients as a
/// normalized pseudo-Boolean constraint. With an activation literal the
/// constraint only binds while the literal holds. Coefficients that do not
/// fit the solver's integer range surface as [`CoreError::EncodingOverflow`].
pub(crate) fn add_upper_bound<S: ConstraintSolver>(
    solver: &mut S,
    terms: &[(Lit, i128)],
    bound: i128,
    activation: Option<Lit>,
) -> Result<()> {
    // Fold both polarities of each variable into one signed coefficient.
    let mut coeff: BTreeMap<u32, i128> = BTreeMap::new();
    let mut constant: i128 = 0;
    for &(l, c) in terms {
        if l.is_negative() {
            constant += c;
            *coeff.entry(l.var().0).or_insert(0) -= c;
        } else {
            *coeff.entry(l.var().0).or_insert(0) += c;
        }
    }
    let mut rhs = bound - constant;

    // Shift negative coefficients onto the complementary literal.
    let mut positive: Vec<(Lit, i128)> = Vec::with_capacity(coeff.len());
    for (var, c) in coeff {
        match c.cmp(&0) {
            std::cmp::Ordering::Greater => positive.push((Lit::positive(Var(var)), c)),
            std::cmp::Ordering::Less => {
                positive.push((Lit::negative(Var(var)), -c));
                rhs += -c;
            }
            std::cmp::Ordering::Equal => {}
        }
    }

    if rhs < 0 {
        // Unsatisfiable bound: binding it refutes the activation literal.
        match activation {
            Some(act) => solver.add_clause(&[!act]),
            None => solver.add_clause(&[]),
        }
        return Ok(());
    }
    let total: i128 = positive.iter().map(|t| t.1).sum();
    if rhs >= total {
        return Ok(());
    }

    // ≤ becomes ≥ on complemented literals.
    let need = total - rhs;
    let mut pb_terms: Vec<(Lit, u64)> = Vec::with_capacity(positive.len() + 1);
    for (l, a) in positive {
        let a = u64::try_from(a).map_err(|_| CoreError::EncodingOverflow)?;
        pb_terms.push((!l, a));
    }
    let need_u64 = u64::try_from(need).map_err(|_| CoreError::EncodingOverflow)?;
    if let Some(act) = activation {
        pb_terms.push((!act, need_u64));
    }
    solver.add_pb(PbLin { terms: pb_terms, bound: need_u64 });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{CdclSolver, SolverVerdict};

    #[test]
    fn upper_bound_restricts_models() {
        let mut s = CdclSolver::new();
        let x: Vec<Lit> = (0..3).map(|_| Lit::positive(s.new_var())).collect();
        // 2 x0 + 3 x1 + 5 x2 <= 5
        let terms: Vec<(Lit, i128)> = vec![(x[0], 2), (x[1], 3), (x[2], 5)];
        add_upper_bound(&mut s, &terms, 5, None).unwrap();
        assert_eq!(s.solve(&[x[0], x[1]]), SolverVerdict::Sat);
        assert!(!s.value(x[2].var()));
        assert_eq!(s.solve(&[x[0], x[2]]), SolverVerdict::Unsat);
    }

    #[test]
    fn negative_coefficients_are_normalized() {
        let mut s = CdclSolver::new();
        let x: Vec<Lit> = (0..2).map(|_| Lit::positive(s.new_var())).collect();
        // 3 x0 - 2 x1 <= 0: x0 implies x1
        let terms: Vec<(Lit, i128)> = vec![(x[0], 3), (x[1], -2)];
        add_upper_bound(&mut s, &terms, 0, None).unwrap();
        assert_eq!(s.solve(&[x[0], !x[1]]), SolverVerdict::Unsat);
        assert_eq!(s.solve(&[!x[0], !x[1]]), SolverVerdict::Sat);
    }

    #[test]
    fn activation_gates_the_bound() {
        let mut s = CdclSolver::new();
        let x = Lit::positive(s.new_var());
        let act = Lit::positive(s.new_var());
        add_upper_bound(&mut s, &[(x, 1)], 0, Some(act)).unwrap();
        assert_eq!(s.solve(&[act, x]), SolverVerdict::Unsat);
        assert_eq!(s.solve(&[x]), SolverVerdict::Sat);
    }

    #[test]
    fn impossible_bound_refutes_activation() {
        let mut s = CdclSolver::new();
        let x = Lit::positive(s.new_var());
        let act = Lit::positive(s.new_var());
        // -1 is below any achievable sum
        add_upper_bound(&mut s, &[(x, 1)], -1, Some(act)).unwrap();
        assert_eq!(s.solve(&[act]), SolverVerdict::Unsat);
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
    }

    #[test]
    fn mixed_polarities_merge_per_variable() {
        let mut s = CdclSolver::new();
        let x = Lit::positive(s.new_var());
        // 2 x + 3 ¬x <= 2 forces x true
        add_upper_bound(&mut s, &[(x, 2), (!x, 3)], 2, None).unwrap();
        assert_eq!(s.solve(&[]), SolverVerdict::Sat);
        assert!(s.value(x.var()));
        assert_eq!(s.solve(&[!x]), SolverVerdict::Unsat);
    }
}
