//! Constraint-backed repair and improvement for evolutionary callers.
//!
//! A caller hands over a candidate placement, possibly infeasible. *Smart
//! mutation* fixes the candidate's assignments, unfixes a random fraction,
//! and asks the solver for a nearby feasible placement under a conflict
//! budget; on refutation it escalates to unfixing the variables whose values
//! contradict hard constraints, then to a full unfix. *Smart improvement*
//! drives a feasible candidate toward the Pareto front with a short
//! stratified Pareto-CLD seeded by the candidate's phases.
//!
//! The service borrows the encoder output and options re-entrantly and owns
//! its own solver, whose logging stays silenced while embedded.

use crate::encoding::Encoding;
use crate::error::Result;
use crate::model::{Instance, Placement};
use crate::search::mcs::{cld, ConflictAllowance, EngineStatus};
use crate::search::stratify::stratify;
use crate::solver::{CdclSolver, ConstraintSolver, Lit, SolverVerdict};
use crate::util::options::Options;
use crate::util::rng::{SeedBank, StreamId};
use crate::util::statistics::Stats;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;

/// What the service did with a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmartOutcome {
    /// The candidate was repaired to feasibility.
    Repaired(Placement),
    /// A feasible candidate was moved to a dominating neighbour.
    Improved(Placement),
    /// The candidate was already acceptable (or no better neighbour was
    /// found); keep it as is.
    Unchanged,
    /// The conflict budget ran out; keep the candidate as best effort.
    BudgetExceeded,
    /// No repair exists even with every variable unfixed; the caller should
    /// discard the individual.
    Infeasible,
}

/// The re-entrant smart-mutation / smart-improvement facade.
pub struct SmartService<'a> {
    instance: &'a Instance,
    encoding: &'a Encoding,
    options: &'a Options,
    stats: &'a Stats,
    solver: CdclSolver,
    rng: ChaCha8Rng,
}

impl<'a> SmartService<'a> {
    /// Build a service over a freshly loaded solver.
    pub fn new(
        instance: &'a Instance,
        encoding: &'a Encoding,
        options: &'a Options,
        stats: &'a Stats,
    ) -> SmartService<'a> {
        let mut solver = CdclSolver::new();
        encoding.load_into(&mut solver);
        solver.set_quiet(true);
        SmartService {
            instance,
            encoding,
            options,
            stats,
            solver,
            rng: SeedBank::new(*options.seed).stream(StreamId::SmartUnfix),
        }
    }

    fn migration_budget(&self) -> u64 {
        self.instance
            .max_migration_memory(Some(*self.options.migration_percentile))
    }

    /// Repair a candidate to feasibility, unfixing a random `rate` fraction
    /// of its assignments.
    pub fn mutate(&mut self, candidate: &Placement) -> Result<SmartOutcome> {
        assert_eq!(candidate.len(), self.instance.vm_count());
        Stats::inc(&self.stats.smart_mutations);
        let budget = self.migration_budget();
        if self.instance.check_placement(candidate, budget).is_ok() {
            if *self.options.smart_improvement {
                return self.improve(candidate);
            }
            return Ok(SmartOutcome::Unchanged);
        }

        let n = candidate.len();
        let share = (*self.options.smart_mutation_rate * n as f64).ceil() as usize;
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        let mut unfixed: BTreeSet<usize> = order.into_iter().take(share).collect();

        match self.try_repair(candidate, &unfixed) {
            SolverVerdict::Sat => return Ok(SmartOutcome::Repaired(self.decode_checked(budget))),
            SolverVerdict::BudgetExceeded => return Ok(SmartOutcome::BudgetExceeded),
            SolverVerdict::Unsat => {}
        }

        if !*self.options.disable_domain_unfixing {
            let violators = self.instance.violating_vms(candidate, budget);
            debug!("domain unfixing adds {} variables", violators.len());
            unfixed.extend(violators);
            match self.try_repair(candidate, &unfixed) {
                SolverVerdict::Sat => {
                    return Ok(SmartOutcome::Repaired(self.decode_checked(budget)))
                }
                SolverVerdict::BudgetExceeded => return Ok(SmartOutcome::BudgetExceeded),
                SolverVerdict::Unsat => {}
            }
        }

        // last resort: everything unfixed
        match self.solve_counted(&[], Some(*self.options.max_conflicts)) {
            SolverVerdict::Sat => Ok(SmartOutcome::Repaired(self.decode_checked(budget))),
            SolverVerdict::BudgetExceeded => Ok(SmartOutcome::BudgetExceeded),
            SolverVerdict::Unsat => Ok(SmartOutcome::Infeasible),
        }
    }

    /// Drive a feasible candidate toward the Pareto front; returns the best
    /// dominating neighbour found, or reports the candidate unchanged.
    pub fn improve(&mut self, candidate: &Placement) -> Result<SmartOutcome> {
        assert_eq!(candidate.len(), self.instance.vm_count());
        Stats::inc(&self.stats.smart_improvements);
        let budget = self.migration_budget();
        let base = self.instance.evaluate(candidate)?;

        // seed the solver with the candidate as a solution hint
        for (flat, &pm) in candidate.0.iter().enumerate() {
            for p in 0..self.instance.pms().len() {
                self.solver.set_polarity_hint(self.encoding.x(flat, p), p == pm);
            }
        }

        let n = candidate.len();
        let relax = (*self.options.improve_relax_rate * n as f64).ceil() as usize;
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);
        let relaxed: BTreeSet<usize> = order.into_iter().take(relax).collect();
        let mut keep: Vec<Lit> = (0..n)
            .filter(|v| !relaxed.contains(v))
            .map(|v| Lit::positive(self.encoding.x(v, candidate.pm_of(v))))
            .collect();

        let stream = self.encoding.objectives.division_merged(self.options)?;
        let partitions = stratify(stream, self.options);
        let mut remaining = *self.options.improve_max_conflicts;
        let mut pending: Vec<Lit> = Vec::new();
        let mut saw_model = false;
        for part in &partitions {
            if remaining == 0 {
                break;
            }
            let part_budget = match *self.options.part_max_conflicts {
                0 => remaining,
                n => n.min(remaining),
            };
            let mut softs = std::mem::take(&mut pending);
            softs.extend(part.literals());
            let spent_before = self.stats.conflicts.get();
            let result = cld(
                &mut self.solver,
                &keep,
                &softs,
                ConflictAllowance::new(Some(part_budget)),
                || false,
                self.stats,
            );
            remaining = remaining.saturating_sub(self.stats.conflicts.get() - spent_before);
            saw_model |= result.saw_model;
            keep.extend(result.satisfied);
            match result.status {
                EngineStatus::Proved => {}
                EngineStatus::Budget => pending = result.residual,
                EngineStatus::Deadline | EngineStatus::Infeasible => break,
            }
        }

        if !saw_model {
            return Ok(SmartOutcome::Unchanged);
        }
        let neighbour = self.decode_checked(budget);
        let vector = self.instance.evaluate(&neighbour)?;
        if vector.dominates(&base) {
            Ok(SmartOutcome::Improved(neighbour))
        } else {
            Ok(SmartOutcome::Unchanged)
        }
    }

    fn try_repair(&mut self, candidate: &Placement, unfixed: &BTreeSet<usize>) -> SolverVerdict {
        let assumptions: Vec<Lit> = (0..candidate.len())
            .filter(|v| !unfixed.contains(v))
            .map(|v| Lit::positive(self.encoding.x(v, candidate.pm_of(v))))
            .collect();
        self.solve_counted(&assumptions, Some(*self.options.max_conflicts))
    }

    fn solve_counted(&mut self, assumptions: &[Lit], budget: Option<u64>) -> SolverVerdict {
        self.solver.set_conflict_budget(budget);
        Stats::inc(&self.stats.solver_calls);
        let verdict = self.solver.solve(assumptions);
        Stats::add(&self.stats.conflicts, self.solver.last_call_conflicts());
        match verdict {
            SolverVerdict::Sat => Stats::inc(&self.stats.sat_calls),
            SolverVerdict::Unsat => Stats::inc(&self.stats.unsat_calls),
            SolverVerdict::BudgetExceeded => Stats::inc(&self.stats.budget_calls),
        }
        verdict
    }

    fn decode_checked(&self, budget: u64) -> Placement {
        let placement = self.encoding.decode(&|v| self.solver.value(v));
        debug_assert!(self.instance.check_placement(&placement, budget).is_ok());
        placement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoder;
    use crate::model::machine::{Job, Mappings, PhysicalMachine, VirtualMachine};
    use crate::model::Instance;
    use crate::util::rational::Rational;

    fn pm(id: usize, cpu: u64, mem: u64, idle: i64, full: i64) -> PhysicalMachine {
        PhysicalMachine {
            id,
            cpu,
            mem,
            idle_cost: Rational::from_integer(idle),
            full_cost: Rational::from_integer(full),
        }
    }

    fn vm(job: usize, index: usize, cpu: u64, mem: u64) -> VirtualMachine {
        VirtualMachine { job, index, cpu, mem, allowed: vec![], anti_colocatable: false }
    }

    fn two_machine_instance() -> Instance {
        Instance::new(
            vec![pm(0, 2, 2, 1, 2), pm(1, 2, 2, 1, 2)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 2), vm(0, 1, 2, 2)] }],
            Mappings::new(),
            1.0,
        )
        .unwrap()
    }

    fn service_for<'a>(
        instance: &'a Instance,
        options: &'a Options,
        encoding: &'a Encoding,
        stats: &'a Stats,
    ) -> SmartService<'a> {
        SmartService::new(instance, encoding, options, stats)
    }

    #[test]
    fn repair_fixes_an_overflowing_candidate() {
        let instance = two_machine_instance();
        let mut options = Options::default();
        assert!(options.set_bulk_from_command_line("smart_mutation_rate=0.5 seed=11"));
        let encoding = Encoder::encode(&instance, &options).unwrap();
        let stats = Stats::new();
        let mut service = service_for(&instance, &options, &encoding, &stats);
        // both VMs crammed onto machine 0
        let candidate = Placement(vec![0, 0]);
        match service.mutate(&candidate).unwrap() {
            SmartOutcome::Repaired(p) => {
                instance.check_placement(&p, 0).unwrap();
                assert_ne!(p, candidate);
            }
            other => panic!("expected a repair, got {other:?}"),
        }
    }

    #[test]
    fn feasible_candidate_is_returned_unchanged() {
        let instance = two_machine_instance();
        let options = Options::default();
        let encoding = Encoder::encode(&instance, &options).unwrap();
        let stats = Stats::new();
        let mut service = service_for(&instance, &options, &encoding, &stats);
        assert_eq!(
            service.mutate(&Placement(vec![0, 1])).unwrap(),
            SmartOutcome::Unchanged
        );
    }

    #[test]
    fn impossible_candidates_are_reported_infeasible() {
        // two VMs that cannot both be hosted anywhere
        let instance = Instance::new(
            vec![pm(0, 2, 2, 1, 2)],
            vec![Job {
                id: 0,
                vms: vec![
                    VirtualMachine { anti_colocatable: true, ..vm(0, 0, 1, 1) },
                    VirtualMachine { anti_colocatable: true, ..vm(0, 1, 1, 1) },
                ],
            }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        let options = Options::default();
        let encoding = Encoder::encode(&instance, &options).unwrap();
        let stats = Stats::new();
        let mut service = service_for(&instance, &options, &encoding, &stats);
        assert_eq!(
            service.mutate(&Placement(vec![0, 0])).unwrap(),
            SmartOutcome::Infeasible
        );
    }

    #[test]
    fn improvement_dominates_or_keeps_the_candidate() {
        // machine 1 is strictly cheaper; starting on machine 0 leaves room
        let instance = Instance::new(
            vec![pm(0, 4, 4, 2, 4), pm(1, 4, 4, 1, 2)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 2)] }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        let mut options = Options::default();
        assert!(options.set_bulk_from_command_line(
            "smart_improvement=true improve_relax_rate=1.0 improve_max_conflicts=100000 lit_weight_ratio=1"
        ));
        let encoding = Encoder::encode(&instance, &options).unwrap();
        let stats = Stats::new();
        let mut service = service_for(&instance, &options, &encoding, &stats);
        let candidate = Placement(vec![0]);
        match service.mutate(&candidate).unwrap() {
            SmartOutcome::Improved(p) => {
                let before = instance.evaluate(&candidate).unwrap();
                let after = instance.evaluate(&p).unwrap();
                assert!(after.dominates(&before));
            }
            SmartOutcome::Unchanged => panic!("a dominating neighbour exists"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
