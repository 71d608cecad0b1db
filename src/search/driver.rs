//! The Pareto search driver: one state machine shared by every algorithm
//! flavour.
//!
//! The driver owns the solver, the non-dominated archive and the global
//! deadline. Algorithm variants differ only in their step function, selected
//! by [`AlgorithmSelector`]; they share model recording, dominance-cone
//! blocking, hash-slice handling and the blocking-clause rebuild policy.

use crate::encoding::{Encoding, ObjectiveKind};
use crate::error::{CoreError, Result};
use crate::model::{Instance, ObjectiveVector, Placement};
use crate::search::archive::{Archive, InsertOutcome};
use crate::search::mcs::{cld, lbx, ConflictAllowance, EngineStatus};
use crate::search::stratify::{single_partition, stratify, Partition};
use crate::search::{add_upper_bound, hash, Deadline};
use crate::solver::{CdclSolver, ConstraintSolver, Lit, SolverVerdict};
use crate::util::options::{AlgorithmSelector, Options, StratifyMode};
use crate::util::rational::Rational;
use crate::util::rng::{SeedBank, StreamId};
use crate::util::statistics::Stats;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// How a search run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    /// The Pareto front under the encoding is exhausted.
    Complete,
    /// The global deadline expired; the archive holds the partial result.
    DeadlineReached,
    /// Conflict budgets were exhausted without further progress.
    BudgetExhausted,
}

/// The frozen result of one run.
#[derive(Debug)]
pub struct SearchOutcome {
    /// The non-dominated archive, in discovery order.
    pub archive: Archive,
    /// Terminal status.
    pub status: SearchStatus,
}

/// One objective dimension as the driver bounds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dim {
    Energy,
    Wastage,
    Migration,
}

/// The shared driver state.
pub struct ParetoDriver<'a> {
    pub(crate) instance: &'a Instance,
    pub(crate) encoding: &'a Encoding,
    pub(crate) options: &'a Options,
    pub(crate) stats: &'a Stats,
    pub(crate) solver: CdclSolver,
    pub(crate) archive: Archive,
    pub(crate) deadline: Deadline,
    pub(crate) seeds: SeedBank,
    cones: usize,
}

impl<'a> std::fmt::Debug for ParetoDriver<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParetoDriver").finish_non_exhaustive()
    }
}

impl<'a> ParetoDriver<'a> {
    /// Build a driver over a loaded solver. Rejects option combinations the
    /// algorithms cannot honor.
    pub fn new(
        instance: &'a Instance,
        encoding: &'a Encoding,
        options: &'a Options,
        stats: &'a Stats,
    ) -> Result<ParetoDriver<'a>> {
        if *options.algorithm == AlgorithmSelector::PLBX && *options.hash_functions > 0 {
            return Err(CoreError::UnsupportedConfiguration(
                "hash functions cannot be combined with the LBX extractor".into(),
            ));
        }
        let mut solver = CdclSolver::new();
        encoding.load_into(&mut solver);
        Ok(ParetoDriver {
            instance,
            encoding,
            options,
            stats,
            solver,
            archive: Archive::new(),
            deadline: Deadline::new(*options.time_limit),
            seeds: SeedBank::new(*options.seed),
            cones: 0,
        })
    }

    /// Run the selected algorithm to its terminal status.
    pub fn run(&mut self) -> Result<SearchOutcome> {
        self.stats.start_run();
        info!(
            "starting {:?} over {} VMs and {} PMs",
            *self.options.algorithm,
            self.instance.vm_count(),
            self.instance.pms().len()
        );
        let status = match *self.options.algorithm {
            AlgorithmSelector::MCS => self.step_pareto_mcs(false, false),
            AlgorithmSelector::PCLD => self.step_pareto_mcs(false, true),
            AlgorithmSelector::PLBX => self.step_pareto_mcs(true, true),
            AlgorithmSelector::GIA => self.step_gia(),
            AlgorithmSelector::HE => self.step_he(),
            AlgorithmSelector::PBO => self.step_pbo(),
            AlgorithmSelector::LS => self.step_ls(),
        }?;
        self.stats.stop_run();
        info!("search ended {:?} with {} archive entries", status, self.archive.len());
        Ok(SearchOutcome { archive: std::mem::take(&mut self.archive), status })
    }

    /// One budgeted, counted solver call.
    pub(crate) fn solve_plain(&mut self, assumptions: &[Lit], budget: Option<u64>) -> SolverVerdict {
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

    /// Evaluate the solver's model without touching the archive.
    pub(crate) fn evaluate_model(&self) -> Result<ObjectiveVector> {
        self.encoding
            .objectives
            .evaluate(&|v| self.solver.value(v), *self.options.ignore_den_eval)
    }

    /// Decode, evaluate and archive the solver's model.
    pub(crate) fn record_model(&mut self) -> Result<(ObjectiveVector, Placement, InsertOutcome)> {
        let placement = self.encoding.decode(&|v| self.solver.value(v));
        let vector = self.evaluate_model()?;
        Stats::inc(&self.stats.models);
        #[cfg(debug_assertions)]
        self.audit_model(&placement, &vector);
        let outcome = self.archive.insert(vector.clone(), placement.clone());
        match outcome {
            InsertOutcome::Inserted => {
                Stats::inc(&self.stats.archive_inserted);
                debug!("archived {} (now {} entries)", summary(&vector), self.archive.len());
            }
            _ => Stats::inc(&self.stats.archive_rejected),
        }
        Ok((vector, placement, outcome))
    }

    #[cfg(debug_assertions)]
    fn audit_model(&self, placement: &Placement, vector: &ObjectiveVector) {
        let relaxed = *self.options.ignore_platform
            || *self.options.ignore_anti_colocation
            || *self.options.ignore_den_eval;
        if relaxed {
            return;
        }
        let budget = self
            .instance
            .max_migration_memory(Some(*self.options.migration_percentile));
        if let Err(e) = self.instance.check_placement(placement, budget) {
            panic!("decoded model violates the instance: {e}");
        }
        let reference = self.instance.evaluate(placement).expect("reference evaluation");
        assert_eq!(reference, *vector, "encoded objectives diverge from the reference");
    }

    /// The bounded dimensions of this run, migration last.
    pub(crate) fn dims(&self) -> Vec<Dim> {
        let mut dims = vec![Dim::Energy, Dim::Wastage];
        if self.encoding.objectives.has_migration() {
            dims.push(Dim::Migration);
        }
        dims
    }

    /// The linear expression and threshold of one dimension at a vector:
    /// `expr ≤ T` is "no worse than the vector", `expr ≤ T − 1` is "strictly
    /// better".
    pub(crate) fn dim_expr(
        &self,
        dim: Dim,
        vector: &ObjectiveVector,
    ) -> Result<(Vec<(Lit, i128)>, i128)> {
        let objectives = &self.encoding.objectives;
        match dim {
            Dim::Energy => {
                let energy = objectives.get(ObjectiveKind::Energy).unwrap();
                let t = scale_to(&vector.energy, energy.denominator)?;
                let terms = widen(&energy.terms, 1);
                Ok((terms, t))
            }
            Dim::Wastage => {
                let num = objectives.get(ObjectiveKind::WastageNum).unwrap();
                if *self.options.ignore_den_eval {
                    let t = scale_to(&vector.wastage, num.denominator)?;
                    return Ok((widen(&num.terms, 1), t));
                }
                let den = objectives.get(ObjectiveKind::WastageDen).unwrap();
                // wastage' ≤ n/d is linear after cross-multiplication:
                // N'·den_D·d − D'·den_N·n ≤ 0
                let n = vector.wastage.numerator() as i128;
                let d = vector.wastage.denominator() as i128;
                let mut terms = widen(&num.terms, den.denominator as i128 * d);
                terms.extend(widen(&den.terms, -(num.denominator as i128) * n));
                Ok((terms, 0))
            }
            Dim::Migration => {
                let migration = objectives.get(ObjectiveKind::Migration).unwrap();
                let t = vector.migration.expect("migration dimension without a mapping") as i128;
                Ok((widen(&migration.terms, 1), t))
            }
        }
    }

    /// Block the dominating cone of a vector: at least one dimension must be
    /// strictly better in any future model. Dimensions that cannot improve
    /// contribute a refuted enabler; once every dimension is refuted the
    /// next base solve is unsatisfiable and the front is complete.
    pub(crate) fn add_cone(&mut self, vector: &ObjectiveVector) -> Result<()> {
        let mut enablers: Vec<Lit> = Vec::new();
        for dim in self.dims() {
            let (terms, t) = self.dim_expr(dim, vector)?;
            let b = Lit::positive(self.solver.new_var());
            add_upper_bound(&mut self.solver, &terms, t - 1, Some(b))?;
            enablers.push(b);
        }
        self.solver.add_clause(&enablers);
        self.cones += 1;
        Stats::inc(&self.stats.blockings);
        Ok(())
    }

    /// Rebuild the solver from the encoding plus the archive's cones once
    /// blocking constraints accumulate past the threshold.
    pub(crate) fn maybe_rebuild(&mut self) -> Result<()> {
        if self.cones <= *self.options.rebuild_threshold {
            return Ok(());
        }
        info!("rebuilding solver after {} blocking constraints", self.cones);
        Stats::inc(&self.stats.rebuilds);
        self.solver = CdclSolver::new();
        self.encoding.load_into(&mut self.solver);
        let vectors: Vec<ObjectiveVector> =
            self.archive.iter().map(|e| e.vector.clone()).collect();
        for v in &vectors {
            self.add_cone(v)?;
        }
        self.cones = 0;
        Ok(())
    }

    fn partition_allowance(&self) -> Option<u64> {
        // part_max_conflicts = 0 means no per-partition limit
        match *self.options.part_max_conflicts {
            0 => None,
            n => Some(n),
        }
    }

    /// Assemble this iteration's ordered partitions.
    fn build_partitions(&self, stratified: bool, split_rng: &mut ChaCha8Rng) -> Result<Vec<Partition>> {
        let objectives = &self.encoding.objectives;
        if !stratified || *self.options.stratify == StratifyMode::Off {
            return Ok(single_partition(objectives.division_merged(self.options)?));
        }
        match *self.options.stratify {
            StratifyMode::Merged => Ok(stratify(objectives.division_merged(self.options)?, self.options)),
            StratifyMode::Split => {
                let (minimized, denominator) = objectives.division_split(self.options)?;
                let a = stratify(minimized, self.options);
                let b = stratify(denominator, self.options);
                Ok(interleave_by_weight(a, b, split_rng))
            }
            StratifyMode::Off => unreachable!(),
        }
    }

    /// The shared Pareto-MCS loop (CLD and LBX flavours).
    pub(crate) fn step_pareto_mcs(&mut self, use_lbx: bool, stratified: bool) -> Result<SearchStatus> {
        let mut lbx_rng = self.seeds.stream(StreamId::LbxOrder);
        let mut div_rng = self.seeds.stream(StreamId::Diversification);
        let mut split_rng = self.seeds.stream(StreamId::DivisionSplit);
        let mut hash_rng = self.seeds.stream(StreamId::Hashing);

        loop {
            if self.deadline.expired() {
                return Ok(SearchStatus::DeadlineReached);
            }
            let mut partitions = self.build_partitions(stratified, &mut split_rng)?;
            if partitions.is_empty() {
                // no soft terms (e.g. an empty instance): a bare base solve
                // still yields the one placement
                partitions.push(Partition::default());
            }
            for part in &mut partitions {
                if use_lbx {
                    part.terms.shuffle(&mut lbx_rng);
                } else if *self.options.path_diversification && !part.terms.is_empty() {
                    let k = div_rng.random_range(0..part.terms.len());
                    part.terms.rotate_left(k);
                }
            }
            if *self.options.path_diversification && !use_lbx {
                // seed the phases from an archived witness so successive
                // extractions leave from different faces of the front
                let witness = self.archive.sample(&mut div_rng).map(|e| e.witness.clone());
                if let Some(witness) = witness {
                    for (flat, &pm) in witness.0.iter().enumerate() {
                        for p in 0..self.instance.pms().len() {
                            self.solver.set_polarity_hint(self.encoding.x(flat, p), p == pm);
                        }
                    }
                }
            }

            let hash_acts = if *self.options.hash_functions > 0 {
                hash::sample_slice(
                    &mut self.solver,
                    &self.encoding.assignment_vars(),
                    *self.options.hash_functions,
                    &mut hash_rng,
                )
            } else {
                Vec::new()
            };

            let mut keep: Vec<Lit> = hash_acts.clone();
            let mut pending: Vec<Lit> = Vec::new();
            let mut saw_model = false;
            let mut infeasible = false;
            let mut deadline_hit = false;

            for part in &partitions {
                if self.deadline.expired() {
                    deadline_hit = true;
                    break;
                }
                let mut softs = std::mem::take(&mut pending);
                softs.extend(part.literals());
                let allowance = ConflictAllowance::new(self.partition_allowance());
                let dl = self.deadline.clone();
                Stats::inc(&self.stats.partitions);
                let result = if use_lbx {
                    lbx(&mut self.solver, &keep, &softs, allowance, move || dl.expired(), self.stats)
                } else {
                    cld(&mut self.solver, &keep, &softs, allowance, move || dl.expired(), self.stats)
                };
                saw_model |= result.saw_model;
                keep.extend(result.satisfied);
                match result.status {
                    EngineStatus::Proved => {}
                    EngineStatus::Budget => {
                        Stats::inc(&self.stats.partition_folds);
                        debug!("partition folded after budget exhaustion");
                        pending = result.residual;
                    }
                    EngineStatus::Deadline => {
                        deadline_hit = true;
                        break;
                    }
                    EngineStatus::Infeasible => {
                        infeasible = true;
                        break;
                    }
                }
            }

            for &act in &hash_acts {
                self.solver.retire(act);
            }

            if infeasible {
                if hash_acts.is_empty() {
                    return Ok(SearchStatus::Complete);
                }
                // an empty hash slice says nothing about the front
                continue;
            }
            if !saw_model {
                return Ok(if deadline_hit || self.deadline.expired() {
                    SearchStatus::DeadlineReached
                } else {
                    SearchStatus::BudgetExhausted
                });
            }
            let (vector, _, _) = self.record_model()?;
            if deadline_hit {
                return Ok(SearchStatus::DeadlineReached);
            }
            self.add_cone(&vector)?;
            self.maybe_rebuild()?;
        }
    }
}

fn widen(terms: &[(Lit, i64)], factor: i128) -> Vec<(Lit, i128)> {
    terms.iter().map(|&(l, w)| (l, w as i128 * factor)).collect()
}

fn scale_to(value: &Rational, denominator: i64) -> Result<i128> {
    // objective values are produced on this denominator, so it divides evenly
    debug_assert_eq!(denominator % value.denominator(), 0);
    Ok(value.numerator() as i128 * (denominator / value.denominator()) as i128)
}

fn summary(v: &ObjectiveVector) -> String {
    match v.migration {
        Some(m) => format!("e {:.5} w {:.5} m {}", v.energy.to_f64(), v.wastage.to_f64(), m),
        None => format!("e {:.5} w {:.5}", v.energy.to_f64(), v.wastage.to_f64()),
    }
}

/// Interleave two partition streams, drawing from each with probability
/// proportional to its remaining weight.
fn interleave_by_weight(
    a: Vec<Partition>,
    b: Vec<Partition>,
    rng: &mut ChaCha8Rng,
) -> Vec<Partition> {
    let mut a = std::collections::VecDeque::from(a);
    let mut b = std::collections::VecDeque::from(b);
    let mut wa: u64 = a.iter().map(|p| p.weight()).sum();
    let mut wb: u64 = b.iter().map(|p| p.weight()).sum();
    let mut out = Vec::with_capacity(a.len() + b.len());
    while !a.is_empty() || !b.is_empty() {
        let take_a = if a.is_empty() {
            false
        } else if b.is_empty() {
            true
        } else {
            let threshold = wa as f64 / (wa + wb) as f64;
            rng.random::<f64>() < threshold
        };
        if take_a {
            let p = a.pop_front().unwrap();
            wa -= p.weight();
            out.push(p);
        } else {
            let p = b.pop_front().unwrap();
            wb -= p.weight();
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::Encoder;
    use crate::model::machine::{Job, Mappings, PhysicalMachine, VirtualMachine};

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

    fn run_with(instance: &Instance, pairs: &str) -> SearchOutcome {
        let mut options = Options::default();
        assert!(options.set_bulk_from_command_line(pairs));
        let encoding = Encoder::encode(instance, &options).unwrap();
        let stats = Stats::new();
        let mut driver = ParetoDriver::new(instance, &encoding, &options, &stats).unwrap();
        driver.run().unwrap()
    }

    fn singleton() -> Instance {
        Instance::new(
            vec![pm(0, 4, 4, 1, 3)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 1, 1)] }],
            Mappings::new(),
            1.0,
        )
        .unwrap()
    }

    #[test]
    fn singleton_front_is_one_point() {
        for algo in ["MCS", "PCLD", "PLBX", "GIA", "PBO", "LS"] {
            let outcome = run_with(&singleton(), &format!("algorithm={algo}"));
            assert_eq!(outcome.status, SearchStatus::Complete, "{algo}");
            assert_eq!(outcome.archive.len(), 1, "{algo}");
            let entry = outcome.archive.iter().next().unwrap();
            assert_eq!(entry.vector.energy, Rational::new(3, 2), "{algo}");
            assert_eq!(entry.vector.wastage, Rational::ZERO, "{algo}");
            assert_eq!(entry.witness.0, vec![0], "{algo}");
        }
    }

    #[test]
    fn empty_instance_has_the_empty_placement() {
        let instance = Instance::new(vec![], vec![], Mappings::new(), 1.0).unwrap();
        let outcome = run_with(&instance, "algorithm=PCLD");
        assert_eq!(outcome.status, SearchStatus::Complete);
        assert_eq!(outcome.archive.len(), 1);
        let entry = outcome.archive.iter().next().unwrap();
        assert_eq!(entry.vector.energy, Rational::ZERO);
        assert_eq!(entry.vector.wastage, Rational::ZERO);
        assert!(entry.witness.is_empty());
    }

    #[test]
    fn heterogeneous_instance_trades_energy_for_wastage() {
        // one lopsided machine (cheap) and one balanced machine (pricey)
        let instance = Instance::new(
            vec![pm(0, 8, 2, 1, 2), pm(1, 4, 4, 2, 4)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 2, 2)] }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        let outcome = run_with(&instance, "algorithm=PCLD");
        assert_eq!(outcome.status, SearchStatus::Complete);
        assert!(outcome.archive.len() >= 2);
        let entries: Vec<_> = outcome.archive.iter().collect();
        for a in &entries {
            for b in &entries {
                assert!(!a.vector.dominates(&b.vector));
            }
        }
    }

    #[test]
    fn discovery_order_is_reproducible() {
        let instance = Instance::new(
            vec![pm(0, 4, 4, 1, 3), pm(1, 4, 2, 1, 2), pm(2, 2, 4, 2, 3)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 1, 2), vm(0, 1, 2, 1), vm(0, 2, 1, 1)] }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        for pairs in [
            "algorithm=PCLD seed=3 stratify=Merged",
            "algorithm=PLBX seed=3 stratify=Split",
            "algorithm=GIA seed=3",
        ] {
            let a = run_with(&instance, pairs);
            let b = run_with(&instance, pairs);
            assert_eq!(a.status, b.status, "{pairs}");
            let va: Vec<_> = a.archive.iter().map(|e| e.vector.clone()).collect();
            let vb: Vec<_> = b.archive.iter().map(|e| e.vector.clone()).collect();
            assert_eq!(va, vb, "{pairs}");
        }
    }

    #[test]
    fn all_algorithms_agree_on_validity() {
        let instance = Instance::new(
            vec![pm(0, 4, 4, 1, 3), pm(1, 6, 2, 1, 2)],
            vec![Job {
                id: 0,
                vms: vec![
                    VirtualMachine { anti_colocatable: true, ..vm(0, 0, 2, 1) },
                    VirtualMachine { anti_colocatable: true, ..vm(0, 1, 1, 1) },
                    vm(0, 2, 1, 1),
                ],
            }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        for algo in ["MCS", "PCLD", "PLBX", "GIA", "HE", "PBO", "LS"] {
            let outcome = run_with(&instance, &format!("algorithm={algo} time_limit=60"));
            assert!(!outcome.archive.is_empty(), "{algo}");
            for entry in outcome.archive.iter() {
                instance
                    .check_placement(&entry.witness, instance.max_migration_memory(None))
                    .unwrap_or_else(|e| panic!("{algo}: {e}"));
                assert_eq!(instance.evaluate(&entry.witness).unwrap(), entry.vector, "{algo}");
            }
        }
    }

    #[test]
    fn lbx_with_hash_functions_is_rejected() {
        let instance = singleton();
        let mut options = Options::default();
        assert!(options.set_bulk_from_command_line("algorithm=PLBX hash_functions=2"));
        let encoding = Encoder::encode(&instance, &options).unwrap();
        let stats = Stats::new();
        let err = ParetoDriver::new(&instance, &encoding, &options, &stats).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedConfiguration(_)));
    }
}
