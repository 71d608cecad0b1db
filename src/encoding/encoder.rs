//! Translation of an instance into a pseudo-Boolean constraint system.
//!
//! Variable numbering is deterministic for a given instance and option set:
//! assignment variables x[v,p] in flattened-VM-major order, then one used
//! indicator y[p] per machine, then solver-internal auxiliaries. Every
//! satisfying assignment of the hard set corresponds to exactly one feasible
//! placement and evaluates to the reference objective values.

use crate::error::{CoreError, Result};
use crate::model::{Instance, Placement};
use crate::encoding::objective::{Objective, ObjectiveSet};
use crate::solver::{ConstraintSolver, Lit, PbLin, Var};
use crate::util::options::Options;
use crate::util::rational::Rational;
use itertools::Itertools;

/// The encoded form of one instance.
#[derive(Debug)]
pub struct Encoding {
    vm_count: usize,
    pm_count: usize,
    /// Hard clauses.
    pub clauses: Vec<Vec<Lit>>,
    /// Hard linear constraints.
    pub pbs: Vec<PbLin>,
    /// The objective functions.
    pub objectives: ObjectiveSet,
}

impl Encoding {
    /// The assignment variable "VM `flat` runs on PM position `pm`".
    pub fn x(&self, flat: usize, pm: usize) -> Var {
        debug_assert!(flat < self.vm_count && pm < self.pm_count);
        Var((flat * self.pm_count + pm) as u32)
    }

    /// The used indicator of PM position `pm`.
    pub fn y(&self, pm: usize) -> Var {
        debug_assert!(pm < self.pm_count);
        Var((self.vm_count * self.pm_count + pm) as u32)
    }

    /// Number of model variables (before solver auxiliaries).
    pub fn num_vars(&self) -> usize {
        self.vm_count * self.pm_count + self.pm_count
    }

    /// The assignment variables, the domain hashed by model enumeration.
    pub fn assignment_vars(&self) -> Vec<Var> {
        (0..self.vm_count * self.pm_count).map(|i| Var(i as u32)).collect()
    }

    /// Allocate the model variables in a fresh solver and add the hard set.
    pub fn load_into<S: ConstraintSolver>(&self, solver: &mut S) {
        for _ in 0..self.num_vars() {
            solver.new_var();
        }
        for clause in &self.clauses {
            solver.add_clause(clause);
        }
        for pb in &self.pbs {
            solver.add_pb(pb.clone());
        }
    }

    /// Read the placement out of a model.
    pub fn decode<F: Fn(Var) -> bool>(&self, model: &F) -> Placement {
        let mut out = Vec::with_capacity(self.vm_count);
        for v in 0..self.vm_count {
            let pm = (0..self.pm_count)
                .find(|&p| model(self.x(v, p)))
                .expect("model without an assignment for a VM");
            out.push(pm);
        }
        Placement(out)
    }

    /// The assumption literals that pin a whole placement.
    pub fn placement_literals(&self, placement: &Placement) -> Vec<Lit> {
        (0..self.vm_count)
            .map(|v| Lit::positive(self.x(v, placement.pm_of(v))))
            .collect()
    }
}

/// The instance-to-constraints translator.
pub struct Encoder;

impl Encoder {
    /// Encode `instance` under the given options.
    pub fn encode(instance: &Instance, options: &Options) -> Result<Encoding> {
        let vm_count = instance.vm_count();
        let pm_count = instance.pms().len();
        let mut enc = Encoding {
            vm_count,
            pm_count,
            clauses: Vec::new(),
            pbs: Vec::new(),
            objectives: ObjectiveSet::new(
                Objective::default(),
                Objective::default(),
                Objective::default(),
                None,
            ),
        };

        Self::check_feasibility(instance, options)?;

        // Platform and zero-capacity pins.
        for (flat, vm) in instance.vms().enumerate() {
            for (pos, pm) in instance.pms().iter().enumerate() {
                let banned = pm.is_zero_capacity()
                    || (!*options.ignore_platform && !vm.allows(pm.id));
                if banned {
                    enc.clauses.push(vec![Lit::negative(enc.x(flat, pos))]);
                }
            }
        }
        for (pos, pm) in instance.pms().iter().enumerate() {
            if pm.is_zero_capacity() {
                enc.clauses.push(vec![Lit::negative(enc.y(pos))]);
            }
        }

        // Exactly one machine per VM.
        for flat in 0..vm_count {
            let all: Vec<Lit> =
                (0..pm_count).map(|p| Lit::positive(enc.x(flat, p))).collect();
            enc.clauses.push(all.clone());
            if pm_count > 1 {
                enc.pbs.push(PbLin {
                    terms: all.iter().map(|&l| (!l, 1)).collect(),
                    bound: (pm_count - 1) as u64,
                });
            }
        }

        // Capacities.
        for (pos, pm) in instance.pms().iter().enumerate() {
            if pm.is_zero_capacity() {
                continue;
            }
            for (capacity, demand) in [
                (pm.cpu, instance.vms().map(|v| v.cpu).collect::<Vec<_>>()),
                (pm.mem, instance.vms().map(|v| v.mem).collect::<Vec<_>>()),
            ] {
                let total: u64 = demand.iter().sum();
                if total <= capacity {
                    continue;
                }
                enc.pbs.push(PbLin {
                    terms: demand
                        .iter()
                        .enumerate()
                        .map(|(flat, &d)| (Lit::negative(enc.x(flat, pos)), d))
                        .collect(),
                    bound: total - capacity,
                });
            }
        }

        // Anti-colocation: at most one flagged VM of a job per machine.
        if !*options.ignore_anti_colocation {
            for job in instance.jobs() {
                let group: Vec<usize> = job
                    .vms
                    .iter()
                    .filter(|v| v.anti_colocatable)
                    .map(|v| instance.flat_index(v.vm_ref()).unwrap())
                    .collect();
                if group.len() < 2 {
                    continue;
                }
                for pos in 0..pm_count {
                    if instance.pms()[pos].is_zero_capacity() {
                        continue;
                    }
                    enc.pbs.push(PbLin {
                        terms: group
                            .iter()
                            .map(|&flat| (Lit::negative(enc.x(flat, pos)), 1))
                            .collect(),
                        bound: (group.len() - 1) as u64,
                    });
                }
            }
        }

        // Used indicators, both directions.
        for (pos, pm) in instance.pms().iter().enumerate() {
            if pm.is_zero_capacity() {
                continue;
            }
            let y = enc.y(pos);
            let mut cover = vec![Lit::negative(y)];
            for flat in 0..vm_count {
                enc.clauses.push(vec![Lit::negative(enc.x(flat, pos)), Lit::positive(y)]);
                cover.push(Lit::positive(enc.x(flat, pos)));
            }
            enc.clauses.push(cover);
        }

        // Migration budget.
        let budget = instance.max_migration_memory(Some(*options.migration_percentile));
        if instance.has_mappings() {
            let mut stay_terms = Vec::new();
            let mut mapped_total = 0u64;
            for (flat, vm) in instance.vms().enumerate() {
                if let Some(cur) = instance.current_pm_position(flat) {
                    mapped_total += vm.mem;
                    stay_terms.push((Lit::positive(enc.x(flat, cur)), vm.mem));
                }
            }
            if mapped_total > budget {
                enc.pbs.push(PbLin { terms: stay_terms, bound: mapped_total - budget });
            }
        }

        // Lex chains over interchangeable machines.
        if *options.symmetry_breaking {
            let mut grouped: Vec<bool> = vec![false; pm_count];
            for pos in 0..pm_count {
                if grouped[pos] || instance.pms()[pos].is_zero_capacity() {
                    continue;
                }
                let twins: Vec<usize> = (pos..pm_count)
                    .filter(|&q| instance.pms()[q].is_twin_of(&instance.pms()[pos]))
                    .collect();
                for &q in &twins {
                    grouped[q] = true;
                }
                for (&a, &b) in twins.iter().tuple_windows() {
                    enc.clauses.push(vec![Lit::negative(enc.y(b)), Lit::positive(enc.y(a))]);
                }
            }
        }

        enc.objectives = Self::build_objectives(instance, &enc)?;
        Ok(enc)
    }

    fn check_feasibility(instance: &Instance, options: &Options) -> Result<()> {
        let usable_cpu: u64 =
            instance.pms().iter().filter(|p| !p.is_zero_capacity()).map(|p| p.cpu).sum();
        let usable_mem: u64 =
            instance.pms().iter().filter(|p| !p.is_zero_capacity()).map(|p| p.mem).sum();
        let demand_cpu: u64 = instance.vms().map(|v| v.cpu).sum();
        let demand_mem: u64 = instance.vms().map(|v| v.mem).sum();
        if demand_cpu > usable_cpu || demand_mem > usable_mem {
            return Err(CoreError::InstanceInfeasible(format!(
                "total demand {demand_cpu}/{demand_mem} exceeds usable capacity {usable_cpu}/{usable_mem}"
            )));
        }
        for vm in instance.vms() {
            let hostable = instance.pms().iter().any(|pm| {
                !pm.is_zero_capacity()
                    && (*options.ignore_platform || vm.allows(pm.id))
                    && vm.cpu <= pm.cpu
                    && vm.mem <= pm.mem
            });
            if !hostable {
                return Err(CoreError::InstanceInfeasible(format!(
                    "VM {}-{} has no machine it may run on",
                    vm.job, vm.index
                )));
            }
        }
        Ok(())
    }

    fn build_objectives(instance: &Instance, enc: &Encoding) -> Result<ObjectiveSet> {
        let mut energy = Vec::new();
        let mut wastage_num = Vec::new();
        let mut wastage_den = Vec::new();

        for (pos, pm) in instance.pms().iter().enumerate() {
            if pm.is_zero_capacity() {
                continue;
            }
            energy.push((Lit::positive(enc.y(pos)), pm.idle_cost));
            let span = pm.full_cost.checked_sub(&pm.idle_cost)?;
            let cpu_cap = cap_i64(pm.cpu)?;
            let mem_cap = cap_i64(pm.mem)?;
            for (flat, vm) in instance.vms().enumerate() {
                let x = Lit::positive(enc.x(flat, pos));
                let cpu_frac = Rational::new(cap_i64(vm.cpu)?, cpu_cap);
                let mem_frac = Rational::new(cap_i64(vm.mem)?, mem_cap);
                energy.push((x, cpu_frac.checked_mul(&span)?));
                wastage_num.push((x, cpu_frac.checked_sub(&mem_frac)?.abs()));
                wastage_den.push((x, cpu_frac.checked_add(&mem_frac)?));
            }
        }

        let migration = if instance.has_mappings() {
            let mut moved = Vec::new();
            for (flat, vm) in instance.vms().enumerate() {
                if let Some(cur) = instance.current_pm_position(flat) {
                    moved.push((
                        Lit::negative(enc.x(flat, cur)),
                        Rational::from_integer(cap_i64(vm.mem)?),
                    ));
                }
            }
            Some(Objective::from_rational_terms(moved)?)
        } else {
            None
        };

        Ok(ObjectiveSet::new(
            Objective::from_rational_terms(energy)?,
            Objective::from_rational_terms(wastage_num)?,
            Objective::from_rational_terms(wastage_den)?,
            migration,
        ))
    }
}

fn cap_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| CoreError::EncodingOverflow)
}
