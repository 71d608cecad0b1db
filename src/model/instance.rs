//! A consolidation problem instance and the reference objective formulae.

use crate::error::{CoreError, Result};
use crate::model::machine::{Job, Mappings, PhysicalMachine, PmId, VirtualMachine, VmRef};
use crate::util::rational::Rational;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An assignment of every VM (in flattened job order) to a PM position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placement(pub Vec<usize>);

impl Placement {
    /// PM position hosting the VM at the given flat index.
    pub fn pm_of(&self, flat: usize) -> usize {
        self.0[flat]
    }

    /// Number of placed VMs.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the placement is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One point in objective space. Migration is absent when the instance has
/// no current mappings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectiveVector {
    /// Total energy cost.
    pub energy: Rational,
    /// Resource wastage.
    pub wastage: Rational,
    /// Total memory moved, when a current mapping exists.
    pub migration: Option<u64>,
}

impl ObjectiveVector {
    /// Componentwise comparison: `self` dominates `other` when it is no
    /// worse in every objective and strictly better in at least one.
    pub fn dominates(&self, other: &ObjectiveVector) -> bool {
        debug_assert_eq!(self.migration.is_some(), other.migration.is_some());
        let mut strict = false;
        for ord in [self.energy.cmp(&other.energy), self.wastage.cmp(&other.wastage)] {
            match ord {
                Ordering::Greater => return false,
                Ordering::Less => strict = true,
                Ordering::Equal => {}
            }
        }
        if let (Some(a), Some(b)) = (self.migration, other.migration) {
            match a.cmp(&b) {
                Ordering::Greater => return false,
                Ordering::Less => strict = true,
                Ordering::Equal => {}
            }
        }
        strict
    }
}

/// A full problem instance: machines, jobs, the current allocation and the
/// migration budget fraction.
#[derive(Debug, Clone)]
pub struct Instance {
    pms: Vec<PhysicalMachine>,
    jobs: Vec<Job>,
    mappings: Mappings,
    migration_percentile: f64,
    pm_positions: BTreeMap<PmId, usize>,
    flat: Vec<VmRef>,
    flat_positions: BTreeMap<VmRef, usize>,
}

impl Instance {
    /// Bundle machines, jobs and mappings into an instance.
    ///
    /// Rejects duplicate PM ids, non-positive VM demands, mappings that name
    /// unknown VMs or PMs, and budget fractions outside `[0, 1]`.
    pub fn new(
        pms: Vec<PhysicalMachine>,
        jobs: Vec<Job>,
        mappings: Mappings,
        migration_percentile: f64,
    ) -> Result<Instance> {
        if !(0.0..=1.0).contains(&migration_percentile) {
            return Err(CoreError::InstanceInfeasible(format!(
                "migration percentile {migration_percentile} outside [0, 1]"
            )));
        }
        let mut pm_positions = BTreeMap::new();
        for (pos, pm) in pms.iter().enumerate() {
            if pm_positions.insert(pm.id, pos).is_some() {
                return Err(CoreError::InstanceInfeasible(format!("duplicate PM id {}", pm.id)));
            }
            if pm.full_cost < pm.idle_cost {
                return Err(CoreError::InstanceInfeasible(format!(
                    "PM {} has a full-load cost below its idle cost",
                    pm.id
                )));
            }
        }
        let mut flat = Vec::new();
        let mut flat_positions = BTreeMap::new();
        for job in &jobs {
            for (pos, vm) in job.vms.iter().enumerate() {
                if vm.job != job.id || vm.index != pos {
                    return Err(CoreError::InstanceInfeasible(format!(
                        "VM {}-{} is keyed inconsistently with its job",
                        vm.job, vm.index
                    )));
                }
                if vm.cpu == 0 || vm.mem == 0 {
                    return Err(CoreError::InstanceInfeasible(format!(
                        "VM {}-{} has a non-positive demand",
                        vm.job, vm.index
                    )));
                }
                flat_positions.insert(vm.vm_ref(), flat.len());
                flat.push(vm.vm_ref());
            }
        }
        for (vm, pm) in mappings.iter() {
            if !flat_positions.contains_key(&vm) {
                return Err(CoreError::InstanceInfeasible(format!(
                    "mapping names unknown VM {}-{}",
                    vm.job, vm.index
                )));
            }
            if !pm_positions.contains_key(&pm) {
                return Err(CoreError::InstanceInfeasible(format!(
                    "mapping names unknown PM {pm}"
                )));
            }
        }
        Ok(Instance { pms, jobs, mappings, migration_percentile, pm_positions, flat, flat_positions })
    }

    /// The physical machines, in instance order.
    pub fn pms(&self) -> &[PhysicalMachine] {
        &self.pms
    }

    /// The jobs, in instance order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// The current allocation.
    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    /// Whether a current allocation exists (and migration is an objective).
    pub fn has_mappings(&self) -> bool {
        !self.mappings.is_empty()
    }

    /// The migration budget fraction recorded in the instance.
    pub fn migration_percentile(&self) -> f64 {
        self.migration_percentile
    }

    /// Number of VMs across all jobs.
    pub fn vm_count(&self) -> usize {
        self.flat.len()
    }

    /// All VMs in flattened job order.
    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.jobs.iter().flat_map(|j| j.vms.iter())
    }

    /// The VM at a flat index.
    pub fn vm_at(&self, flat: usize) -> &VirtualMachine {
        let r = self.flat[flat];
        let job = self.jobs.iter().find(|j| j.id == r.job).unwrap();
        &job.vms[r.index]
    }

    /// Flat index of a VM key.
    pub fn flat_index(&self, vm: VmRef) -> Option<usize> {
        self.flat_positions.get(&vm).copied()
    }

    /// Position of a PM id within `pms()`.
    pub fn pm_position(&self, id: PmId) -> Option<usize> {
        self.pm_positions.get(&id).copied()
    }

    /// Total memory capacity over all PMs.
    pub fn total_mem_capacity(&self) -> u64 {
        self.pms.iter().map(|p| p.mem).sum()
    }

    /// Maximum memory that may be moved, `floor(fraction × total memory)`.
    /// A non-negative `override_fraction` takes precedence over the
    /// instance's own fraction.
    pub fn max_migration_memory(&self, override_fraction: Option<f64>) -> u64 {
        let fraction = match override_fraction {
            Some(f) if f >= 0.0 => f,
            _ => self.migration_percentile,
        };
        (fraction * self.total_mem_capacity() as f64).floor() as u64
    }

    /// Current PM position of a flat VM index, if mapped.
    pub fn current_pm_position(&self, flat: usize) -> Option<usize> {
        let vm = self.flat[flat];
        self.mappings.get(vm).and_then(|id| self.pm_position(id))
    }

    /// Evaluate a placement with the reference formulae.
    ///
    /// Energy sums `idle + load/capacity × (full − idle)` over used PMs.
    /// Wastage is the ratio of summed per-assignment imbalance
    /// `|cpu/cpu_cap − mem/mem_cap|` to summed per-assignment utilization
    /// `cpu/cpu_cap + mem/mem_cap`, zero when nothing is assigned. Migration
    /// is the total memory of VMs away from their current mapping.
    pub fn evaluate(&self, placement: &Placement) -> Result<ObjectiveVector> {
        assert_eq!(placement.len(), self.vm_count());
        let mut cpu_load = vec![0u64; self.pms.len()];
        for (flat, vm) in self.vms().enumerate() {
            cpu_load[placement.pm_of(flat)] += vm.cpu;
        }

        let mut energy = Rational::ZERO;
        for (pos, pm) in self.pms.iter().enumerate() {
            if cpu_load[pos] == 0 {
                continue;
            }
            let load = Rational::new(to_i64(cpu_load[pos])?, to_i64(pm.cpu)?);
            let span = pm.full_cost.checked_sub(&pm.idle_cost)?;
            energy = energy.checked_add(&pm.idle_cost)?.checked_add(&load.checked_mul(&span)?)?;
        }

        let mut numerator = Rational::ZERO;
        let mut denominator = Rational::ZERO;
        for (flat, vm) in self.vms().enumerate() {
            let pm = &self.pms[placement.pm_of(flat)];
            let cpu_frac = Rational::new(to_i64(vm.cpu)?, to_i64(pm.cpu)?);
            let mem_frac = Rational::new(to_i64(vm.mem)?, to_i64(pm.mem)?);
            numerator = numerator.checked_add(&cpu_frac.checked_sub(&mem_frac)?.abs())?;
            denominator = denominator.checked_add(&cpu_frac.checked_add(&mem_frac)?)?;
        }
        let wastage = if denominator.is_zero() {
            Rational::ZERO
        } else {
            ratio(&numerator, &denominator)?
        };

        let migration = if self.has_mappings() {
            let mut moved = 0u64;
            for (flat, vm) in self.vms().enumerate() {
                if let Some(cur) = self.current_pm_position(flat) {
                    if cur != placement.pm_of(flat) {
                        moved += vm.mem;
                    }
                }
            }
            Some(moved)
        } else {
            None
        };

        Ok(ObjectiveVector { energy, wastage, migration })
    }

    /// Check a placement against every hard constraint of the instance.
    /// `budget` is the migration budget in memory units.
    pub fn check_placement(&self, placement: &Placement, budget: u64) -> std::result::Result<(), String> {
        if placement.len() != self.vm_count() {
            return Err(format!(
                "placement covers {} VMs, instance has {}",
                placement.len(),
                self.vm_count()
            ));
        }
        let mut cpu_load = vec![0u64; self.pms.len()];
        let mut mem_load = vec![0u64; self.pms.len()];
        for (flat, vm) in self.vms().enumerate() {
            let pos = placement.pm_of(flat);
            if pos >= self.pms.len() {
                return Err(format!("VM {}-{} placed on unknown PM position {pos}", vm.job, vm.index));
            }
            let pm = &self.pms[pos];
            if !vm.allows(pm.id) {
                return Err(format!("VM {}-{} placed outside its allowed set", vm.job, vm.index));
            }
            cpu_load[pos] += vm.cpu;
            mem_load[pos] += vm.mem;
        }
        for (pos, pm) in self.pms.iter().enumerate() {
            if cpu_load[pos] > pm.cpu || mem_load[pos] > pm.mem {
                return Err(format!("PM {} over capacity", pm.id));
            }
        }
        for job in &self.jobs {
            let mut seen: BTreeMap<usize, VmRef> = BTreeMap::new();
            for vm in job.vms.iter().filter(|v| v.anti_colocatable) {
                let flat = self.flat_index(vm.vm_ref()).unwrap();
                let pos = placement.pm_of(flat);
                if let Some(prev) = seen.insert(pos, vm.vm_ref()) {
                    return Err(format!(
                        "anti-colocated VMs {}-{} and {}-{} share PM {}",
                        prev.job, prev.index, vm.job, vm.index, self.pms[pos].id
                    ));
                }
            }
        }
        let mut moved = 0u64;
        for (flat, vm) in self.vms().enumerate() {
            if let Some(cur) = self.current_pm_position(flat) {
                if cur != placement.pm_of(flat) {
                    moved += vm.mem;
                }
            }
        }
        if moved > budget {
            return Err(format!("migration of {moved} memory units exceeds budget {budget}"));
        }
        Ok(())
    }

    /// Flat indices of VMs whose placement contradicts a hard constraint:
    /// members of overloaded PMs, platform violations, anti-colocation
    /// clashes, and movers when the migration budget is exceeded.
    pub fn violating_vms(&self, placement: &Placement, budget: u64) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cpu_load = vec![0u64; self.pms.len()];
        let mut mem_load = vec![0u64; self.pms.len()];
        for (flat, vm) in self.vms().enumerate() {
            let pos = placement.pm_of(flat);
            cpu_load[pos] += vm.cpu;
            mem_load[pos] += vm.mem;
        }
        for (flat, vm) in self.vms().enumerate() {
            let pos = placement.pm_of(flat);
            let pm = &self.pms[pos];
            if cpu_load[pos] > pm.cpu || mem_load[pos] > pm.mem || !vm.allows(pm.id) {
                out.push(flat);
            }
        }
        for job in &self.jobs {
            let mut seen: BTreeMap<usize, usize> = BTreeMap::new();
            for vm in job.vms.iter().filter(|v| v.anti_colocatable) {
                let flat = self.flat_index(vm.vm_ref()).unwrap();
                let pos = placement.pm_of(flat);
                if let Some(prev) = seen.insert(pos, flat) {
                    out.push(prev);
                    out.push(flat);
                }
            }
        }
        let mut moved = 0u64;
        let mut movers = Vec::new();
        for (flat, vm) in self.vms().enumerate() {
            if let Some(cur) = self.current_pm_position(flat) {
                if cur != placement.pm_of(flat) {
                    moved += vm.mem;
                    movers.push(flat);
                }
            }
        }
        if moved > budget {
            out.extend(movers);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| CoreError::EncodingOverflow)
}

fn ratio(num: &Rational, den: &Rational) -> Result<Rational> {
    let inv = Rational::new(den.denominator(), den.numerator());
    num.checked_mul(&inv)
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn singleton_reference_values() {
        let instance = singleton();
        let v = instance.evaluate(&Placement(vec![0])).unwrap();
        // idle 1 plus a quarter of the idle-to-full span of 2
        assert_eq!(v.energy, Rational::new(3, 2));
        assert_eq!(v.wastage, Rational::ZERO);
        assert_eq!(v.migration, None);
    }

    #[test]
    fn migration_counts_moved_memory() {
        let mut mappings = Mappings::new();
        mappings.insert(VmRef { job: 0, index: 0 }, 0);
        let instance = Instance::new(
            vec![pm(0, 4, 4, 1, 3), pm(1, 4, 4, 1, 3)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 1, 2)] }],
            mappings,
            1.0,
        )
        .unwrap();
        let stay = instance.evaluate(&Placement(vec![0])).unwrap();
        assert_eq!(stay.migration, Some(0));
        let moved = instance.evaluate(&Placement(vec![1])).unwrap();
        assert_eq!(moved.migration, Some(2));
    }

    #[test]
    fn placement_checking() {
        let instance = Instance::new(
            vec![pm(0, 2, 2, 1, 2), pm(1, 2, 2, 1, 2)],
            vec![Job {
                id: 0,
                vms: vec![
                    VirtualMachine { anti_colocatable: true, ..vm(0, 0, 2, 2) },
                    VirtualMachine { anti_colocatable: true, ..vm(0, 1, 2, 2) },
                ],
            }],
            Mappings::new(),
            1.0,
        )
        .unwrap();
        assert!(instance.check_placement(&Placement(vec![0, 1]), 0).is_ok());
        // capacity and anti-colocation both broken on PM 0
        assert!(instance.check_placement(&Placement(vec![0, 0]), 0).is_err());
        let bad = instance.violating_vms(&Placement(vec![0, 0]), 0);
        assert_eq!(bad, vec![0, 1]);
    }

    #[test]
    fn dominance_is_strict_somewhere() {
        let a = ObjectiveVector {
            energy: Rational::from_integer(1),
            wastage: Rational::ZERO,
            migration: None,
        };
        let b = ObjectiveVector {
            energy: Rational::from_integer(2),
            wastage: Rational::ZERO,
            migration: None,
        };
        assert!(a.dominates(&b));
        assert!(!b.dominates(&a));
        assert!(!a.dominates(&a));
    }

    #[test]
    fn rejects_bad_instances() {
        assert!(Instance::new(
            vec![pm(0, 1, 1, 0, 1), pm(0, 1, 1, 0, 1)],
            vec![],
            Mappings::new(),
            1.0
        )
        .is_err());
        assert!(Instance::new(
            vec![pm(0, 1, 1, 0, 1)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 0, 1)] }],
            Mappings::new(),
            1.0
        )
        .is_err());
        assert!(Instance::new(vec![], vec![], Mappings::new(), 1.5).is_err());
    }

    #[test]
    fn migration_budget_is_floored() {
        let instance = Instance::new(
            vec![pm(0, 4, 5, 1, 3), pm(1, 4, 5, 1, 3)],
            vec![Job { id: 0, vms: vec![vm(0, 0, 1, 1)] }],
            Mappings::new(),
            0.5,
        )
        .unwrap();
        assert_eq!(instance.total_mem_capacity(), 10);
        assert_eq!(instance.max_migration_memory(None), 5);
        assert_eq!(instance.max_migration_memory(Some(0.25)), 2);
        // negative override falls back to the instance fraction
        assert_eq!(instance.max_migration_memory(Some(-1.0)), 5);
    }
}
