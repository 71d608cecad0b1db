//! Search statistics.
//!
//! The core is single-threaded, so counters are plain cells rather than
//! atomics. Counters accumulate monotonically over one driver run and are
//! printed as a two-row table when the `stats` option is on.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Monotonic counters for one consolidation run.
#[derive(Default)]
pub struct Stats {
    /// Solver invocations, over every algorithm and the smart services.
    pub solver_calls: Cell<u64>,
    /// Conflicts spent across all solver invocations.
    pub conflicts: Cell<u64>,
    /// Invocations that returned a model.
    pub sat_calls: Cell<u64>,
    /// Invocations refuted outright.
    pub unsat_calls: Cell<u64>,
    /// Invocations cut short by a conflict budget.
    pub budget_calls: Cell<u64>,
    /// Models decoded into placements.
    pub models: Cell<u64>,
    /// Archive insertions that survived dominance pruning.
    pub archive_inserted: Cell<u64>,
    /// Archive insertions rejected as dominated or duplicate.
    pub archive_rejected: Cell<u64>,
    /// Stratification partitions processed.
    pub partitions: Cell<u64>,
    /// Partitions folded into their successor after budget exhaustion.
    pub partition_folds: Cell<u64>,
    /// Blocking constraints added.
    pub blockings: Cell<u64>,
    /// Solver rebuilds triggered by blocking-clause accumulation.
    pub rebuilds: Cell<u64>,
    /// Hash rounds completed.
    pub hash_rounds: Cell<u64>,
    /// Smart-mutation calls served.
    pub smart_mutations: Cell<u64>,
    /// Smart-improvement calls served.
    pub smart_improvements: Cell<u64>,
    start: Cell<Option<Instant>>,
    elapsed: Cell<Duration>,
}

impl Stats {
    /// A fresh set of counters.
    pub fn new() -> Stats {
        Stats::default()
    }

    /// Increment a counter cell by one.
    pub fn inc(cell: &Cell<u64>) {
        cell.set(cell.get() + 1);
    }

    /// Add to a counter cell.
    pub fn add(cell: &Cell<u64>, n: u64) {
        cell.set(cell.get() + n);
    }

    /// Start the run timer.
    pub fn start_run(&self) {
        self.start.set(Some(Instant::now()));
    }

    /// Stop the run timer.
    pub fn stop_run(&self) {
        if let Some(start) = self.start.take() {
            self.elapsed.set(self.elapsed.get() + start.elapsed());
        }
    }

    fn rows(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("solver_calls", self.solver_calls.get()),
            ("conflicts", self.conflicts.get()),
            ("sat", self.sat_calls.get()),
            ("unsat", self.unsat_calls.get()),
            ("budget", self.budget_calls.get()),
            ("models", self.models.get()),
            ("archive_in", self.archive_inserted.get()),
            ("archive_out", self.archive_rejected.get()),
            ("partitions", self.partitions.get()),
            ("folds", self.partition_folds.get()),
            ("blockings", self.blockings.get()),
            ("rebuilds", self.rebuilds.get()),
            ("hash_rounds", self.hash_rounds.get()),
            ("smart_mut", self.smart_mutations.get()),
            ("smart_impr", self.smart_improvements.get()),
        ]
    }

    /// Print the totals table.
    pub fn print_stats(&self) {
        println!(
            "============================ VMCTk Statistics Totals ============================"
        );
        let rows = self.rows();
        for (name, _) in &rows {
            print!("{}\t", name);
        }
        println!();
        for (_, value) in &rows {
            print!("{}\t", value);
        }
        println!();
        println!("Total time: {} ms", self.elapsed.get().as_millis());
        println!(
            "------------------------------ End VMCTk Statistics -----------------------------"
        );
    }
}
