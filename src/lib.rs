//! VMCTk is a toolkit for multi-objective virtual machine consolidation. It
//! encodes the consolidation-with-migration problem as a pseudo-Boolean
//! constraint system and searches for Pareto-optimal placements that jointly
//! minimize energy cost, resource wastage and (when a current allocation
//! exists) migration cost, under capacity, anti-colocation,
//! platform-compatibility and migration-budget constraints.
//!
//! Logically, this crate includes these major parts:
//! * [Problem model](model/index.html): machines, jobs, instances,
//!   placements and the reference objective formulae.
//! * [Encoding](encoding/index.html): the deterministic translation of an
//!   instance into clauses, linear constraints and objective functions,
//!   including the multi-objective OPB dump.
//! * [Solver](solver/index.html): an incremental CDCL solver with native
//!   linear pseudo-Boolean constraints and XOR parities, behind the
//!   [`ConstraintSolver`](solver/trait.ConstraintSolver.html) capability
//!   trait.
//! * [Search](search/index.html): the Pareto search driver and its
//!   algorithm flavours (Pareto-MCS with CLD or LBX extraction, the Guided
//!   Improvement Algorithm, hash-based enumeration, single-objective
//!   optimization), the stratifier, the non-dominated archive, and the
//!   smart-mutation / smart-improvement services consumed by evolutionary
//!   callers.
//! * [Options](util/options/struct.Options.html): the string-keyed
//!   configuration surface shared by the library API, environment variables
//!   and the command-line driver.

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod util;
pub mod encoding;
pub mod error;
pub mod model;
pub mod search;
pub mod solver;

mod consolidator;

pub use crate::consolidator::{Consolidator, ConsolidatorBuilder};
pub use crate::error::{CoreError, Result};
pub use crate::search::{SearchOutcome, SearchStatus};
