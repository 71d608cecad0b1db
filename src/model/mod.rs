//! The problem model: machines, jobs, instances, placements and the
//! reference objective formulae.

pub mod instance;
pub mod machine;
pub mod parser;

pub use instance::{Instance, ObjectiveVector, Placement};
pub use machine::{Job, Mappings, PhysicalMachine, PmId, VirtualMachine, VmRef};
