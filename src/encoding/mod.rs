//! The pseudo-Boolean encoding of consolidation instances: constraint
//! translation, objective management and OPB serialisation.

pub mod encoder;
pub mod objective;
pub mod opb;

pub use encoder::{Encoder, Encoding};
pub use objective::{Objective, ObjectiveKind, ObjectiveSet, SoftTerm};
