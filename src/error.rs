//! Crate-level error types.
//!
//! Only conditions that abort a run are errors: an instance that cannot be
//! encoded, weight arithmetic that would overflow, an option combination the
//! algorithms cannot honor, and I/O or parse failures. Solver verdicts
//! (satisfiable, refuted, budget exhausted) and the global deadline are
//! ordinary control flow and never surface here.

use thiserror::Error;

/// Errors raised by the consolidation core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The instance cannot be encoded into a satisfiable-in-principle model,
    /// e.g. a VM whose allowed-PM set is empty after filtering, or total
    /// demand exceeding total capacity.
    #[error("instance is infeasible: {0}")]
    InstanceInfeasible(String),

    /// Integer objective weights exceeded the representable range while
    /// clearing denominators. Never silently wrapped.
    #[error("objective weight overflow while reducing rational coefficients")]
    EncodingOverflow,

    /// A recognized but unsupported option combination.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Instance or archive text that does not conform to the input format.
    #[error("parse error at line {line}: {msg}")]
    Parse {
        /// 1-based line number in the offending file.
        line: usize,
        /// What went wrong.
        msg: String,
    },

    /// An underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;
