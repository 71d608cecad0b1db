//! Crate-wide constants.

use static_assertions::const_assert;

/// Models enumerated per hash round before the parity slice is resampled.
pub const MODELS_PER_HASH_SLICE: usize = 8;

/// Restart interval base for the Luby sequence, in conflicts.
pub const RESTART_BASE: u64 = 64;

/// Activity decay applied to variable scores after every conflict.
pub const VAR_DECAY: f64 = 0.95;

/// Fractional digits used when printing objective values.
pub const OBJECTIVE_DECIMALS: usize = 5;

// Literal indices are packed as `var << 1 | sign` in u32; the encoder never
// allocates more variables than this.
/// Upper bound on solver variables.
pub const MAX_VARS: usize = (u32::MAX >> 1) as usize;

const_assert!(MAX_VARS < u32::MAX as usize);
const_assert!(RESTART_BASE > 0);
