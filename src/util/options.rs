//! The option surface of the search core.
//!
//! Options are string-keyed so that embedders and the command-line driver can
//! forward settings without compile-time coupling. Every option can be set
//! from the command line (`set_from_command_line`, or the bulk form) and from
//! environment variables carrying the `VMCTK_` prefix, and every option runs
//! a validator before the value is accepted.

use std::default::Default;
use std::fmt::Debug;
use strum_macros::EnumString;

/// The search algorithm to run.
#[derive(Copy, Clone, EnumString, Debug, PartialEq, Eq)]
pub enum AlgorithmSelector {
    /// Unstratified Pareto-MCS with the CLD extractor.
    MCS,
    /// Lexicographic single-objective optimization, proved optimal when the
    /// conflict budget permits.
    PBO,
    /// SAT-UNSAT linear search on the reduced weighted sum of all objectives.
    LS,
    /// Guided Improvement Algorithm.
    GIA,
    /// Hash-based model enumeration.
    HE,
    /// Stratified Pareto-MCS with the CLD extractor.
    PCLD,
    /// Stratified Pareto-MCS with the LBX extractor.
    PLBX,
}

/// How divided (rational) objective weights are stratified.
#[derive(Copy, Clone, EnumString, Debug, PartialEq, Eq)]
pub enum StratifyMode {
    /// Numerator and denominator literals are stratified together on
    /// combined weight.
    Merged,
    /// Two independent stratifications, alternated with probability
    /// proportional to remaining weight.
    Split,
    /// No stratification: one partition holds every soft literal.
    Off,
}

fn always_valid<T>(_: &T) -> bool {
    true
}

/// An option of a given type, together with its validator.
/// To get the value of an option, simply dereference it (for example,
/// `*options.time_limit`).
#[derive(Clone)]
pub struct SearchOption<T: Debug + Clone> {
    value: T,
    validator: fn(&T) -> bool,
}

impl<T: Debug + Clone> SearchOption<T> {
    /// Create a new option.
    pub fn new(value: T, validator: fn(&T) -> bool) -> Self {
        SearchOption { value, validator }
    }

    /// Set the option to the given value. Returns true if the value is valid,
    /// and we set the option to the value.
    pub fn set(&mut self, value: T) -> bool {
        if (self.validator)(&value) {
            self.value = value;
            return true;
        }
        false
    }
}

// Dereference an option to get its value.
impl<T: Debug + Clone> std::ops::Deref for SearchOption<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

macro_rules! options {
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*,) => [
        options!($($(#[$outer])*$name: $type [$validator] = $default),*);
    ];
    ($($(#[$outer:meta])*$name:ident: $type:ty [$validator:expr] = $default:expr),*) => [
        /// The options for a consolidation run.
        #[derive(Clone)]
        pub struct Options {
            $($(#[$outer])* pub $name: SearchOption<$type>),*
        }

        impl Options {
            /// Set an option from a command-line or API string pair. Returns
            /// false if the key is unknown, the value cannot be parsed, or
            /// the validator rejects it.
            pub fn set_from_command_line(&mut self, s: &str, val: &str) -> bool {
                match s {
                    $(stringify!($name) => if let Ok(typed_val) = val.parse::<$type>() {
                        let is_set = self.$name.set(typed_val);
                        if !is_set {
                            warn!("unable to set {}={:?}: invalid value, default kept", s, val);
                        }
                        is_set
                    } else {
                        warn!("unable to set {}={:?}: cannot parse value, default kept", s, val);
                        false
                    },)*
                    _ => {
                        warn!("unknown option key {:?}", s);
                        false
                    }
                }
            }

            /// Bulk process options. Returns true if all the options are
            /// processed successfully.
            ///
            /// Arguments:
            /// * `options`: a string of key-value pairs separated by white
            ///   spaces or commas, e.g. `algorithm=PCLD seed=7` or
            ///   `algorithm=PCLD,seed=7`.
            pub fn set_bulk_from_command_line(&mut self, options: &str) -> bool {
                for opt in options.replace(',', " ").split_ascii_whitespace() {
                    let kv_pair: Vec<&str> = opt.split('=').collect();
                    if kv_pair.len() != 2 {
                        return false;
                    }
                    if !self.set_from_command_line(kv_pair[0], kv_pair[1]) {
                        return false;
                    }
                }
                true
            }

            /// Read options from environment variables, and apply those
            /// settings to self.
            ///
            /// Environment variables that start with `VMCTK_` and match an
            /// option name (such as `VMCTK_TIME_LIMIT`) set the option to
            /// their value, if it is valid.
            pub fn read_env_var_settings(&mut self) {
                const PREFIX: &str = "VMCTK_";
                for (key, val) in std::env::vars() {
                    if let Some(rest_of_key) = key.strip_prefix(PREFIX) {
                        let lowercase: &str = &rest_of_key.to_lowercase();
                        match lowercase {
                            $(stringify!($name) => { self.set_from_command_line(lowercase, &val); },)*
                            _ => {}
                        }
                    }
                }
            }

            /// Create an `Options` instance with built-in default settings.
            fn new() -> Self {
                Options {
                    $($name: SearchOption::new($default, $validator)),*
                }
            }
        }

        impl Default for Options {
            fn default() -> Self {
                Self::new()
            }
        }
    ]
}

options! {
    /// The search algorithm to run.
    algorithm:              AlgorithmSelector [always_valid] = AlgorithmSelector::PCLD,
    /// Global deadline in seconds. The archive accumulated so far is frozen
    /// and returned on expiry.
    time_limit:             u64     [|v: &u64| *v > 0] = 600,
    /// Migration budget as a fraction of total memory capacity. A negative
    /// value means "take the fraction recorded in the instance".
    migration_percentile:   f64     [|v: &f64| *v < 0.0 || (0.0..=1.0).contains(v)] = -1.0,
    /// Emit lex-order constraints over PMs with identical capacities and
    /// costs.
    symmetry_breaking:      bool    [always_valid] = false,
    /// Drop allowed-PM restrictions.
    ignore_platform:        bool    [always_valid] = false,
    /// Drop anti-colocation constraints.
    ignore_anti_colocation: bool    [always_valid] = false,
    /// Evaluate wastage as its numerator alone, ignoring the denominator.
    ignore_den_eval:        bool    [always_valid] = false,
    /// Exclude denominator literals from the search objective.
    ignore_den_alloc:       bool    [always_valid] = false,
    /// Number of XOR parity constraints sampled per hash round. 0 disables
    /// hash diversification. Not supported together with PLBX.
    hash_functions:         usize   [always_valid] = 0,
    /// How divided objective weights are stratified.
    stratify:               StratifyMode [always_valid] = StratifyMode::Off,
    /// Conflict budget per stratification partition. 0 means no
    /// per-partition limit.
    part_max_conflicts:     u64     [always_valid] = 0,
    /// Literal-to-distinct-weight ratio that closes a partition in LWR mode.
    lit_weight_ratio:       f64     [|v: &f64| *v >= 1.0] = 15.0,
    /// Fixed number of stratification partitions. 0 selects LWR mode.
    partition_number:       usize   [always_valid] = 0,
    /// Rotate the soft-literal ordering between Pareto-MCS iterations.
    /// Only meaningful for the CLD extractor.
    path_diversification:   bool    [always_valid] = false,
    /// Fraction of variables unfixed by smart mutation.
    smart_mutation_rate:    f64     [|v: &f64| *v > 0.0 && *v <= 1.0] = 0.1,
    /// Conflict budget for one smart-mutation repair call.
    max_conflicts:          u64     [|v: &u64| *v > 0] = 100_000,
    /// Disable unfixing of variables whose candidate value contradicts hard
    /// constraints.
    disable_domain_unfixing: bool   [always_valid] = false,
    /// Drive repaired candidates toward the Pareto front.
    smart_improvement:      bool    [always_valid] = false,
    /// Fraction of variables relaxed by smart improvement.
    improve_relax_rate:     f64     [|v: &f64| *v > 0.0 && *v <= 1.0] = 0.2,
    /// Total conflict budget for one smart-improvement call.
    improve_max_conflicts:  u64     [|v: &u64| *v > 0] = 100_000,
    /// Master seed for every stochastic component.
    seed:                   u64     [always_valid] = 0,
    /// Gather and print search statistics.
    stats:                  bool    [always_valid] = false,
    /// Emit placement lines alongside objective vectors.
    print_placements:       bool    [always_valid] = false,
    /// Rebuild the solver from the encoding and the archive's dominance
    /// cones once this many blocking constraints have accumulated.
    rebuild_threshold:      usize   [|v: &usize| *v > 0] = 20_000,
    /// Allow decimal coefficients in the multi-objective OPB dump instead of
    /// clearing denominators.
    decimal_coefficients:   bool    [always_valid] = false,
}
