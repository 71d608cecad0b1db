//! The consolidator instance: options, instance, encoding and statistics
//! bundled behind one entry point.

use crate::encoding::{opb, Encoder, Encoding};
use crate::error::Result;
use crate::model::Instance;
use crate::search::{ParetoDriver, SearchOutcome, SmartService};
use crate::util::options::Options;
use crate::util::statistics::Stats;
use std::io::Write;
use std::sync::Arc;

/// Builder used to set options before creating a [`Consolidator`].
pub struct ConsolidatorBuilder {
    /// The options for this instance.
    pub options: Options,
}

impl ConsolidatorBuilder {
    /// A builder with options read from environment variables, or built-in
    /// defaults where not overridden.
    pub fn new() -> Self {
        let mut builder = Self::new_no_env_vars();
        builder.options.read_env_var_settings();
        builder
    }

    /// A builder with built-in default options only.
    pub fn new_no_env_vars() -> Self {
        ConsolidatorBuilder { options: Options::default() }
    }

    /// Set an option.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_command_line(name, val)
    }

    /// Set multiple options from a string of key-value pairs separated by
    /// white spaces or commas, such as `algorithm=PCLD seed=7`.
    pub fn set_options_bulk_by_str(&mut self, options: &str) -> bool {
        self.options.set_bulk_from_command_line(options)
    }

    /// Encode the instance and build a consolidator. Instance-level
    /// infeasibility and weight overflow surface here.
    pub fn build(&self, instance: Instance) -> Result<Consolidator> {
        Consolidator::new(instance, Arc::new(self.options.clone()))
    }
}

impl Default for ConsolidatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fully encoded consolidation problem, ready to be searched. The
/// encoding, objectives and statistics outlive individual runs; the smart
/// service borrows them re-entrantly.
pub struct Consolidator {
    options: Arc<Options>,
    instance: Instance,
    encoding: Encoding,
    stats: Stats,
}

impl Consolidator {
    fn new(instance: Instance, options: Arc<Options>) -> Result<Consolidator> {
        let encoding = Encoder::encode(&instance, &options)?;
        Ok(Consolidator { options, instance, encoding, stats: Stats::new() })
    }

    /// The active options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The problem instance.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The encoded constraint system.
    pub fn encoding(&self) -> &Encoding {
        &self.encoding
    }

    /// Statistics accumulated over every run and smart-service call.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Run the configured search algorithm to completion, deadline or
    /// budget exhaustion.
    pub fn solve(&self) -> Result<SearchOutcome> {
        let mut driver =
            ParetoDriver::new(&self.instance, &self.encoding, &self.options, &self.stats)?;
        driver.run()
    }

    /// A smart-mutation / smart-improvement service for evolutionary
    /// callers.
    pub fn smart_service(&self) -> SmartService<'_> {
        SmartService::new(&self.instance, &self.encoding, &self.options, &self.stats)
    }

    /// Serialise the encoded problem as a multi-objective OPB document.
    pub fn dump_mopb<W: Write>(&self, w: &mut W) -> Result<()> {
        opb::write_mopb(&self.encoding, &self.options, w)
    }
}
