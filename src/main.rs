//! The thin command-line driver.

use clap::Parser;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use vmctk::model::parser;
use vmctk::{Consolidator, ConsolidatorBuilder, CoreError};

#[derive(Parser)]
#[command(
    name = "vmctk",
    about = "Multi-objective virtual machine consolidation",
    version
)]
struct Cli {
    /// Instance file.
    instance: PathBuf,

    /// Set a core option as key=value. Repeatable; see the library
    /// documentation for the full surface.
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Algorithm to run (MCS, PBO, LS, GIA, HE, PCLD, PLBX).
    #[arg(long)]
    algorithm: Option<String>,

    /// Global deadline in seconds.
    #[arg(long)]
    time_limit: Option<u64>,

    /// Master seed for the stochastic components.
    #[arg(long)]
    seed: Option<u64>,

    /// Emit placement lines alongside objective vectors.
    #[arg(long)]
    print_placements: bool,

    /// Print search statistics before exiting.
    #[arg(long)]
    stats: bool,

    /// Write the encoded problem as multi-objective OPB and exit.
    #[arg(long, value_name = "PATH")]
    dump_opb: Option<PathBuf>,

    /// Write the final archive to a file.
    #[arg(long, value_name = "PATH")]
    dump_archive: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            // only I/O and parse failures abort with a non-zero code
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let instance = match parser::parse_file(&cli.instance) {
        Ok(instance) => instance,
        Err(e @ (CoreError::Parse { .. } | CoreError::Io(_))) => {
            return Err(anyhow::Error::new(e)
                .context(format!("reading {}", cli.instance.display())))
        }
        Err(other) => return Ok(failure(&other)),
    };

    let mut builder = ConsolidatorBuilder::new();
    for pair in &cli.set {
        if !builder.set_options_bulk_by_str(pair) {
            anyhow::bail!("unrecognized option setting {pair:?}");
        }
    }
    apply_flag(&mut builder, "algorithm", cli.algorithm.as_deref())?;
    apply_flag(&mut builder, "time_limit", cli.time_limit.map(|v| v.to_string()).as_deref())?;
    apply_flag(&mut builder, "seed", cli.seed.map(|v| v.to_string()).as_deref())?;
    if cli.print_placements {
        builder.set_option("print_placements", "true");
    }
    if cli.stats {
        builder.set_option("stats", "true");
    }

    let consolidator = match builder.build(instance) {
        Ok(c) => c,
        Err(e @ CoreError::Io(_)) => return Err(e.into()),
        Err(other) => return Ok(failure(&other)),
    };

    if let Some(path) = &cli.dump_opb {
        let mut out = BufWriter::new(File::create(path)?);
        consolidator.dump_mopb(&mut out)?;
        out.flush()?;
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = match consolidator.solve() {
        Ok(outcome) => outcome,
        Err(e @ CoreError::Io(_)) => return Err(e.into()),
        Err(other) => return Ok(failure(&other)),
    };

    emit_archive(&consolidator, &outcome.archive);
    if let Some(path) = &cli.dump_archive {
        let mut out = BufWriter::new(File::create(path)?);
        outcome.archive.dump(&mut out)?;
        out.flush()?;
    }
    if *consolidator.options().stats {
        consolidator.stats().print_stats();
    }
    if outcome.archive.is_empty() {
        println!("s FAILURE");
    } else {
        println!("s SUCCESS");
    }
    Ok(ExitCode::SUCCESS)
}

fn apply_flag(
    builder: &mut ConsolidatorBuilder,
    key: &str,
    value: Option<&str>,
) -> anyhow::Result<()> {
    if let Some(value) = value {
        if !builder.set_option(key, value) {
            anyhow::bail!("invalid value {value:?} for --{}", key.replace('_', "-"));
        }
    }
    Ok(())
}

fn failure(err: &CoreError) -> ExitCode {
    eprintln!("c {err}");
    println!("s FAILURE");
    ExitCode::SUCCESS
}

fn emit_archive(consolidator: &Consolidator, archive: &vmctk::search::Archive) {
    let instance = consolidator.instance();
    for entry in archive.iter() {
        match entry.vector.migration {
            Some(m) => println!(
                "e {:.5} w {:.5} m {}",
                entry.vector.energy.to_f64(),
                entry.vector.wastage.to_f64(),
                m
            ),
            None => println!(
                "e {:.5} w {:.5}",
                entry.vector.energy.to_f64(),
                entry.vector.wastage.to_f64()
            ),
        }
        if *consolidator.options().print_placements {
            for (flat, vm) in instance.vms().enumerate() {
                let pm = &instance.pms()[entry.witness.pm_of(flat)];
                println!("p {}-{} -> {}", vm.job, vm.index, pm.id);
            }
        }
    }
}
