// Main CLI entrypoint
// (c) 2024 Ross Younger

use std::path::Path;
use std::process::ExitCode;

use anstream::{eprintln, println};
use anyhow::Context as _;
use clap::Parser as _;
use figment::providers::Serialized;
use indicatif::MultiProgress;
use tracing::{info, warn};

use super::args::{CliArgs, Command, EvalArgs, RunArgs};
use crate::{
    config::{Configuration, Manager},
    driver,
    eval::{self, OperatorLabels},
    util::{fs::expand_path, setup_tracing},
};

/// Main CLI entrypoint
pub fn cli() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    if args.config_files {
        for f in Manager::config_files() {
            println!("{f}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let progress = MultiProgress::new(); // This writes to stderr
    let trace_level = if args.debug {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "info"
    };
    setup_tracing(
        trace_level,
        Some(&progress),
        args.log_file.as_deref().map(Path::new),
    )
    .inspect_err(|e| eprintln!("{e:?}"))?;

    let outcome = match configure(&args) {
        Ok(None) => return Ok(ExitCode::SUCCESS),
        Ok(Some(config)) => dispatch(&args, &config, &progress),
        Err(e) => Err(e),
    };
    Ok(outcome.map_or_else(
        |e| {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        },
        |()| ExitCode::SUCCESS,
    ))
}

/// Merges defaults, files and command-line settings.
///
/// Returns None if the user only asked to see the result.
fn configure(args: &CliArgs) -> anyhow::Result<Option<Configuration>> {
    let mut manager = Manager::new();
    if let Some(file) = &args.config {
        let path = expand_path(file)?;
        anyhow::ensure!(path.is_file(), "configuration file {file} not found");
        manager.merge_toml_file(path);
    }
    if let Some(cli) = args.command.as_ref().and_then(Command::configuration) {
        manager.merge_provider(cli.clone());
    }
    if let Some(Command::Run(run)) = &args.command {
        manager.merge_provider(Serialized::global("dest_server", &run.dest));
    }

    if args.show_config {
        println!("{}", manager.to_display_adapter::<Configuration>());
        return Ok(None);
    }
    for field in manager.unrecognised_fields::<Configuration>() {
        warn!("ignoring unrecognised configuration field {field}");
    }
    let config = manager
        .get::<Configuration>()
        .context("invalid configuration")?;
    Ok(Some(config))
}

fn dispatch(args: &CliArgs, config: &Configuration, progress: &MultiProgress) -> anyhow::Result<()> {
    match &args.command {
        None => {
            anyhow::bail!("no subcommand given; try --help");
        }
        Some(Command::Eval(eval)) => run_eval(eval),
        Some(Command::Run(run)) => run_collect(args, run, config, progress),
        Some(Command::Experiment(exp)) => run_experiment(
            args,
            exp.config_done,
            exp.iterations,
            config,
            progress,
        ),
    }
}

fn run_eval(args: &EvalArgs) -> anyhow::Result<()> {
    let labels: OperatorLabels = args.operator.iter().cloned().collect();
    let output_dir = args.output_dir.as_deref().unwrap_or(&args.dir);
    let report = eval::evaluate(&args.dir, output_dir, &labels)?;
    println!("{}", eval::summary_table(&report.aggregate.views));
    info!("wrote {}", report.csv.display());
    if let Some(png) = report.png {
        info!("wrote {}", png.display());
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn run_collect(
    args: &CliArgs,
    run: &RunArgs,
    config: &Configuration,
    progress: &MultiProgress,
) -> anyhow::Result<()> {
    let protocol = run.protocol()?;
    let written = driver::collect(
        config,
        protocol,
        run.iterations,
        progress,
        args.quiet,
        args.profile,
    )
    .await?;
    info!("{} result file(s) received", written.len());
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn run_experiment(
    args: &CliArgs,
    config_done: bool,
    iterations: u32,
    config: &Configuration,
    progress: &MultiProgress,
) -> anyhow::Result<()> {
    let dir = driver::experiment(
        config,
        config_done,
        iterations,
        progress,
        args.quiet,
        args.profile,
    )
    .await?;
    info!("results are in {}", dir.display());
    Ok(())
}
