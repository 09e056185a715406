//! CLI command implementations

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::groupcommit::{
    EmitError, GroupCommitConfig, GroupCommitter, SequentialKeyManipulator,
};
use crate::observability::{Logger, MetricsSnapshot};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Options for the `simulate` command.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub workers: usize,
    pub commits: usize,
    pub emit_delay: Duration,
    pub fail_every: Option<u64>,
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub workers: usize,
    pub commits_per_worker: usize,
    pub committed: u64,
    pub failed: u64,
    pub emissions: u64,
    pub elapsed_ms: u128,
    pub metrics: MetricsSnapshot,
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    Logger::set_min_severity(cli.log_level.into());
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::CheckConfig { config } => {
            let config = check_config(&config)?;
            write_json(&config)
        }
        Command::Simulate {
            config,
            workers,
            commits,
            emit_delay_ms,
            fail_every,
        } => {
            let options = SimulateOptions {
                workers,
                commits,
                emit_delay: Duration::from_millis(emit_delay_ms),
                fail_every,
            };
            let report = simulate(&config, &options)?;
            write_json(&report)
        }
    }
}

/// Load and validate a config file.
pub fn check_config(config_path: &Path) -> CliResult<GroupCommitConfig> {
    Ok(GroupCommitConfig::load(config_path)?)
}

/// Drive a committer from `workers` threads, each reserving and readying
/// `commits` slots in turn.
pub fn simulate(config_path: &Path, options: &SimulateOptions) -> CliResult<SimulationReport> {
    let config = GroupCommitConfig::load(config_path)?;
    run_simulation(config, options)
}

/// Same as [`simulate`], with an in-memory config.
pub fn run_simulation(
    config: GroupCommitConfig,
    options: &SimulateOptions,
) -> CliResult<SimulationReport> {
    if options.workers == 0 {
        return Err(CliError::simulation_failed("workers must be > 0"));
    }
    if options.fail_every == Some(0) {
        return Err(CliError::simulation_failed("fail_every must be > 0"));
    }

    let committer: GroupCommitter<SequentialKeyManipulator, u64> =
        GroupCommitter::new("simulate", config, SequentialKeyManipulator::new())?;

    let emissions = Arc::new(AtomicU64::new(0));
    let emit_delay = options.emit_delay;
    let fail_every = options.fail_every;
    let counter = Arc::clone(&emissions);
    committer.set_emitter(move |key: &str, values: Vec<u64>| -> Result<(), EmitError> {
        let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if !emit_delay.is_zero() {
            thread::sleep(emit_delay);
        }
        match fail_every {
            Some(k) if n % k == 0 => Err(format!(
                "simulated flush failure for {} ({} values)",
                key,
                values.len()
            )
            .into()),
            _ => Ok(()),
        }
    });

    let committed = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..options.workers {
            let committer = &committer;
            let committed = &committed;
            let failed = &failed;
            scope.spawn(move || {
                for i in 0..options.commits {
                    let outcome = committer
                        .reserve(format!("w{}-{}", worker, i))
                        .and_then(|full_key| committer.ready(&full_key, i as u64));
                    match outcome {
                        Ok(()) => committed.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });

    let elapsed = started.elapsed();
    let metrics = committer.metrics();
    committer.close();

    Ok(SimulationReport {
        workers: options.workers,
        commits_per_worker: options.commits,
        committed: committed.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
        emissions: emissions.load(Ordering::Relaxed),
        elapsed_ms: elapsed.as_millis(),
        metrics,
    })
}

fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
