//! Tycho entrypoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use core_cmds::Archive;
use core_states::{StateTable, get_state0_with, get_states_for_cmds, reduce_states};

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "tycho", version, about = "Commanded-state reconstruction tools")]
struct Args {
    /// Optional configuration file path (overrides discovery of `tycho.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Optional log file; stderr logging otherwise (filtered by RUST_LOG).
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the interval table of commanded states over a window.
    States {
        #[arg(long)]
        start: String,
        #[arg(long)]
        stop: String,
        /// Comma-separated state keys (all keys when omitted).
        #[arg(long)]
        keys: Option<String>,
        /// Reduce the table to transitions in the requested keys only.
        #[arg(long, default_value_t = false)]
        reduce: bool,
    },
    /// Resolve the commanded state at a date.
    State0 {
        #[arg(long)]
        date: Option<String>,
        /// Comma-separated state keys (all keys when omitted).
        #[arg(long)]
        keys: Option<String>,
        /// Comma-separated lookback windows in days.
        #[arg(long)]
        lookbacks: Option<String>,
    },
    /// Update the events database from the commanding history.
    UpdateEvents {
        /// Effective processing date (default: now).
        #[arg(long = "date-now")]
        date_now: Option<String>,
        /// Processing start date (loops forward in 30-day steps when set).
        #[arg(long = "date-start")]
        date_start: Option<String>,
        /// Model name regex to process (repeatable; default: all).
        #[arg(long = "model")]
        models: Vec<String>,
    },
}

fn configure_logging(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env();
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn split_csv(arg: Option<&String>) -> Option<Vec<&str>> {
    arg.map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
}

fn print_states(states: &StateTable) {
    let keys: Vec<&str> = states.keys().collect();

    let mut widths: Vec<usize> = Vec::new();
    let mut header: Vec<String> = vec!["datestart".to_string(), "datestop".to_string()];
    header.extend(keys.iter().map(|k| k.to_string()));

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(states.len());
    for i in 0..states.len() {
        let mut row = vec![states.datestart[i].clone(), states.datestop[i].clone()];
        for key in keys.iter().copied() {
            let cell = match states.value(i, key).ok().flatten() {
                Some(v) => v.to_string(),
                None => "--".to_string(),
            };
            row.push(cell);
        }
        rows.push(row);
    }

    for (col, name) in header.iter().enumerate() {
        let w = rows
            .iter()
            .map(|r| r[col].len())
            .chain([name.len()])
            .max()
            .unwrap_or(0);
        widths.push(w);
    }

    let fmt_row = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{c:>width$}", width = *w))
            .collect::<Vec<_>>()
            .join(" ")
    };
    println!("{}", fmt_row(&header));
    for row in &rows {
        println!("{}", fmt_row(row));
    }
}

fn load_archive(cfg: &core_config::Config) -> Result<Archive> {
    Archive::load(&cfg.file.archive.commands, &cfg.file.archive.params)
        .context("loading command archive")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging(args.log_file.as_ref())?;

    let cfg = core_config::load_from(args.config.clone())?;
    info!(
        target: "runtime",
        config_override = args.config.is_some(),
        "startup"
    );

    match &args.command {
        Command::States {
            start,
            stop,
            keys,
            reduce,
        } => {
            let archive = load_archive(&cfg)?;
            let cmds = archive
                .filter(Some(start.as_str()), Some(stop.as_str()), &[])
                .context("filtering commands")?;
            let keys = split_csv(keys.as_ref());
            let states = get_states_for_cmds(&cmds, keys.as_deref(), None)
                .context("computing states")?;
            if *reduce && let Some(keys) = &keys {
                print_states(&reduce_states(&states, keys).context("reducing states")?);
            } else {
                print_states(&states);
            }
        }

        Command::State0 {
            date,
            keys,
            lookbacks,
        } => {
            let archive = load_archive(&cfg)?;
            let keys = split_csv(keys.as_ref());
            let lookbacks: Option<Vec<f64>> = match split_csv(lookbacks.as_ref()) {
                None => Some(cfg.file.state0.lookbacks.clone()),
                Some(parts) => Some(
                    parts
                        .iter()
                        .map(|p| p.parse::<f64>().context("parsing lookback"))
                        .collect::<Result<_>>()?,
                ),
            };
            let state0 = get_state0_with(
                &archive,
                date.as_deref(),
                keys.as_deref(),
                lookbacks.as_deref(),
            )
            .context("resolving state0")?;
            for (key, val) in &state0 {
                println!("{key} = {val}");
            }
        }

        Command::UpdateEvents {
            date_now,
            date_start,
            models,
        } => {
            let archive = load_archive(&cfg)?;
            let mut store = core_events::EventStore::open(&cfg.file.events.database)
                .context("opening events database")?;
            let patterns = models
                .iter()
                .map(|m| regex::Regex::new(m).with_context(|| format!("bad model regex {m:?}")))
                .collect::<Result<Vec<_>>>()?;
            let date_now = match date_now {
                Some(d) => d.clone(),
                None => core_time::Date::now().as_str().to_string(),
            };
            let stats = core_events::update_all(
                &core_events::builtin_models(),
                &archive,
                &mut store,
                &date_now,
                date_start.as_deref(),
                &patterns,
            )
            .context("updating events")?;
            println!("events added: {}, skipped: {}", stats.added, stats.skipped);
        }
    }

    Ok(())
}
