//! Process glue shared by the console binaries.

use std::io;
use std::process::ExitCode;

use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::terminal;
use tracing_subscriber::EnvFilter;

use crate::config::{ConnectionParams, PromptDefaults};
use crate::runner::{Runner, Variant};

/// Initializes tracing on stderr so stdout carries only the transcript.
///
/// `RUST_LOG` overrides the default `warn` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Puts the terminal into raw mode for as long as the guard lives.
#[derive(Debug)]
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            tracing::warn!(error = %err, "could not restore terminal mode");
        }
    }
}

/// Blocks until the operator presses a single key.
///
/// # Errors
///
/// Returns an I/O error if stdin is not a terminal or cannot be read.
pub fn wait_for_key() -> io::Result<()> {
    let _raw = RawModeGuard::enable()?;
    loop {
        if let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            return Ok(());
        }
    }
}

/// Prompts for connection parameters, runs one session and maps the outcome
/// to the process exit status.
pub async fn run(variant: Variant) -> ExitCode {
    match collect_params() {
        Ok(params) => {
            let mut runner = Runner::new(variant, io::stdout(), io::stderr(), wait_for_key);
            match runner.run(&params).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(err) => ExitCode::from(err.exit_code()),
            }
        }
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn collect_params() -> anyhow::Result<ConnectionParams> {
    let defaults = PromptDefaults::from_env();
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    ConnectionParams::prompt(&mut input, &mut output, &defaults)
        .context("could not read connection parameters")
}
