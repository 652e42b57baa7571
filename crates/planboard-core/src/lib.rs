pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod grid;
pub mod interaction;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod window;

use std::ffi::OsString;
use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  ErrorKind,
  SchedulerError,
  SchedulerResult
};
pub use events::{
  EventKind,
  SchedulerEvent
};
pub use scheduler::Scheduler;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting planboard"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let options =
    config::SchedulerOptions::from_config(
      &cfg
    )
    .context(
      "failed to resolve scheduler \
       options"
    )?;

  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  commands::dispatch(
    &options,
    cli.command,
    &mut out
  )?;
  out.flush()?;

  info!("done");
  Ok(())
}
