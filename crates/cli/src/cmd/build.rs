//! Implementation of the default `gocross` command.
//!
//! Validates the whole configuration, builds every platform, then lists the
//! destination directory.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use gocross_lib::build::{ArtifactKind, BuildOutcome};
use gocross_lib::config::{BuildConfig, Inputs, env};
use gocross_lib::execute::{RunReport, run};
use gocross_lib::inventory::{InventoryEntry, list_dir};
use gocross_lib::toolchain::GoToolchain;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_error, print_json, print_section, print_success, print_warning,
};

/// Build inputs. Every flag falls back to the CI environment variable named next to it.
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
  /// Comma-separated kernel/arch targets, e.g. linux/amd64,windows/amd64
  #[arg(long, env = env::PLATFORMS)]
  pub platforms: Option<String>,

  /// Package subdirectory to build (empty builds the repository root)
  #[arg(long, env = env::PACKAGE)]
  pub package: Option<String>,

  /// Archive each build ("true" to enable)
  #[arg(long, env = env::COMPRESS)]
  pub compress: Option<String>,

  /// Output directory, relative to the workspace root
  #[arg(long, env = env::DEST)]
  pub dest: Option<String>,

  /// Extra linker flags passed to go build
  #[arg(long, env = env::LDFLAGS, allow_hyphen_values = true)]
  pub ldflags: Option<String>,

  /// Space-separated extra files bundled into archives
  #[arg(long, env = env::EXTRAS)]
  pub extras: Option<String>,

  /// Output binary base name
  #[arg(long, env = env::NAME)]
  pub name: Option<String>,

  /// Workspace root the destination is resolved against
  #[arg(long, env = env::WORKSPACE)]
  pub workspace: Option<PathBuf>,

  /// Go compiler program
  #[arg(long, env = env::GO)]
  pub go: Option<String>,

  /// Number of platforms to build concurrently
  #[arg(short, long, env = env::JOBS)]
  pub jobs: Option<String>,

  /// Keep building remaining platforms after a failure ("true" to enable)
  #[arg(long, env = env::KEEP_GOING)]
  pub keep_going: Option<String>,
}

impl From<BuildArgs> for Inputs {
  fn from(args: BuildArgs) -> Self {
    Inputs {
      platforms: args.platforms.unwrap_or_default(),
      package: args.package.unwrap_or_default(),
      compress: args.compress.unwrap_or_default(),
      dest: args.dest.unwrap_or_default(),
      ldflags: args.ldflags.unwrap_or_default(),
      extras: args.extras.unwrap_or_default(),
      name: args.name.unwrap_or_default(),
      workspace: args.workspace.filter(|w| !w.as_os_str().is_empty()),
      go: args.go,
      jobs: args.jobs,
      keep_going: args.keep_going.unwrap_or_default(),
    }
  }
}

/// Validate, build every platform, then report outcomes and the destination listing.
///
/// The report is printed on stdout; per-platform failures and the final error are
/// diagnostics and go to stderr.
pub fn cmd_build(args: BuildArgs, format: OutputFormat) -> Result<()> {
  let source_dir = std::env::current_dir().context("Failed to read the current directory")?;
  let config = BuildConfig::from_inputs(args.into(), source_dir).context("Invalid configuration")?;
  let config = Arc::new(config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(run(config.clone(), Arc::new(GoToolchain)))?;

  let inventory = list_dir(&config.dest_dir).context("An error occurred during ls operation")?;

  if format.is_json() {
    print_report_json(&report, &inventory)?;
  } else {
    print_report(&report, &inventory);
  }

  if !report.is_success() {
    bail!("{} of {} platform(s) failed", report.failures.len(), config.platforms.len());
  }

  info!(dest = %config.dest_dir.display(), "all platforms built");
  Ok(())
}

fn describe(outcome: &BuildOutcome) -> String {
  let what = match &outcome.kind {
    ArtifactKind::Executable => "built".to_string(),
    ArtifactKind::Archive(format) => format!("packaged ({}, {} file(s))", format, outcome.contents.len()),
  };
  format!(
    "{} {} {} in {}",
    outcome.platform,
    what,
    outcome.path.display(),
    format_duration(outcome.elapsed)
  )
}

fn print_report(report: &RunReport, inventory: &[InventoryEntry]) {
  for outcome in &report.outcomes {
    print_success(&describe(outcome));
  }
  for failure in &report.failures {
    print_error(&failure.to_string());
  }

  print_section("BUILD FILES");
  if inventory.is_empty() {
    print_warning("destination directory is empty");
  }
  for entry in inventory {
    println!("{} {:>7} {}", entry.mode_string(), format_bytes(entry.size), entry.name);
  }
}

fn print_report_json(report: &RunReport, inventory: &[InventoryEntry]) -> Result<()> {
  let failures: Vec<_> = report
    .failures
    .iter()
    .map(|f| {
      serde_json::json!({
        "platform": f.platform,
        "stage": f.stage.to_string(),
        "error": f.to_string(),
      })
    })
    .collect();
  let json_output = serde_json::json!({
    "outcomes": report.outcomes,
    "failures": failures,
    "inventory": inventory,
  });
  print_json(&json_output)
}
