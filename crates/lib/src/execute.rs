//! Run orchestration across all requested platforms.
//!
//! With one job, platforms are built strictly in list order. With more, independent
//! platforms run concurrently on a [`JoinSet`] bounded by a semaphore, every log line is
//! tagged with its platform span, and the report is put back into list order. A fail-fast
//! abort sweeps the staging directories the cancelled platforms left behind.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::build::{BuildError, BuildOutcome, build_platform};
use crate::config::{BuildConfig, FailurePolicy};
use crate::package;
use crate::platform::Host;
use crate::toolchain::Toolchain;

#[derive(Debug, Error)]
pub enum RunError {
  #[error("failed to create destination directory {}: {source}", path.display())]
  CreateDest {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Build(#[from] BuildError),

  #[error("build task panicked: {0}")]
  Task(#[from] tokio::task::JoinError),
}

/// Results of a run, both in platform list order.
#[derive(Debug, Default)]
pub struct RunReport {
  pub outcomes: Vec<BuildOutcome>,
  /// Only populated under [`FailurePolicy::KeepGoing`].
  pub failures: Vec<BuildError>,
}

impl RunReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Build every configured platform.
pub async fn run<T>(config: Arc<BuildConfig>, toolchain: Arc<T>) -> Result<RunReport, RunError>
where
  T: Toolchain + 'static,
{
  tokio::fs::create_dir_all(&config.dest_dir)
    .await
    .map_err(|source| RunError::CreateDest {
      path: config.dest_dir.clone(),
      source,
    })?;

  let host = Host::current();
  info!(
    host = %host,
    platforms = config.platforms.len(),
    jobs = config.jobs.get(),
    compress = config.compress,
    "starting builds"
  );

  let report = if config.jobs.get() == 1 {
    run_sequential(&config, &host, toolchain.as_ref()).await?
  } else {
    run_parallel(config.clone(), host, toolchain).await?
  };

  info!(
    built = report.outcomes.len(),
    failed = report.failures.len(),
    "builds complete"
  );

  Ok(report)
}

async fn run_sequential<T: Toolchain>(config: &BuildConfig, host: &Host, toolchain: &T) -> Result<RunReport, RunError> {
  let mut report = RunReport::default();

  for spec in &config.platforms {
    let span = info_span!("platform", target = %spec);
    match build_platform(config, spec, host, toolchain).instrument(span).await {
      Ok(outcome) => report.outcomes.push(outcome),
      Err(e) => match config.failure_policy {
        FailurePolicy::FailFast => return Err(e.into()),
        FailurePolicy::KeepGoing => {
          error!(error = %e, "build failed, continuing with remaining platforms");
          report.failures.push(e);
        }
      },
    }
  }

  Ok(report)
}

async fn run_parallel<T>(config: Arc<BuildConfig>, host: Host, toolchain: Arc<T>) -> Result<RunReport, RunError>
where
  T: Toolchain + 'static,
{
  let semaphore = Arc::new(Semaphore::new(config.jobs.get()));
  let mut join_set = JoinSet::new();

  for (index, spec) in config.platforms.iter().enumerate() {
    let config = config.clone();
    let toolchain = toolchain.clone();
    let semaphore = semaphore.clone();
    let spec = spec.clone();
    let span = info_span!("platform", target = %spec);

    join_set.spawn(
      async move {
        let _permit = semaphore.acquire().await.ok();
        let result = build_platform(&config, &spec, &host, toolchain.as_ref()).await;
        (index, result)
      }
      .instrument(span),
    );
  }

  let mut outcomes = Vec::new();
  let mut failures = Vec::new();

  while let Some(joined) = join_set.join_next().await {
    match joined? {
      (index, Ok(outcome)) => outcomes.push((index, outcome)),
      (index, Err(e)) => match config.failure_policy {
        FailurePolicy::FailFast => {
          join_set.abort_all();
          while join_set.join_next().await.is_some() {}
          sweep_aborted(config.dest_dir.clone()).await;
          return Err(e.into());
        }
        FailurePolicy::KeepGoing => {
          error!(error = %e, "build failed, continuing with remaining platforms");
          failures.push((index, e));
        }
      },
    }
  }

  outcomes.sort_by_key(|(index, _)| *index);
  failures.sort_by_key(|(index, _)| *index);

  Ok(RunReport {
    outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
    failures: failures.into_iter().map(|(_, e)| e).collect(),
  })
}

/// Remove staging directories of platforms cancelled mid-build.
async fn sweep_aborted(dest_dir: PathBuf) {
  match tokio::task::spawn_blocking(move || package::sweep_staging(&dest_dir)).await {
    Ok(Ok(0)) => {}
    Ok(Ok(removed)) => debug!(removed, "removed staging directories of aborted builds"),
    Ok(Err(e)) => warn!(error = %e, "failed to remove staging directories of aborted builds"),
    Err(e) => warn!(error = %e, "staging sweep did not complete"),
  }
}
