//! The per-platform build-and-package routine.
//!
//! One call to [`build_platform`] moves a single target through
//! `Configured -> Compiled -> [Packaged -> Cleaned] -> Done`, the bracketed part only when
//! compression is enabled. Any failing step yields a [`BuildError`] naming the stage; the
//! caller decides whether that aborts the run.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{Span, debug, info, warn};

use crate::config::BuildConfig;
use crate::naming::{self, ArchiveFormat};
use crate::package::{self, PackageError};
use crate::platform::{Host, PlatformSpec};
use crate::toolchain::{CompileInvocation, Toolchain, resolve_ldflags};

/// Step of the routine that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Build,
  Copy,
  Compression,
  Cleanup,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let stage = match self {
      Self::Build => "build",
      Self::Copy => "copy operation",
      Self::Compression => "compression",
      Self::Cleanup => "cleanup",
    };
    write!(f, "{}", stage)
  }
}

#[derive(Debug, Error)]
#[error("an error occurred during {stage} for {platform}: {source}")]
pub struct BuildError {
  pub platform: PlatformSpec,
  pub stage: Stage,
  #[source]
  pub source: Box<dyn StdError + Send + Sync>,
}

impl BuildError {
  pub fn new(platform: &PlatformSpec, stage: Stage, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
    Self {
      platform: platform.clone(),
      stage,
      source: source.into(),
    }
  }
}

/// What a successful build left in the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "format")]
pub enum ArtifactKind {
  Executable,
  Archive(ArchiveFormat),
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
  pub platform: PlatformSpec,
  pub path: PathBuf,
  pub kind: ArtifactKind,
  /// Archive entries, empty for plain executables.
  pub contents: Vec<String>,
  #[serde(skip)]
  pub elapsed: Duration,
}

/// Build one platform and, when configured, package it.
pub async fn build_platform<T: Toolchain>(
  config: &BuildConfig,
  spec: &PlatformSpec,
  host: &Host,
  toolchain: &T,
) -> Result<BuildOutcome, BuildError> {
  let started = Instant::now();
  let build_file = naming::build_file_name(&config.name, spec, config.compress);

  let staging = if config.compress {
    let dir = package::staging_dir(&config.dest_dir, spec);
    let prepare = dir.clone();
    in_current_span(move || package::prepare_staging(&prepare))
      .await
      .map_err(|e| BuildError::new(spec, Stage::Copy, e))?
      .map_err(|e| BuildError::new(spec, Stage::Copy, e))?;
    Some(dir)
  } else {
    None
  };

  let output = staging.as_ref().unwrap_or(&config.dest_dir).join(&build_file);

  let ldflags = resolve_ldflags(&config.ldflags, spec, host);
  if ldflags != config.ldflags {
    debug!(host = %host, "target matches host, linking statically");
  }

  let invocation = CompileInvocation::new(
    &config.go,
    spec,
    ldflags,
    &output,
    &config.package,
    &config.source_dir,
  );

  info!(command = %invocation, "creating build");
  let stdout = match toolchain.compile(&invocation).await {
    Ok(stdout) => stdout,
    Err(e) => {
      if let Some(dir) = staging {
        discard_staging(dir).await;
      }
      return Err(BuildError::new(spec, Stage::Build, e));
    }
  };
  if !stdout.is_empty() {
    info!(output = %stdout, "compiler output");
  }

  let Some(staging) = staging else {
    info!(path = %output.display(), "build complete");
    return Ok(BuildOutcome {
      platform: spec.clone(),
      path: output,
      kind: ArtifactKind::Executable,
      contents: Vec::new(),
      elapsed: started.elapsed(),
    });
  };

  let format = ArchiveFormat::for_platform(spec);
  let archive = config.dest_dir.join(naming::archive_name(&config.name, spec));
  let source_dir = config.source_dir.clone();
  let extras = config.extras.clone();
  let archive_path = archive.clone();
  let leftover = staging.clone();

  let packaged = in_current_span(move || {
    let mut entries = vec![build_file.clone()];
    let staged = package::stage_extras(&source_dir, &staging, &extras, &build_file).map_err(|e| (Stage::Copy, e))?;
    entries.extend(staged);

    info!(archive = %archive_path.display(), entries = ?entries, "compressing build files");
    package::write_archive(format, &staging, &entries, &archive_path).map_err(|e| (Stage::Compression, e))?;

    info!(path = %staging.display(), "performing cleanup");
    package::cleanup(&staging).map_err(|e| (Stage::Cleanup, e))?;

    Ok::<_, (Stage, PackageError)>(entries)
  })
  .await
  .map_err(|e| BuildError::new(spec, Stage::Compression, e))?;

  let contents = match packaged {
    Ok(contents) => contents,
    Err((stage, e)) => {
      if stage != Stage::Cleanup {
        discard_staging(leftover).await;
      }
      return Err(BuildError::new(spec, stage, e));
    }
  };

  info!(path = %archive.display(), "package complete");
  Ok(BuildOutcome {
    platform: spec.clone(),
    path: archive,
    kind: ArtifactKind::Archive(format),
    contents,
    elapsed: started.elapsed(),
  })
}

/// Run blocking work on the blocking pool, keeping the caller's platform span.
async fn in_current_span<F, R>(work: F) -> Result<R, tokio::task::JoinError>
where
  F: FnOnce() -> R + Send + 'static,
  R: Send + 'static,
{
  let span = Span::current();
  tokio::task::spawn_blocking(move || span.in_scope(work)).await
}

/// Best-effort removal of a staging directory after a failed step.
async fn discard_staging(dir: PathBuf) {
  let result = in_current_span(move || package::cleanup(&dir)).await;
  if let Ok(Err(e)) = result {
    warn!(error = %e, "failed to discard staging directory");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use std::num::NonZeroUsize;

  use tempfile::TempDir;

  use crate::config::FailurePolicy;
  use crate::testutil::{RecordingToolchain, dir_names};

  fn config(src: &TempDir, dest: &TempDir, compress: bool) -> BuildConfig {
    BuildConfig {
      platforms: Vec::new(),
      package: String::new(),
      dest_dir: dest.path().to_path_buf(),
      source_dir: src.path().to_path_buf(),
      ldflags: "-s -w".to_string(),
      compress,
      extras: Vec::new(),
      name: "mytool".to_string(),
      go: "go".to_string(),
      jobs: NonZeroUsize::MIN,
      failure_policy: FailurePolicy::FailFast,
    }
  }

  fn foreign_host() -> Host {
    Host {
      kernel: Some("plan9"),
      arch: Some("386"),
    }
  }

  #[tokio::test]
  async fn uncompressed_build_uses_qualified_name() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let toolchain = RecordingToolchain::default();
    let spec = PlatformSpec::new("linux", "amd64");

    let outcome = build_platform(&config(&src, &dest, false), &spec, &foreign_host(), &toolchain)
      .await
      .unwrap();

    assert_eq!(outcome.kind, ArtifactKind::Executable);
    assert_eq!(outcome.path, dest.path().join("mytool-linux-amd64"));
    assert_eq!(dir_names(dest.path()), ["mytool-linux-amd64"]);

    let invocations = toolchain.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].args[4], "-s -w");
    assert_eq!(invocations[0].cwd, src.path());
  }

  #[tokio::test]
  async fn same_platform_twice_overwrites_same_path() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let toolchain = RecordingToolchain::default();
    let spec = PlatformSpec::new("darwin", "arm64");
    let config = config(&src, &dest, false);

    let first = build_platform(&config, &spec, &foreign_host(), &toolchain).await.unwrap();
    let second = build_platform(&config, &spec, &foreign_host(), &toolchain).await.unwrap();

    assert_eq!(first.path, second.path);
    assert_eq!(dir_names(dest.path()), ["mytool-darwin-arm64"]);
  }

  #[tokio::test]
  async fn native_target_links_statically() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let toolchain = RecordingToolchain::default();
    let host = Host {
      kernel: Some("linux"),
      arch: Some("amd64"),
    };

    build_platform(&config(&src, &dest, false), &PlatformSpec::new("linux", "amd64"), &host, &toolchain)
      .await
      .unwrap();

    assert_eq!(
      toolchain.invocations()[0].args[4],
      r#"-s -w -linkmode external -extldflags "-static""#
    );
  }

  #[tokio::test]
  async fn windows_package_contains_short_exe_and_extras() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    fs::write(src.path().join("README.md"), "readme").unwrap();
    let toolchain = RecordingToolchain::default();
    let spec = PlatformSpec::new("windows", "amd64");
    let mut config = config(&src, &dest, true);
    config.extras = vec!["README.md".to_string(), "CHANGELOG.md".to_string()];

    let outcome = build_platform(&config, &spec, &foreign_host(), &toolchain).await.unwrap();

    assert_eq!(outcome.kind, ArtifactKind::Archive(ArchiveFormat::Zip));
    assert_eq!(outcome.contents, ["mytool.exe", "README.md"]);
    assert_eq!(dir_names(dest.path()), ["mytool-windows-amd64.zip"]);
    assert!(src.path().join("README.md").exists(), "source extra must not be removed");

    let output = &toolchain.invocations()[0].output;
    assert_eq!(output.file_name().unwrap(), "mytool.exe");
  }

  #[tokio::test]
  async fn unix_package_is_tar_gz() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let toolchain = RecordingToolchain::default();
    let spec = PlatformSpec::new("linux", "arm64");

    let outcome = build_platform(&config(&src, &dest, true), &spec, &foreign_host(), &toolchain)
      .await
      .unwrap();

    assert_eq!(outcome.kind, ArtifactKind::Archive(ArchiveFormat::TarGz));
    assert_eq!(outcome.contents, ["mytool"]);
    assert_eq!(dir_names(dest.path()), ["mytool-linux-arm64.tar.gz"]);
  }

  #[tokio::test]
  async fn compiler_failure_is_build_stage_error() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let spec = PlatformSpec::new("linux", "amd64");
    let toolchain = RecordingToolchain::failing_on(&spec);

    let err = build_platform(&config(&src, &dest, false), &spec, &foreign_host(), &toolchain)
      .await
      .unwrap_err();

    assert_eq!(err.stage, Stage::Build);
    assert_eq!(err.platform, spec);
    assert!(
      err
        .to_string()
        .starts_with("an error occurred during build for linux/amd64:")
    );
    assert!(dir_names(dest.path()).is_empty());
  }

  #[tokio::test]
  async fn archive_failure_is_compression_stage_and_discards_staging() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let toolchain = RecordingToolchain::without_output();
    let spec = PlatformSpec::new("linux", "arm64");

    let err = build_platform(&config(&src, &dest, true), &spec, &foreign_host(), &toolchain)
      .await
      .unwrap_err();

    assert_eq!(err.stage, Stage::Compression);
    assert!(
      err
        .to_string()
        .starts_with("an error occurred during compression for linux/arm64:")
    );
    assert!(dir_names(dest.path()).is_empty(), "staging and partial archive must be gone");
  }

  #[tokio::test]
  async fn extra_holding_destination_is_copy_stage() {
    let src = TempDir::new().unwrap();
    let spec = PlatformSpec::new("darwin", "arm64");
    let mut config = config(&src, &src, true);
    config.dest_dir = src.path().join("dist");
    config.extras = vec!["dist".to_string()];
    fs::create_dir_all(&config.dest_dir).unwrap();

    let err = build_platform(&config, &spec, &foreign_host(), &RecordingToolchain::default())
      .await
      .unwrap_err();

    assert_eq!(err.stage, Stage::Copy);
    assert!(
      err
        .to_string()
        .starts_with("an error occurred during copy operation for darwin/arm64:")
    );
    assert!(dir_names(&config.dest_dir).is_empty());
  }

  #[tokio::test]
  async fn unusable_destination_is_copy_stage() {
    let (src, dest) = (TempDir::new().unwrap(), TempDir::new().unwrap());
    let mut config = config(&src, &dest, true);
    config.dest_dir = dest.path().join("dist");
    fs::write(&config.dest_dir, "not a directory").unwrap();
    let toolchain = RecordingToolchain::default();

    let err = build_platform(&config, &PlatformSpec::new("linux", "amd64"), &foreign_host(), &toolchain)
      .await
      .unwrap_err();

    assert_eq!(err.stage, Stage::Copy);
    let source = err.source.downcast_ref::<PackageError>().unwrap();
    assert!(matches!(source, PackageError::Staging { .. }));
    assert!(toolchain.invocations().is_empty());
  }

  #[test]
  fn stage_names_read_as_steps() {
    let rendered: Vec<_> = [Stage::Build, Stage::Copy, Stage::Compression, Stage::Cleanup]
      .iter()
      .map(ToString::to_string)
      .collect();
    assert_eq!(rendered, ["build", "copy operation", "compression", "cleanup"]);
  }
}
