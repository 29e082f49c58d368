//! Run configuration intake and validation.
//!
//! Raw values arrive as strings (usually from `INPUT_*` environment variables set by the
//! CI runner) in an [`Inputs`] value. [`BuildConfig::from_inputs`] normalizes and validates
//! all of them up front, so a malformed platform token is reported before any compiler runs.

use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::platform::{ParsePlatformError, PlatformSpec};

/// Environment variable names read by the CLI.
pub mod env {
  pub const PLATFORMS: &str = "INPUT_PLATFORMS";
  pub const PACKAGE: &str = "INPUT_PACKAGE";
  pub const COMPRESS: &str = "INPUT_COMPRESS";
  pub const DEST: &str = "INPUT_DEST";
  pub const LDFLAGS: &str = "INPUT_LDFLAGS";
  pub const EXTRAS: &str = "INPUT_EXTRAS";
  pub const NAME: &str = "INPUT_NAME";
  pub const WORKSPACE: &str = "GITHUB_WORKSPACE";
  pub const GO: &str = "INPUT_GO";
  pub const JOBS: &str = "INPUT_JOBS";
  pub const KEEP_GOING: &str = "INPUT_KEEP_GOING";
}

/// Default compiler program.
pub const DEFAULT_GO: &str = "go";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(transparent)]
  InvalidPlatform(#[from] ParsePlatformError),

  #[error("binary name must not be empty")]
  MissingName,

  #[error("invalid extra file {token:?}: must be a relative path inside the working directory")]
  InvalidExtra { token: String },

  #[error("invalid job count {value:?}: expected a positive integer")]
  InvalidJobs { value: String },
}

/// Raw, un-normalized run parameters.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
  /// Comma-separated `kernel/arch` tokens.
  pub platforms: String,
  /// Package subdirectory to build, empty for the repository root.
  pub package: String,
  /// `"true"` (any case) enables archiving.
  pub compress: String,
  /// Destination directory, relative to `workspace`.
  pub dest: String,
  pub ldflags: String,
  /// Space-separated extra files bundled into archives.
  pub extras: String,
  /// Output binary base name.
  pub name: String,
  pub workspace: Option<PathBuf>,
  pub go: Option<String>,
  pub jobs: Option<String>,
  pub keep_going: String,
}

/// What to do with the remaining platforms after one fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
  /// Abort the whole run on the first failure.
  #[default]
  FailFast,
  /// Attempt every platform and report all failures at the end.
  KeepGoing,
}

/// Fully validated, immutable configuration for one run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  pub platforms: Vec<PlatformSpec>,
  pub package: String,
  /// Workspace root joined with the normalized destination.
  pub dest_dir: PathBuf,
  /// Directory the compiler runs in and extras are resolved against.
  pub source_dir: PathBuf,
  pub ldflags: String,
  pub compress: bool,
  pub extras: Vec<String>,
  pub name: String,
  pub go: String,
  pub jobs: NonZeroUsize,
  pub failure_policy: FailurePolicy,
}

impl BuildConfig {
  /// Normalize and validate raw inputs.
  ///
  /// `source_dir` is the working directory at invocation time. Nothing is touched on disk.
  pub fn from_inputs(inputs: Inputs, source_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    let platforms = parse_platforms(&inputs.platforms)?;

    let name = inputs.name.trim().to_string();
    if name.is_empty() {
      return Err(ConfigError::MissingName);
    }

    let extras = parse_extras(&inputs.extras)?;
    let jobs = parse_jobs(inputs.jobs.as_deref())?;

    let workspace = inputs.workspace.unwrap_or_else(|| PathBuf::from("."));
    let dest = strip_whitespace(&inputs.dest);
    let dest_dir = if dest.is_empty() { workspace } else { workspace.join(dest) };

    let go = inputs
      .go
      .map(|go| go.trim().to_string())
      .filter(|go| !go.is_empty())
      .unwrap_or_else(|| DEFAULT_GO.to_string());

    let failure_policy = if parse_flag(&inputs.keep_going) {
      FailurePolicy::KeepGoing
    } else {
      FailurePolicy::FailFast
    };

    Ok(Self {
      platforms,
      package: strip_whitespace(&inputs.package),
      dest_dir,
      source_dir: source_dir.into(),
      ldflags: inputs.ldflags,
      compress: parse_flag(&inputs.compress),
      extras,
      name,
      go,
      jobs,
      failure_policy,
    })
  }
}

/// Parse a comma-separated platform list, failing on the first malformed token.
pub fn parse_platforms(list: &str) -> Result<Vec<PlatformSpec>, ParsePlatformError> {
  list.split(',').map(str::parse).collect()
}

/// Case-insensitive `"true"`; anything else is false.
pub fn parse_flag(value: &str) -> bool {
  value.trim().eq_ignore_ascii_case("true")
}

fn parse_extras(value: &str) -> Result<Vec<String>, ConfigError> {
  value
    .split_whitespace()
    .map(|token| {
      let escapes = Path::new(token)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
      if escapes {
        Err(ConfigError::InvalidExtra {
          token: token.to_string(),
        })
      } else {
        Ok(token.to_string())
      }
    })
    .collect()
}

fn parse_jobs(value: Option<&str>) -> Result<NonZeroUsize, ConfigError> {
  match value.map(str::trim).filter(|v| !v.is_empty()) {
    None => Ok(NonZeroUsize::MIN),
    Some(v) => v.parse().map_err(|_| ConfigError::InvalidJobs { value: v.to_string() }),
  }
}

fn strip_whitespace(value: &str) -> String {
  value.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn inputs(platforms: &str) -> Inputs {
    Inputs {
      platforms: platforms.to_string(),
      name: "mytool".to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn parses_platform_list_in_order() {
    let platforms = parse_platforms("linux/amd64, darwin/arm64 ,windows/386").unwrap();
    let rendered: Vec<_> = platforms.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, ["linux/amd64", "darwin/arm64", "windows/386"]);
  }

  #[test]
  fn malformed_token_fails_whole_list() {
    let err = parse_platforms("linux/amd64,darwin,windows/amd64").unwrap_err();
    assert_eq!(err.token, "darwin");
  }

  #[test]
  fn empty_and_trailing_tokens_are_malformed() {
    assert!(parse_platforms("").is_err());
    assert!(parse_platforms("linux/amd64,").is_err());
  }

  #[test]
  fn compress_flag_is_case_insensitive() {
    assert!(parse_flag("true"));
    assert!(parse_flag("TRUE"));
    assert!(parse_flag(" True "));
    assert!(!parse_flag("yes"));
    assert!(!parse_flag(""));
  }

  #[test]
  fn normalizes_package_and_dest() {
    let config = BuildConfig::from_inputs(
      Inputs {
        package: " cmd/ my tool ".to_string(),
        dest: " dist ".to_string(),
        workspace: Some(PathBuf::from("/work")),
        ..inputs("linux/amd64")
      },
      "/src",
    )
    .unwrap();

    assert_eq!(config.package, "cmd/mytool");
    assert_eq!(config.dest_dir, PathBuf::from("/work/dist"));
    assert_eq!(config.source_dir, PathBuf::from("/src"));
  }

  #[test]
  fn defaults() {
    let config = BuildConfig::from_inputs(inputs("linux/amd64"), ".").unwrap();
    assert!(!config.compress);
    assert!(config.extras.is_empty());
    assert_eq!(config.go, DEFAULT_GO);
    assert_eq!(config.jobs.get(), 1);
    assert_eq!(config.failure_policy, FailurePolicy::FailFast);
    assert_eq!(config.dest_dir, PathBuf::from("."));
  }

  #[test]
  fn splits_extras_on_whitespace() {
    let config = BuildConfig::from_inputs(
      Inputs {
        extras: "README.md  LICENSE\tdocs/guide.md ".to_string(),
        ..inputs("linux/amd64")
      },
      ".",
    )
    .unwrap();
    assert_eq!(config.extras, ["README.md", "LICENSE", "docs/guide.md"]);
  }

  #[test]
  fn rejects_extras_escaping_working_directory() {
    for extras in ["../secret", "/etc/passwd", "docs/../../x"] {
      let err = BuildConfig::from_inputs(
        Inputs {
          extras: extras.to_string(),
          ..inputs("linux/amd64")
        },
        ".",
      )
      .unwrap_err();
      assert!(matches!(err, ConfigError::InvalidExtra { .. }), "{extras} should be rejected");
    }
  }

  #[test]
  fn requires_name() {
    let err = BuildConfig::from_inputs(
      Inputs {
        name: "  ".to_string(),
        ..inputs("linux/amd64")
      },
      ".",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::MissingName));
  }

  #[test]
  fn invalid_platform_reported_with_token() {
    let err = BuildConfig::from_inputs(inputs("linux-amd64"), ".").unwrap_err();
    assert_eq!(err.to_string(), r#"invalid platform "linux-amd64": expected <kernel>/<arch>"#);
  }

  #[test]
  fn parses_jobs_and_keep_going() {
    let config = BuildConfig::from_inputs(
      Inputs {
        jobs: Some("4".to_string()),
        keep_going: "True".to_string(),
        go: Some(" /opt/go/bin/go ".to_string()),
        ..inputs("linux/amd64")
      },
      ".",
    )
    .unwrap();
    assert_eq!(config.jobs.get(), 4);
    assert_eq!(config.failure_policy, FailurePolicy::KeepGoing);
    assert_eq!(config.go, "/opt/go/bin/go");

    for bad in ["0", "-1", "many"] {
      let err = BuildConfig::from_inputs(
        Inputs {
          jobs: Some(bad.to_string()),
          ..inputs("linux/amd64")
        },
        ".",
      )
      .unwrap_err();
      assert!(matches!(err, ConfigError::InvalidJobs { .. }), "{bad} should be rejected");
    }
  }
}
