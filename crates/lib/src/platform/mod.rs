pub mod arch;
pub mod os;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Separator between the kernel and architecture in a platform token.
pub const PLATFORM_SEPARATOR: char = '/';

/// A cross-compilation target in Go notation (e.g., "linux/amd64").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlatformSpec {
  pub kernel: String,
  pub arch: String,
}

impl PlatformSpec {
  pub fn new(kernel: impl Into<String>, arch: impl Into<String>) -> Self {
    Self {
      kernel: kernel.into(),
      arch: arch.into(),
    }
  }

  pub fn is_windows(&self) -> bool {
    self.kernel == "windows"
  }
}

impl fmt::Display for PlatformSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}{}", self.kernel, PLATFORM_SEPARATOR, self.arch)
  }
}

/// A platform token that is not exactly two non-empty `/`-separated components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid platform {token:?}: expected <kernel>/<arch>")]
pub struct ParsePlatformError {
  pub token: String,
}

impl FromStr for PlatformSpec {
  type Err = ParsePlatformError;

  /// Parses a `kernel/arch` token. All whitespace is stripped first.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let token: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || ParsePlatformError { token: s.to_string() };

    let mut parts = token.split(PLATFORM_SEPARATOR);
    let (Some(kernel), Some(arch), None) = (parts.next(), parts.next(), parts.next()) else {
      return Err(invalid());
    };
    if kernel.is_empty() || arch.is_empty() {
      return Err(invalid());
    }

    Ok(Self::new(kernel, arch))
  }
}

/// The kernel and architecture of the machine running the build, in Go notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Host {
  pub kernel: Option<&'static str>,
  pub arch: Option<&'static str>,
}

impl Host {
  /// Detect the current host at runtime
  pub fn current() -> Self {
    Self {
      kernel: os::host_goos(),
      arch: arch::host_goarch(),
    }
  }

  /// Returns true when `spec` targets this host, i.e. no cross-compilation is in effect.
  ///
  /// An undetected kernel or architecture never matches.
  pub fn matches(&self, spec: &PlatformSpec) -> bool {
    self.kernel == Some(spec.kernel.as_str()) && self.arch == Some(spec.arch.as_str())
  }
}

impl fmt::Display for Host {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}{}{}",
      self.kernel.unwrap_or("unknown"),
      PLATFORM_SEPARATOR,
      self.arch.unwrap_or("unknown")
    )
  }
}
