//! File naming rules for build artifacts and archives.

use std::fmt;

use serde::Serialize;

use crate::platform::PlatformSpec;

const EXE_SUFFIX: &str = ".exe";

/// Container format used when packaging a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
  Zip,
  TarGz,
}

impl ArchiveFormat {
  /// Zip for Windows targets, gzip-compressed tar for everything else.
  pub fn for_platform(spec: &PlatformSpec) -> Self {
    if spec.is_windows() { Self::Zip } else { Self::TarGz }
  }

  pub fn extension(&self) -> &'static str {
    match self {
      Self::Zip => ".zip",
      Self::TarGz => ".tar.gz",
    }
  }
}

impl fmt::Display for ArchiveFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Zip => write!(f, "zip"),
      Self::TarGz => write!(f, "tar.gz"),
    }
  }
}

/// `{name}-{kernel}-{arch}` without any extension.
fn stem(name: &str, spec: &PlatformSpec) -> String {
  format!("{}-{}-{}", name, spec.kernel, spec.arch)
}

fn with_exe(mut file: String, spec: &PlatformSpec) -> String {
  if spec.is_windows() {
    file.push_str(EXE_SUFFIX);
  }
  file
}

/// Fully qualified executable name, e.g. `mytool-windows-amd64.exe`.
pub fn qualified_name(name: &str, spec: &PlatformSpec) -> String {
  with_exe(stem(name, spec), spec)
}

/// Name the compiler writes the executable under.
///
/// Packaged builds use the bare binary name so the archive holds `mytool` (or `mytool.exe`);
/// the platform qualification moves to the archive name instead.
pub fn build_file_name(name: &str, spec: &PlatformSpec, compress: bool) -> String {
  if compress {
    with_exe(name.to_string(), spec)
  } else {
    qualified_name(name, spec)
  }
}

/// Archive name, e.g. `mytool-linux-amd64.tar.gz`.
pub fn archive_name(name: &str, spec: &PlatformSpec) -> String {
  let mut file = stem(name, spec);
  file.push_str(ArchiveFormat::for_platform(spec).extension());
  file
}
