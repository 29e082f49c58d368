//! Packaging of a finished build: extra file staging, archive writing and cleanup.
//!
//! Every packaged platform works inside its own staging directory under the destination,
//! so concurrent platforms never share intermediate files (including copies of the same
//! extra file). Only the archive is left behind once [`cleanup`] has run.
//!
//! All functions here are blocking and are expected to run on a blocking thread.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::naming::ArchiveFormat;
use crate::platform::PlatformSpec;

/// Maximum deflate level, matching `zip -9`.
const ZIP_LEVEL: i64 = 9;

const STAGING_PREFIX: &str = ".gocross-";

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("failed to create staging directory {}: {source}", path.display())]
  Staging {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("extra file {} contains the destination directory", path.display())]
  ContainsDestination { path: PathBuf },

  #[error("failed to copy {} to {}: {source}", src.display(), dest.display())]
  Copy {
    src: PathBuf,
    dest: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {}: {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to write archive {}: {source}", path.display())]
  Archive {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {}: {source}", path.display())]
  Cleanup {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Staging directory for one platform, e.g. `<dest>/.gocross-linux-amd64`.
pub fn staging_dir(dest_dir: &Path, spec: &PlatformSpec) -> PathBuf {
  dest_dir.join(format!("{}{}-{}", STAGING_PREFIX, spec.kernel, spec.arch))
}

/// Create an empty staging directory, discarding anything left by an earlier run.
pub fn prepare_staging(dir: &Path) -> Result<(), PackageError> {
  if dir.exists() {
    cleanup(dir)?;
  }
  fs::create_dir_all(dir).map_err(|source| PackageError::Staging {
    path: dir.to_path_buf(),
    source,
  })
}

/// Remove every staging directory left in `dest_dir`, returning how many were removed.
///
/// Used after an aborted run, where in-flight platforms never reach their own cleanup.
pub fn sweep_staging(dest_dir: &Path) -> Result<usize, PackageError> {
  let entries = match fs::read_dir(dest_dir) {
    Ok(entries) => entries,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
    Err(source) => {
      return Err(PackageError::Cleanup {
        path: dest_dir.to_path_buf(),
        source,
      });
    }
  };

  let mut removed = 0;
  for entry in entries.flatten() {
    let is_staging = entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX);
    if is_staging && entry.path().is_dir() {
      cleanup(&entry.path())?;
      removed += 1;
    }
  }
  Ok(removed)
}

/// Copy every existing extra file into `staging`, preserving its relative path.
///
/// Returns the tokens that were staged, in order and without duplicates. Tokens that do
/// not exist under `source_dir` are skipped; so is a token that would overwrite `reserved`
/// (the built executable). A directory holding `staging` itself cannot be copied into it.
pub fn stage_extras(
  source_dir: &Path,
  staging: &Path,
  extras: &[String],
  reserved: &str,
) -> Result<Vec<String>, PackageError> {
  let mut seen = HashSet::new();
  let mut staged = Vec::new();

  for token in extras {
    let name = entry_name(Path::new(token));
    if name.is_empty() || !seen.insert(name.clone()) {
      continue;
    }
    if name == reserved {
      warn!(extra = %token, "extra file has the same name as the binary, skipping");
      continue;
    }

    let src = source_dir.join(token);
    let exists = src.try_exists().map_err(|source| PackageError::Copy {
      src: src.clone(),
      dest: staging.to_path_buf(),
      source,
    })?;
    if !exists {
      debug!(extra = %token, "extra file not found, skipping");
      continue;
    }

    if src.is_dir() && contains(&src, staging)? {
      return Err(PackageError::ContainsDestination { path: src });
    }

    copy_recursive(&src, &staging.join(&name))?;
    staged.push(name);
  }

  Ok(staged)
}

/// Whether `inner` lies inside the directory `outer`, comparing canonical paths.
fn contains(outer: &Path, inner: &Path) -> Result<bool, PackageError> {
  let outer = outer.canonicalize().map_err(copy_err(outer, inner))?;
  let inner = inner.canonicalize().map_err(copy_err(&outer, inner))?;
  Ok(inner.starts_with(outer))
}

fn copy_err(from: &Path, to: &Path) -> impl FnOnce(io::Error) -> PackageError {
  let (src, dest) = (from.to_path_buf(), to.to_path_buf());
  move |source| PackageError::Copy { src, dest, source }
}

fn copy_recursive(src: &Path, dest: &Path) -> Result<(), PackageError> {
  if !src.is_dir() {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(copy_err(src, parent))?;
    }
    fs::copy(src, dest).map_err(copy_err(src, dest))?;
    return Ok(());
  }

  for entry in WalkDir::new(src).follow_links(true) {
    let entry = entry.map_err(|source| PackageError::Walk {
      path: src.to_path_buf(),
      source,
    })?;
    let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
    let target = dest.join(relative);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(copy_err(entry.path(), &target))?;
    } else {
      fs::copy(entry.path(), &target).map_err(copy_err(entry.path(), &target))?;
    }
  }

  Ok(())
}

/// Write `entries` (paths relative to `root`) into a new archive at `out`.
///
/// Directories are added with all of their contents. A partially written archive is removed.
pub fn write_archive(format: ArchiveFormat, root: &Path, entries: &[String], out: &Path) -> Result<(), PackageError> {
  let archive_err = |source| PackageError::Archive {
    path: out.to_path_buf(),
    source,
  };

  let file = File::create(out).map_err(archive_err)?;
  let written = match format {
    ArchiveFormat::TarGz => write_tar_gz(BufWriter::new(file), root, entries, out),
    ArchiveFormat::Zip => write_zip(file, root, entries, out),
  };

  if written.is_err() {
    if let Err(e) = fs::remove_file(out) {
      warn!(path = %out.display(), error = %e, "failed to remove partial archive");
    }
  }
  written
}

fn write_tar_gz(writer: BufWriter<File>, root: &Path, entries: &[String], out: &Path) -> Result<(), PackageError> {
  let archive_err = |source| PackageError::Archive {
    path: out.to_path_buf(),
    source,
  };

  let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::best()));
  for name in entries {
    let path = root.join(name);
    if path.is_dir() {
      builder.append_dir_all(name, &path).map_err(archive_err)?;
    } else {
      builder.append_path_with_name(&path, name).map_err(archive_err)?;
    }
  }

  let encoder = builder.into_inner().map_err(archive_err)?;
  let mut writer = encoder.finish().map_err(archive_err)?;
  io::Write::flush(&mut writer).map_err(archive_err)
}

fn write_zip(file: File, root: &Path, entries: &[String], out: &Path) -> Result<(), PackageError> {
  let archive_err = |source| PackageError::Archive {
    path: out.to_path_buf(),
    source,
  };

  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .compression_level(Some(ZIP_LEVEL));

  let mut writer = ZipWriter::new(file);
  for name in entries {
    let path = root.join(name);
    for entry in WalkDir::new(&path).follow_links(true).sort_by_file_name() {
      let entry = entry.map_err(|source| PackageError::Walk {
        path: path.clone(),
        source,
      })?;
      let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
      let entry_path = entry_name(relative);
      let options = with_permissions(options, entry.path());

      if entry.file_type().is_dir() {
        writer
          .add_directory(format!("{}/", entry_path), options)
          .map_err(|e| archive_err(io::Error::other(e)))?;
      } else {
        writer
          .start_file(entry_path, options)
          .map_err(|e| archive_err(io::Error::other(e)))?;
        let mut input = File::open(entry.path()).map_err(archive_err)?;
        io::copy(&mut input, &mut writer).map_err(archive_err)?;
      }
    }
  }

  writer.finish().map_err(|e| archive_err(io::Error::other(e)))?;
  Ok(())
}

#[cfg(unix)]
fn with_permissions(options: SimpleFileOptions, path: &Path) -> SimpleFileOptions {
  use std::os::unix::fs::PermissionsExt;

  match fs::metadata(path) {
    Ok(meta) => options.unix_permissions(meta.permissions().mode() & 0o7777),
    Err(_) => options,
  }
}

#[cfg(not(unix))]
fn with_permissions(options: SimpleFileOptions, _path: &Path) -> SimpleFileOptions {
  options
}

/// Remove a staging directory and everything in it.
pub fn cleanup(dir: &Path) -> Result<(), PackageError> {
  fs::remove_dir_all(dir).map_err(|source| PackageError::Cleanup {
    path: dir.to_path_buf(),
    source,
  })
}

/// Archive entry name for a relative path: normal components joined with `/`.
fn entry_name(path: &Path) -> String {
  path
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}
