//! Listing of the destination directory after all builds complete.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to list {}: {source}", path.display())]
pub struct InventoryError {
  pub path: PathBuf,
  #[source]
  pub source: io::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
  File,
  Dir,
  Symlink,
  Other,
}

/// One entry of the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
  pub name: String,
  pub kind: EntryKind,
  pub size: u64,
  /// Unix permission bits, when the platform has them.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub mode: Option<u32>,
}

impl InventoryEntry {
  /// `ls`-style mode column, e.g. `-rwxr-xr-x`.
  pub fn mode_string(&self) -> String {
    let kind = match self.kind {
      EntryKind::File => '-',
      EntryKind::Dir => 'd',
      EntryKind::Symlink => 'l',
      EntryKind::Other => '?',
    };

    let Some(mode) = self.mode else {
      return format!("{}---------", kind);
    };

    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
      let bits = (mode >> shift) & 0o7;
      out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
      out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
      out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
  }
}

/// List every entry of `dir`, hidden ones included, sorted by name.
///
/// Symlinks are reported as links and not followed.
pub fn list_dir(dir: &Path) -> Result<Vec<InventoryEntry>, InventoryError> {
  let list_err = |source| InventoryError {
    path: dir.to_path_buf(),
    source,
  };

  let mut entries = Vec::new();
  for entry in fs::read_dir(dir).map_err(list_err)? {
    let entry = entry.map_err(list_err)?;
    let meta = fs::symlink_metadata(entry.path()).map_err(list_err)?;
    let file_type = meta.file_type();

    let kind = if file_type.is_symlink() {
      EntryKind::Symlink
    } else if file_type.is_dir() {
      EntryKind::Dir
    } else if file_type.is_file() {
      EntryKind::File
    } else {
      EntryKind::Other
    };

    entries.push(InventoryEntry {
      name: entry.file_name().to_string_lossy().into_owned(),
      kind,
      size: meta.len(),
      mode: unix_mode(&meta),
    });
  }

  entries.sort_by(|a, b| a.name.cmp(&b.name));
  Ok(entries)
}

#[cfg(unix)]
fn unix_mode(meta: &fs::Metadata) -> Option<u32> {
  use std::os::unix::fs::PermissionsExt;
  Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn unix_mode(_meta: &fs::Metadata) -> Option<u32> {
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn lists_hidden_entries_sorted_with_sizes() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("mytool-linux-amd64"), vec![0u8; 2048]).unwrap();
    fs::write(dir.path().join(".hidden"), "x").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let entries = list_dir(dir.path()).unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();

    assert_eq!(names, [".hidden", "mytool-linux-amd64", "sub"]);
    assert_eq!(entries[0].size, 1);
    assert_eq!(entries[1].size, 2048);
    assert_eq!(entries[1].kind, EntryKind::File);
    assert_eq!(entries[2].kind, EntryKind::Dir);
  }

  #[test]
  fn missing_directory_is_error() {
    let dir = TempDir::new().unwrap();
    let err = list_dir(&dir.path().join("nope")).unwrap_err();
    assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
  }

  #[test]
  fn mode_string_renders_permissions() {
    let entry = InventoryEntry {
      name: "mytool".to_string(),
      kind: EntryKind::File,
      size: 0,
      mode: Some(0o755),
    };
    assert_eq!(entry.mode_string(), "-rwxr-xr-x");

    let dir = InventoryEntry {
      kind: EntryKind::Dir,
      mode: Some(0o700),
      ..entry.clone()
    };
    assert_eq!(dir.mode_string(), "drwx------");

    let unknown = InventoryEntry { mode: None, ..entry };
    assert_eq!(unknown.mode_string(), "----------");
  }
}
