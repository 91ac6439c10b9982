//! Local/remote fileset state, pruning, and atomic manifest I/O.
//!
//! Grounded in `original_source/dnstable_manager/fileset.py`'s `Fileset`
//! class for the write protocol and prune semantics, generalized to the
//! minimal/full-mode distinction this repo adds (the Python original only
//! ever tracks one manifest; here `all_local` tracks the full-mode view and
//! `minimal_local` tracks the minimal-mode view side by side).

use std::collections::HashSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSetBuilder};
use log::{debug, info, warn};

use crate::error::ManifestIoError;
use crate::model::FileDescriptor;
use crate::overlap::compute_overlap;

/// The four tracked sets from the data model, plus the prefix/extension
/// that scope this fileset within its destination directory.
pub struct FilesetState {
  pub directory: PathBuf,
  pub prefix: String,
  pub extension: String,

  pub all_local: HashSet<FileDescriptor>,
  pub minimal_local: HashSet<FileDescriptor>,
  pub remote: HashSet<FileDescriptor>,
  pub pending_deletions: HashSet<FileDescriptor>,
}

impl FilesetState {
  pub fn new(directory: PathBuf, prefix: impl Into<String>, extension: impl Into<String>) -> FilesetState {
    FilesetState {
      directory,
      prefix: prefix.into(),
      extension: extension.into(),
      all_local: HashSet::new(),
      minimal_local: HashSet::new(),
      remote: HashSet::new(),
      pending_deletions: HashSet::new(),
    }
  }

  /// `{dir}/{prefix}.fileset` if minimal, else `{dir}/{prefix}-full.fileset`.
  pub fn get_fileset_name(&self, minimal: bool) -> PathBuf {
    if minimal {
      self.directory.join(format!("{}.fileset", self.prefix))
    } else {
      self.directory.join(format!("{}-full.fileset", self.prefix))
    }
  }

  /// Glob `{dir}/{prefix}.*.[YQMWDHXm].{extension}`, parse each match,
  /// silently drop parse failures.
  pub fn scan_local_directory(&mut self) -> Result<(), ManifestIoError> {
    let pattern = format!(
      "{}.*.[YQMWDHXm].{}",
      self.prefix, self.extension
    );
    let glob = Glob::new(&pattern).expect("fileset include pattern is always valid");
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    let matcher = builder.build().expect("single-glob set always builds");

    let mut found = HashSet::new();
    let entries = std::fs::read_dir(&self.directory).map_err(|e| ManifestIoError::Io {
      path: self.directory.clone(),
      source: e,
    })?;

    for entry in entries {
      let entry = entry.map_err(|e| ManifestIoError::Io {
        path: self.directory.clone(),
        source: e,
      })?;
      let name = entry.file_name();
      let name = match name.to_str() {
        Some(n) => n,
        None => continue,
      };
      if !matcher.is_match(name) {
        continue;
      }
      match FileDescriptor::parse(name) {
        Ok(f) => {
          found.insert(f.with_directory(self.directory.clone()));
        }
        Err(e) => {
          debug!("skipping unparsable local file {name}: {e}");
        }
      }
    }

    self.all_local = found.clone();
    self.minimal_local = found;
    Ok(())
  }

  /// Parse a remote manifest body: one basename per line. Lines that are
  /// not bare basenames, don't start with `{prefix}.`, or don't end with
  /// `.{extension}` are rejected and logged, not fatal.
  pub fn load_remote_fileset(&mut self, manifest_uri: &str, body: &str) {
    let mut remote = HashSet::new();
    for raw_line in body.lines() {
      let line = raw_line.trim_end();
      if line.is_empty() {
        continue;
      }
      if Path::new(line).file_name().and_then(|n| n.to_str()) != Some(line) {
        warn!("rejecting remote manifest line with path separators: {line}");
        continue;
      }
      if !line.starts_with(&format!("{}.", self.prefix)) {
        warn!("rejecting remote manifest line with wrong prefix: {line}");
        continue;
      }
      if !line.ends_with(&format!(".{}", self.extension)) {
        warn!("rejecting remote manifest line with wrong extension: {line}");
        continue;
      }
      match FileDescriptor::parse(line) {
        Ok(f) => {
          let uri = crate::uri::relative_uri(manifest_uri, line);
          remote.insert(
            f.with_directory(self.directory.clone())
              .with_source_uri(uri),
          );
        }
        Err(e) => {
          warn!("rejecting unparsable remote manifest line {line}: {e}");
        }
      }
    }
    self.remote = remote;
  }

  /// `remote \ all_local`.
  pub fn missing_files(&self) -> HashSet<FileDescriptor> {
    self
      .remote
      .difference(&self.all_local)
      .cloned()
      .collect()
  }

  /// `(L \ R) \ O(U)`, and in full mode additionally `O(L) \ O(R)`, where
  /// `L = minimal_local`, `R = remote`, `U = L ∪ R`.
  pub fn prune_obsolete(&mut self, minimal: bool) {
    let l = &self.minimal_local;
    let r = &self.remote;
    let u: HashSet<FileDescriptor> = l.union(r).cloned().collect();
    let overlap_u = compute_overlap(&u);

    let mut obsolete: HashSet<FileDescriptor> = l
      .difference(r)
      .filter(|f| !overlap_u.contains(*f))
      .cloned()
      .collect();

    if !minimal {
      let overlap_l = compute_overlap(l);
      let overlap_r = compute_overlap(r);
      let extra = overlap_l.difference(&overlap_r).cloned();
      obsolete.extend(extra);
    }

    self.pending_deletions.extend(obsolete.iter().cloned());
    self.minimal_local.retain(|f| !obsolete.contains(f));
    self.all_local.retain(|f| !obsolete.contains(f));
  }

  /// `O(L)`, always removed from `minimal_local`. In minimal mode also
  /// removed from `all_local` and scheduled for deletion; in full mode
  /// retained in `all_local` and on disk.
  pub fn prune_redundant(&mut self, minimal: bool) {
    let redundant = compute_overlap(&self.minimal_local);
    self.minimal_local.retain(|f| !redundant.contains(f));

    if minimal {
      self.pending_deletions.extend(redundant.iter().cloned());
      self.all_local.retain(|f| !redundant.contains(f));
    }
  }

  /// Atomic write-or-skip of the manifest file.
  ///
  /// Reads the existing manifest if present; if the symmetric difference
  /// between its lines and the current set's names is empty (and the file
  /// exists), the write is skipped to avoid a spurious mtime change.
  /// Otherwise writes via a sibling tempfile + chmod 0644 + rename.
  pub fn write_manifest(&self, minimal: bool) -> Result<(), ManifestIoError> {
    let path = self.get_fileset_name(minimal);
    let members = if minimal {
      &self.minimal_local
    } else {
      &self.all_local
    };

    let mut names: Vec<&str> = members.iter().map(|f| f.name.as_str()).collect();
    let existing = std::fs::read_to_string(&path).ok();
    if let Some(old) = &existing {
      let old_lines: HashSet<&str> = old.lines().collect();
      let new_lines: HashSet<&str> = names.iter().copied().collect();
      if old_lines == new_lines {
        return Ok(());
      }
    }

    let mut sorted: Vec<&FileDescriptor> = members.iter().collect();
    sorted.sort();
    names = sorted.iter().map(|f| f.name.as_str()).collect();

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let basename = path
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or("fileset");

    let mut tmp = tempfile::Builder::new()
      .prefix(&format!(".{basename}."))
      .rand_bytes(6)
      .tempfile_in(dir)
      .map_err(|e| ManifestIoError::Io {
        path: dir.to_path_buf(),
        source: e,
      })?;

    for name in &names {
      writeln!(tmp, "{name}").map_err(|e| ManifestIoError::Io {
        path: path.clone(),
        source: e,
      })?;
    }
    tmp.flush().map_err(|e| ManifestIoError::Io {
      path: path.clone(),
      source: e,
    })?;

    set_permissions_0644(tmp.path())?;

    tmp.persist(&path).map_err(|e| ManifestIoError::Io {
      path: path.clone(),
      source: e.error,
    })?;

    info!("wrote manifest {} ({} entries)", path.display(), names.len());
    Ok(())
  }

  /// Unlink every file in `pending_deletions`, in the total order,
  /// tolerating a file that has already vanished.
  pub fn purge_deleted_files(&mut self) {
    let mut sorted: Vec<FileDescriptor> = self.pending_deletions.drain().collect();
    sorted.sort();
    for f in sorted {
      let path = f.path();
      match std::fs::remove_file(&path) {
        Ok(()) => info!("unlinked {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
          debug!("file vanished before purge: {}", path.display());
        }
        Err(e) => warn!("failed to unlink {}: {e}", path.display()),
      }
    }
  }

  /// Glob `{dir}/.{prefix}.*.{extension}.*`, the hidden-sibling tempfile
  /// pattern left by an aborted write or download.
  pub fn list_temporary_files(&self) -> Result<Vec<PathBuf>, ManifestIoError> {
    let pattern = format!(".{}.*.{}.*", self.prefix, self.extension);
    let glob = Glob::new(&pattern).expect("tempfile sweep pattern is always valid");
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    let matcher = builder.build().expect("single-glob set always builds");

    let mut found = Vec::new();
    let entries = std::fs::read_dir(&self.directory).map_err(|e| ManifestIoError::Io {
      path: self.directory.clone(),
      source: e,
    })?;
    for entry in entries {
      let entry = entry.map_err(|e| ManifestIoError::Io {
        path: self.directory.clone(),
        source: e,
      })?;
      let name = entry.file_name();
      if let Some(name) = name.to_str() {
        if matcher.is_match(name) {
          found.push(entry.path());
        }
      }
    }
    Ok(found)
  }
}

#[cfg(unix)]
fn set_permissions_0644(path: &Path) -> Result<(), ManifestIoError> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).map_err(|e| {
    ManifestIoError::Io {
      path: path.to_path_buf(),
      source: e,
    }
  })
}

#[cfg(not(unix))]
fn set_permissions_0644(_path: &Path) -> Result<(), ManifestIoError> {
  Ok(())
}
