//! Atomic publication of derived artifacts.
//!
//! Tools write into a hidden temporary sibling of the final path
//! (`.{name}.{random}.part`), which is renamed over the final path only once
//! the tool has succeeded. A reader of the final path therefore sees either
//! the previous artifact, nothing, or the complete new artifact.

use std::fs;
use std::path::{Path, PathBuf};

use amur_common::paths::TEMP_SUFFIX;
use tempfile::{TempDir, TempPath};

use crate::{Error, Result};

fn parent_of(dest: &Path) -> &Path {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn temp_prefix(dest: &Path) -> Result<String> {
    let name = dest
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("no file name in {}", dest.display())))?;
    Ok(format!(".{}.", name.to_string_lossy()))
}

/// A staged single-file output.
///
/// Dropping an uncommitted `AtomicOutput` removes the temporary file and
/// leaves the final path untouched.
#[derive(Debug)]
pub struct AtomicOutput {
    temp: TempPath,
    dest: PathBuf,
}

impl AtomicOutput {
    /// Reserve a temporary sibling for `dest`.
    pub fn new(dest: &Path) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(&temp_prefix(dest)?)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(parent_of(dest))
            .map_err(|e| {
                Error::Output(format!("cannot stage output for {}: {e}", dest.display()))
            })?
            .into_temp_path();

        Ok(Self {
            temp,
            dest: dest.to_path_buf(),
        })
    }

    /// Path the producing tool should write to.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    /// Rename the staged file over the final path.
    ///
    /// Fails without touching the final path if the staged file is empty.
    pub fn commit(self) -> Result<PathBuf> {
        let meta = fs::metadata(&self.temp)?;
        if meta.len() == 0 {
            return Err(Error::Output(format!(
                "empty output for {}",
                self.dest.display()
            )));
        }

        // Staged files are created private; published artifacts are served.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.temp, fs::Permissions::from_mode(0o644))?;
        }

        self.temp.persist(&self.dest).map_err(|e| {
            Error::Output(format!("cannot publish {}: {}", self.dest.display(), e.error))
        })?;
        Ok(self.dest)
    }
}

/// A staged directory output, used for multi-file artifacts such as
/// streaming packages.
#[derive(Debug)]
pub struct AtomicDir {
    staging: TempDir,
    dest: PathBuf,
}

impl AtomicDir {
    /// Create a temporary sibling directory for `dest`.
    pub fn new(dest: &Path) -> Result<Self> {
        let staging = tempfile::Builder::new()
            .prefix(&temp_prefix(dest)?)
            .suffix(TEMP_SUFFIX)
            .tempdir_in(parent_of(dest))
            .map_err(|e| {
                Error::Output(format!("cannot stage output for {}: {e}", dest.display()))
            })?;

        Ok(Self {
            staging,
            dest: dest.to_path_buf(),
        })
    }

    /// Directory the producing tool should write into.
    pub fn path(&self) -> &Path {
        self.staging.path()
    }

    /// Replace the final directory with the staged one.
    ///
    /// `required` names a file that must exist and be non-empty in the staged
    /// directory for the commit to proceed.
    pub fn commit(self, required: &str) -> Result<PathBuf> {
        let marker = self.staging.path().join(required);
        let ok = fs::metadata(&marker)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !ok {
            return Err(Error::Output(format!(
                "{} missing from staged {}",
                required,
                self.dest.display()
            )));
        }

        let staged = self.staging.keep();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))?;
        }

        // rename(2) cannot replace a non-empty directory.
        if self.dest.exists() {
            fs::remove_dir_all(&self.dest)?;
        }

        if let Err(e) = fs::rename(&staged, &self.dest) {
            let _ = fs::remove_dir_all(&staged);
            return Err(Error::Output(format!(
                "cannot publish {}: {e}",
                self.dest.display()
            )));
        }
        Ok(self.dest)
    }
}
