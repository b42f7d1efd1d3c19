//! Working directory layout: `<root>/in` receives videos, `<root>/out`
//! receives averaged images.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to prepare the working directories. Fatal at startup.
#[derive(Debug, Error)]
pub enum WorkdirError {
    #[error("Failed to create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("Failed to clean {path}: {source}")]
    Clean { path: PathBuf, source: io::Error },
}

/// Input and output directories of one daemon run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workdir {
    pub root: PathBuf,
    pub in_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl Workdir {
    /// Layout under `root`, without touching the filesystem
    pub fn at(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            in_dir: root.join("in"),
            out_dir: root.join("out"),
        }
    }

    /// Where the CLI persists the report on shutdown
    pub fn report_path(&self) -> PathBuf {
        self.root.join("report.json")
    }
}

/// Create the working directories, idempotently.
///
/// With `clean`, existing `in/` and `out/` are removed first.
pub fn setup_workdir(root: &Path, clean: bool) -> Result<Workdir, WorkdirError> {
    let wrk = Workdir::at(root);

    create_dir(&wrk.root)?;
    if clean {
        for dir in [&wrk.in_dir, &wrk.out_dir] {
            rm_rf(dir).map_err(|source| WorkdirError::Clean {
                path: dir.clone(),
                source,
            })?;
        }
    }
    create_dir(&wrk.in_dir)?;
    create_dir(&wrk.out_dir)?;

    Ok(wrk)
}

fn create_dir(path: &Path) -> Result<(), WorkdirError> {
    fs::create_dir_all(path).map_err(|source| WorkdirError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// Like `rm -rf`: missing paths are fine
pub fn rm_rf(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
