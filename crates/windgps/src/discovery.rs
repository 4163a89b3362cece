//! Input file discovery.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::InputConfig;
use crate::error::{Error, Result};

/// List the log files in `dir`, sorted by file name.
///
/// A regular file is selected when its name contains `input.contains` and
/// none of `input.excludes`.
///
/// # Errors
///
/// Returns [`Error::FileRead`] if the directory cannot be listed and
/// [`Error::NoInputFiles`] if nothing matches.
pub fn find_log_files(dir: impl AsRef<Path>, input: &InputConfig) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let read_err = |source| Error::FileRead {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.file_type().map_err(read_err)?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.contains(input.contains.as_str())
            && !input.excludes.iter().any(|ex| name.contains(ex.as_str()))
        {
            files.push(entry.path());
        } else {
            debug!(file = %name, "Skipping non-matching file");
        }
    }

    if files.is_empty() {
        return Err(Error::NoInputFiles {
            dir: dir.to_path_buf(),
            pattern: input.contains.clone(),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!(dir = %dir.display(), count = files.len(), "Found log files");
    Ok(files)
}
