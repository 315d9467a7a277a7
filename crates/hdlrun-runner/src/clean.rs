//! Removal of simulation build directories

use crate::error::Result;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Remove `<root>/<sim_build>`, and with `recursive` every directory of the
/// same name below `root`. Symlinked directories are not followed.
///
/// Returns the directories that were removed.
pub fn clean(root: &Path, sim_build: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    remove_build_dir(&root.join(sim_build), &mut removed)?;

    if recursive {
        walk(root, sim_build, &mut removed)?;
    }
    Ok(removed)
}

fn walk(dir: &Path, sim_build: &str, removed: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("Skipping unreadable {}: {}", dir.display(), e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        if entry.file_name() == sim_build {
            remove_build_dir(&path, removed)?;
        } else {
            walk(&path, sim_build, removed)?;
        }
    }
    Ok(())
}

fn remove_build_dir(path: &Path, removed: &mut Vec<PathBuf>) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            info!("Removing {}", path.display());
            fs::remove_dir_all(path)?;
            removed.push(path.to_path_buf());
        }
        Ok(_) => debug!("{} is not a directory, left alone", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
