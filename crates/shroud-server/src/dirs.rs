use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Platform-specific app data dir (`~/.local/share/shroud/` on Linux), created
/// if missing. Used when no explicit data directory is configured.
pub fn data_dir() -> Result<PathBuf> {
    let path = platform_data_dir().context("could not determine platform data directory")?;
    std::fs::create_dir_all(&path).context("create platform data dir")?;
    Ok(path)
}

fn platform_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "shroud").map(|dirs| dirs.data_dir().to_owned())
}
