use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn data_dir_path() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("reelstate"))
}

pub fn database_file_path() -> Result<PathBuf> {
    Ok(data_dir_path()?.join("reelstate.db"))
}

pub fn log_file_path() -> Result<PathBuf> {
    Ok(data_dir_path()?.join("reelstate.log"))
}
