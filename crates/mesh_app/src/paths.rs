use std::path::PathBuf;

use anyhow::{Context, Result};

/// Returns the base directory: `~/.mesh_now/`
pub fn base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".mesh_now"))
}

/// Returns the config file path: `~/.mesh_now/config.json`
pub fn config_path() -> Result<PathBuf> {
    Ok(base_dir()?.join("config.json"))
}

/// Returns the logs directory: `~/.mesh_now/logs/`
pub fn logs_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_base_dir() {
        let Ok(base) = base_dir() else {
            // No home directory in this environment.
            return;
        };
        assert!(base.ends_with(".mesh_now"));
        assert_eq!(config_path().unwrap(), base.join("config.json"));
        assert_eq!(logs_dir().unwrap(), base.join("logs"));
    }
}
