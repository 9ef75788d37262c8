//! Config and data file locations.
//!
//! Lookup order for both directories:
//! 1. `--config-dir` CLI argument
//! 2. `FLIPBOOK_CONFIG_DIR` environment variable
//! 3. The current directory, if it already holds a flipbook file
//! 4. Platform directory from `dirs-next` (`~/.config/flipbook`, ...)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "flipbook";
const ENV_CONFIG_DIR: &str = "FLIPBOOK_CONFIG_DIR";
const LOCAL_MARKERS: [&str; 2] = ["flipbook.json", "flipbook.log"];

/// Override for the default application directories.
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// CLI value wins over the environment variable.
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var_os(ENV_CONFIG_DIR).map(PathBuf::from));
        Self { config_dir }
    }
}

pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    config_dir(config).join(name)
}

/// Logs and other generated files.
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    data_dir(config).join(name)
}

pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let cfg = config_dir(config);
    let data = data_dir(config);
    for dir in [&cfg, &data] {
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
    }
    Ok(())
}

fn config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

fn resolve_dir(config: &PathConfig, platform: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(cwd) = std::env::current_dir()
        && has_local_files(&cwd)
    {
        return cwd;
    }

    platform
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn has_local_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}
