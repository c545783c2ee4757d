//! Path resolution for chatstream data files.
//!
//! Resolved once at startup from: `--data-dir` > `CHATSTREAM_DATA_DIR` env > `~/.chatstream`.
//! `--data-dir` and the env var both arrive through clap.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => dirs::home_dir()
                .context("HOME directory not found; pass --data-dir")?
                .join(".chatstream"),
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Create the data dir and its subdirectories.
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    /// Config file to load: an explicit path always wins and must exist;
    /// otherwise the data-dir file is used if present.
    pub fn config_source(&self, explicit: Option<&Path>) -> anyhow::Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.is_file() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }
        let default = self.config_path();
        Ok(default.is_file().then_some(default))
    }
}
