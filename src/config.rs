use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NetError, Result};

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// The three configuration options the networking core recognizes.
///
/// Everything upstream of this struct (reading a config file from disk,
/// merging environment overrides, flag parsing) is the out-of-scope
/// "configuration loading" collaborator named in the crate's purpose and
/// scope; `Config` itself, and parsing it from TOML, is part of the
/// crate's public surface.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port the core listens on for line-oriented requests.
    pub tcp_port: u16,
    /// UDP port reserved but not read from.
    pub udp_port: u16,
    /// Number of leader-follower worker threads to run.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Config {
    /// Parse a `Config` from a TOML file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Config> {
        let text = fs::read_to_string(path).map_err(NetError::Io)?;
        Self::from_str(&text)
    }

    /// Parse a `Config` from a TOML string, validating the result.
    pub fn from_str(text: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(text).map_err(|e| NetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(NetError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.tcp_port == 0 {
            return Err(NetError::Config("tcp_port must be nonzero".to_string()));
        }
        Ok(())
    }
}
