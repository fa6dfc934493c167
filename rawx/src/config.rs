use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ini::Ini;

/// Node configuration, from flags or an INI file.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen: String,
    pub namespace: String,
    /// Tier roots, fastest first.
    pub filerepos: Vec<PathBuf>,
    /// Optional write-ahead intent repository.
    pub log_repo: Option<PathBuf>,
    pub hash_width: usize,
    pub hash_depth: usize,
    pub hash_start: bool,
    pub fsync_file: bool,
    pub fsync_dir: bool,
    pub fallocate: bool,
    pub compress: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            listen: "127.0.0.1:5999".to_string(),
            namespace: "OPENIO".to_string(),
            filerepos: Vec::new(),
            log_repo: None,
            hash_width: 3,
            hash_depth: 1,
            hash_start: true,
            fsync_file: false,
            fsync_dir: true,
            fallocate: false,
            compress: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Ini(#[from] ini::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Load from an INI file. Recognized keys: `Listen`, `grid_namespace`,
    /// `grid_filerepos` (comma-separated tier roots), `grid_docroot` (single
    /// root), `grid_logrepo`, plus the layout and durability tuning keys.
    pub fn load(path: &Path) -> Result<NodeConfig, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut cfg = NodeConfig::default();

        for (_, props) in ini.iter() {
            for (key, value) in props.iter() {
                match key {
                    "Listen" => cfg.listen = value.to_string(),
                    "grid_namespace" => cfg.namespace = value.to_string(),
                    "grid_filerepos" => {
                        cfg.filerepos = value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(PathBuf::from)
                            .collect();
                    }
                    "grid_docroot" => {
                        if cfg.filerepos.is_empty() {
                            cfg.filerepos = vec![PathBuf::from(value)];
                        }
                    }
                    "grid_logrepo" => cfg.log_repo = Some(PathBuf::from(value)),
                    "grid_hash_width" => cfg.hash_width = parse_num(key, value)?,
                    "grid_hash_depth" => cfg.hash_depth = parse_num(key, value)?,
                    "grid_hash_start" => cfg.hash_start = parse_bool(key, value)?,
                    "grid_fsync_file" => cfg.fsync_file = parse_bool(key, value)?,
                    "grid_fsync_dir" => cfg.fsync_dir = parse_bool(key, value)?,
                    "grid_fallocate" => cfg.fallocate = parse_bool(key, value)?,
                    "grid_compress" => cfg.compress = parse_bool(key, value)?,
                    _ => {}
                }
            }
        }
        Ok(cfg)
    }

    /// Namespace, listen address and repository roots must all be sane before
    /// anything touches the disk.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !valid_namespace(&self.namespace) {
            return Err(ConfigError::Invalid(format!(
                "{} is not a valid namespace name",
                self.namespace
            )));
        }
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "{} is not a valid listen address",
                self.listen
            )));
        }
        if self.filerepos.is_empty() {
            return Err(ConfigError::Invalid("no file repository configured".to_string()));
        }
        for root in self.filerepos.iter().chain(self.log_repo.iter()) {
            if !root.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "repository path must be absolute, got {}",
                    root.display()
                )));
            }
        }
        if self.hash_width == 0 || self.hash_depth == 0 {
            return Err(ConfigError::Invalid(
                "hash width and depth must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{key}: not a boolean: {value}"))),
    }
}

fn parse_num(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: not a number: {value}")))
}

/// `[0-9a-zA-Z]+(.[0-9a-zA-Z]+)*`
pub fn valid_namespace(ns: &str) -> bool {
    !ns.is_empty()
        && ns
            .split('.')
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_alphanumeric()))
}
