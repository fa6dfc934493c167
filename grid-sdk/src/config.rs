//! Layered key/value configuration, namespaced.

use std::collections::HashMap;
use std::path::Path;

use ini::Ini;

use crate::error::SdkError;

pub const KEY_PROXY: &str = "proxy";
pub const KEY_PROXY_CONSCIENCE: &str = "proxy-conscience";
pub const KEY_PROXY_CONTAINER: &str = "proxy-container";
pub const KEY_PROXY_DIRECTORY: &str = "proxy-dir";
pub const KEY_AUTOCREATE: &str = "autocreate";
pub const KEY_FORCE: &str = "force";

const SYSTEM_CONF: &str = "/etc/oio/sds.conf";
const SYSTEM_CONF_DIR: &str = "/etc/oio/sds.conf.d";
const LOCAL_CONF: &str = ".oio/sds.conf";

/// Minimal configuration surface the clients need.
pub trait Config: Send + Sync {
    /// Raw value for `key` in namespace `ns`.
    fn get_string(&self, ns: &str, key: &str) -> Option<String>;

    fn get_bool(&self, ns: &str, key: &str) -> Result<Option<bool>, SdkError> {
        match self.get_string(ns, key) {
            None => Ok(None),
            Some(v) => match v.as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" => Ok(Some(false)),
                _ => Err(SdkError::InvalidConfig(format!("{ns}/{key}: not a boolean: {v}"))),
            },
        }
    }

    fn get_int(&self, ns: &str, key: &str) -> Result<Option<i64>, SdkError> {
        match self.get_string(ns, key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| SdkError::InvalidConfig(format!("{ns}/{key}: not an integer: {v}"))),
        }
    }

    /// Boolean flag folded to a default; a malformed value counts as unset.
    fn flag(&self, ns: &str, key: &str) -> bool {
        self.get_bool(ns, key).ok().flatten().unwrap_or(false)
    }
}

/// Flat map configuration with `ns/key` composite keys, loadable from INI
/// content. Loaders are layered, last write wins.
#[derive(Debug, Default)]
pub struct StaticConfig {
    pairs: HashMap<String, String>,
}

impl StaticConfig {
    pub fn new() -> StaticConfig {
        StaticConfig::default()
    }

    pub fn set(&mut self, ns: &str, key: &str, value: &str) {
        self.pairs.insert(format!("{ns}/{key}"), value.to_string());
    }

    /// Namespaces present in the loaded content.
    pub fn namespaces(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .pairs
            .keys()
            .filter_map(|k| k.split_once('/').map(|(ns, _)| ns.to_string()))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Keys known for the given namespace.
    pub fn keys(&self, ns: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .pairs
            .keys()
            .filter_map(|k| k.split_once('/'))
            .filter(|(k_ns, _)| *k_ns == ns)
            .map(|(_, key)| key.to_string())
            .collect();
        out.sort_unstable();
        out
    }

    /// Parse INI content; the section name is the namespace.
    pub fn load_content(&mut self, content: &str) -> Result<(), SdkError> {
        let ini = Ini::load_from_str(content)
            .map_err(|e| SdkError::InvalidConfig(e.to_string()))?;
        for (section, props) in ini.iter() {
            let ns = section.unwrap_or("");
            for (key, value) in props.iter() {
                self.pairs.insert(format!("{ns}/{key}"), value.to_string());
            }
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SdkError> {
        let content = std::fs::read_to_string(path)?;
        self.load_content(&content)
    }

    /// System-wide configuration: the main file, then every `*.conf` of the
    /// drop-in directory. A broken drop-in is skipped with a log line.
    pub fn load_system(&mut self) -> Result<(), SdkError> {
        self.load_file(SYSTEM_CONF)?;

        if let Ok(entries) = std::fs::read_dir(SYSTEM_CONF_DIR) {
            let mut paths: Vec<_> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "conf"))
                .collect();
            paths.sort();
            for path in paths {
                if let Err(e) = self.load_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "skipping configuration file");
                }
            }
        }
        Ok(())
    }

    /// Per-user configuration in `$HOME/.oio/sds.conf`.
    pub fn load_local(&mut self) -> Result<(), SdkError> {
        let home = std::env::var("HOME")
            .map_err(|_| SdkError::InvalidConfig("no HOME in environment".to_string()))?;
        self.load_file(Path::new(&home).join(LOCAL_CONF))
    }
}

impl Config for StaticConfig {
    fn get_string(&self, ns: &str, key: &str) -> Option<String> {
        self.pairs.get(&format!("{ns}/{key}")).cloned()
    }
}

/// The plain proxy endpoint for a namespace.
pub(crate) fn proxy_url(cfg: &dyn Config, ns: &str) -> Result<String, SdkError> {
    cfg.get_string(ns, KEY_PROXY)
        .ok_or_else(|| SdkError::InvalidConfig(format!("no proxy configured for namespace {ns}")))
}

/// Facet endpoints fall back to the plain proxy.
pub(crate) fn proxy_container_url(cfg: &dyn Config, ns: &str) -> Result<String, SdkError> {
    match cfg.get_string(ns, KEY_PROXY_CONTAINER) {
        Some(u) => Ok(u),
        None => proxy_url(cfg, ns),
    }
}

pub(crate) fn proxy_directory_url(cfg: &dyn Config, ns: &str) -> Result<String, SdkError> {
    match cfg.get_string(ns, KEY_PROXY_DIRECTORY) {
        Some(u) => Ok(u),
        None => proxy_url(cfg, ns),
    }
}
