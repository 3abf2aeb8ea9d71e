//! Runtime configuration
//!
//! Every field has a default, so an empty (or missing) config file is valid:
//!
//! ```toml
//! [loader]
//! ui_root = "ui"
//! scripts_root = "scripts"
//! failure_policy = "isolate"   # or "fail-fast"
//!
//! [executor]
//! memory_limit_bytes = 67108864
//! timeout_ms = 5000
//!
//! [watch]
//! debounce_ms = 300
//! ```

use crate::error::{ExtensionError, ExtensionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselConfig {
    pub loader: LoaderConfig,
    pub executor: ExecutorConfig,
    pub watch: WatchConfig,
}

/// How the script tree loader treats a failing file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Report and collect each failure; siblings keep loading
    #[default]
    Isolate,

    /// Return the first failure as the loader's error once the walk completes
    FailFast,
}

/// Where extension content lives and how failures are handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root of the component tree, relative to the extension root
    pub ui_root: String,

    /// Root of the script tree, relative to the extension root
    pub scripts_root: String,

    /// Suffix identifying component files
    pub component_suffix: String,

    pub failure_policy: FailurePolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ui_root: "ui".to_string(),
            scripts_root: "scripts".to_string(),
            component_suffix: ".vue".to_string(),
            failure_policy: FailurePolicy::Isolate,
        }
    }
}

/// Resource limits applied to every script execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Heap limit of one engine instance
    pub memory_limit_bytes: usize,

    /// Native stack budget of one engine instance
    pub max_stack_size_bytes: usize,

    /// Wall-clock budget of each uninterrupted slice of script work; `None` disables it
    pub timeout_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            memory_limit_bytes: 64 * 1024 * 1024,
            max_stack_size_bytes: 1024 * 1024,
            timeout_ms: Some(5_000),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// File watching behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a batch of changes is delivered
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 300 }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl VesselConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Load a config file
    pub fn load(path: &Path) -> ExtensionResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| ExtensionError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&source).map_err(|e| ExtensionError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// `<config dir>/vessel/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vessel").join("config.toml"))
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> ExtensionResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "Loading default config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = VesselConfig::from_toml_str("").unwrap();
        assert_eq!(config, VesselConfig::default());
        assert_eq!(config.loader.ui_root, "ui");
        assert_eq!(config.executor.timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_partial_config() {
        let config = VesselConfig::from_toml_str(
            r#"
[loader]
failure_policy = "fail-fast"

[executor]
timeout_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(config.loader.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.loader.scripts_root, "scripts");
        assert_eq!(config.executor.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.watch.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        assert!(VesselConfig::from_toml_str("[loader]\nfailure_policy = \"maybe\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[watch]\ndebounce_ms = 10").unwrap();
        let config = VesselConfig::load(file.path()).unwrap();
        assert_eq!(config.watch.debounce_ms, 10);

        let err = VesselConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ExtensionError::Config { .. }));
    }
}
