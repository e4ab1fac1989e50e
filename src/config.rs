//! Configuration system for the error-handling pattern miner.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    /// Analysis tuning.
    pub analysis: AnalysisConfig,

    /// Functions excluded from equivalence analysis.
    pub deny_list: DenyListConfig,

    /// Return-semantics catalog location.
    pub catalog: CatalogConfig,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            deny_list: DenyListConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

impl MinerConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        ConfigLoader::load_from_file(path)
    }
}

/// Tuning knobs for the equivalence/intention/action/similarity passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Minimum number of distinct `call_statistic` rows for a function to be
    /// enumerated as a target function.
    pub min_project: u32,

    /// Maximum BFS depth for the action classifier (default: 20).
    pub action_bfs_max_depth: u32,

    /// Maximum BFS depth for the similarity scorer (default: 5).
    pub similarity_max_depth: u32,

    /// Weight floor below which the similarity BFS stops expanding a
    /// frontier (default: 0.05).
    pub similarity_weight_floor: f64,

    /// Optional per-solver-call timeout. `0` disables the timeout. A
    /// timeout is treated exactly like any other solver failure: it
    /// degrades equivalence to "not equivalent" and path intention to
    /// `UNKNOWN`.
    pub smt_timeout_ms: u64,

    /// Run target functions concurrently (requires the `parallel` feature).
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_project: 2,
            action_bfs_max_depth: 20,
            similarity_max_depth: 5,
            similarity_weight_floor: 0.05,
            smt_timeout_ms: 0,
            parallel: false,
        }
    }
}

/// Functions the equivalence engine skips outright.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DenyListConfig {
    /// Exact-name deny list.
    pub functions: Vec<String>,
}

impl Default for DenyListConfig {
    fn default() -> Self {
        Self {
            functions: [
                "strcmp",
                "strlen",
                "strncmp",
                "memcmp",
                "strcasecmp",
                "strncasecmp",
                "strtol",
                "__error",
                "__errno_location",
                "__ctype_b_loc",
                "__sync_synchronize",
                "strtoul",
                "count",
                "empty",
                "g_strcmp0",
                "g_ascii_strcasecmp",
                "g_ascii_strncasecmp",
                "isEmpty",
                "isNull",
                "qCompare",
                "size",
                "strchr",
                "strstr",
                "rand",
                "strrchr",
                "sscanf",
                "snprintf",
                "atoi",
                "fprintf",
                "_IO_getc",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl DenyListConfig {
    /// True when `call_name` should be skipped entirely: it is on the
    /// exact-name deny list, or it contains `operator` or `__builtin`.
    pub fn is_denied(&self, call_name: &str) -> bool {
        call_name.contains("operator")
            || call_name.contains("__builtin")
            || self.functions.iter().any(|f| f == call_name)
    }
}

/// Location of the bundled return-semantics catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to `glibc_return.csv` (or an equivalent catalog file).
    pub path: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "glibc_return.csv".to_string(),
        }
    }
}

/// Loads [`MinerConfig`] from disk, falling back to defaults when absent.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from an explicit file path.
    pub fn load_from_file(path: &Path) -> Result<MinerConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: MinerConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
