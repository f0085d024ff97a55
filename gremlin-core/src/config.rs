//! Configuration system for Gremlin.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from the user config directory (`gremlin/config.toml`) and/or
//! `.gremlin/config.toml` in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Top-level configuration for an experiment run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GremlinConfig {
    #[serde(default)]
    pub trace: ServiceEndpointConfig,
    #[serde(default)]
    pub fault: ServiceEndpointConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub experiment: ExperimentConfig,
}

/// Address and timeout of an external HTTP service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEndpointConfig {
    /// Base URL, e.g. `http://localhost:5000`. A bare `host:port` is accepted.
    pub endpoint: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServiceEndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ServiceEndpointConfig {
    /// Endpoint with an `http://` scheme added when none was given.
    pub fn base_url(&self) -> String {
        let trimmed = self.endpoint.trim_end_matches('/');
        if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Location of the CSV inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding the edge and service files, relative to the workspace.
    pub dir: PathBuf,
    /// Call-edge file with `start` and `end` columns.
    pub edges_file: String,
    /// Service-frequency file with a `service` column.
    pub services_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("csv"),
            edges_file: "edges".to_string(),
            services_file: "services".to_string(),
        }
    }
}

impl DataConfig {
    pub fn edges_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.dir).join(&self.edges_file)
    }

    pub fn services_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.dir).join(&self.services_file)
    }
}

/// How the fault target is picked from the service-frequency records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// The first record, for sources already sorted by frequency.
    #[default]
    FirstRecord,
    /// The record with the highest `count` column.
    MostFrequent,
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionPolicy::FirstRecord => write!(f, "first_record"),
            SelectionPolicy::MostFrequent => write!(f, "most_frequent"),
        }
    }
}

/// Timing and shape of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Length of each trace window (before and after) in seconds.
    pub baseline_window_secs: u64,
    /// How long the fault stays active before the observation window is read.
    pub observation_secs: u64,
    /// Measure the target itself when nothing calls it.
    pub include_target_when_isolated: bool,
    pub selection: SelectionPolicy,
    /// Issue one trace query per upstream service concurrently.
    pub parallel_queries: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            baseline_window_secs: 30,
            observation_secs: 30,
            include_target_when_isolated: true,
            selection: SelectionPolicy::FirstRecord,
            parallel_queries: false,
        }
    }
}

impl ExperimentConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.baseline_window_secs)
    }

    pub fn observation(&self) -> Duration {
        Duration::from_secs(self.observation_secs)
    }
}

impl GremlinConfig {
    /// Reject settings that cannot produce a meaningful experiment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.experiment.baseline_window_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "experiment.baseline_window_secs must be greater than zero".into(),
            });
        }
        if self.experiment.observation_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "experiment.observation_secs must be greater than zero".into(),
            });
        }
        for (name, svc) in [("trace", &self.trace), ("fault", &self.fault)] {
            if svc.endpoint.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("{}.endpoint must not be empty", name),
                });
            }
            if url::Url::parse(&svc.base_url()).is_err() {
                return Err(ConfigError::Invalid {
                    message: format!("{}.endpoint is not a valid URL: {}", name, svc.endpoint),
                });
            }
        }
        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "gremlin", "gremlin")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".gremlin").join("config.toml")
}

/// Individual settings given on the command line.
///
/// Each one replaces a single key and leaves the rest of the layered
/// configuration alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub trace_endpoint: Option<String>,
    pub fault_endpoint: Option<String>,
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `GREMLIN_`)
/// 3. An explicit config file, if given
/// 4. Workspace-local config (`.gremlin/config.toml`)
/// 5. User config
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<GremlinConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(GremlinConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // GREMLIN_TRACE__ENDPOINT, GREMLIN_EXPERIMENT__OBSERVATION_SECS, etc.
    figment = figment.merge(Env::prefixed("GREMLIN_").split("__"));

    if let Some(endpoint) = &overrides.trace_endpoint {
        figment = figment.merge(Serialized::default("trace.endpoint", endpoint));
    }
    if let Some(endpoint) = &overrides.fault_endpoint {
        figment = figment.merge(Serialized::default("fault.endpoint", endpoint));
    }

    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

/// Write the default configuration to `<workspace>/.gremlin/config.toml`.
///
/// Refuses to overwrite an existing file. Returns the path written.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        });
    }
    let body = toml::to_string_pretty(&GremlinConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {}", parent.display(), e),
        })?;
    }
    std::fs::write(&path, body).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {}", path.display(), e),
    })?;
    Ok(path)
}
