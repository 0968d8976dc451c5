use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for a single orchestrated run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Flags for the orchestrating engine job itself
    #[serde(default)]
    pub orchestrator_args: Vec<String>,

    /// When set, the run only writes pipeline args here and executes nothing
    #[serde(default)]
    pub export_path: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on concurrently executing units; `None` is unbounded
    #[serde(default)]
    pub max_concurrent_units: Option<usize>,
}

impl RunConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist
    pub fn load(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(
                "Run configuration {} not found, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "failed to read {}: {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PipelineError::Config(format!("failed to parse run configuration: {}", e)))
    }

    pub fn with_orchestrator_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.orchestrator_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Export-only mode
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }
}
