// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! HAL configuration via `camhal.yaml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::device::{HardwareConfiguration, HardwareTable, HardwareVariant};
use crate::core::{HalError, Result};

fn default_backend() -> String {
    HardwareVariant::Mpi.name().to_string()
}

fn default_frame_interval_ms() -> u64 {
    33
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalConfig {
    /// Device manager backend (`mpi`, `v4l2`, or a registered custom name).
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Hardware rows replacing the backend's built-in table.
    #[serde(default)]
    pub hardware: Option<Vec<HardwareConfiguration>>,

    /// Pacing of the simulated driver; 0 completes frames immediately.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Pipeline definition used when none is given explicitly. Relative
    /// paths resolve against the directory holding the config file.
    #[serde(default)]
    pub pipeline: Option<PathBuf>,
}

impl Default for HalConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            hardware: None,
            frame_interval_ms: default_frame_interval_ms(),
            pipeline: None,
        }
    }
}

impl HalConfig {
    /// Configuration file name.
    pub const FILE_NAME: &'static str = "camhal.yaml";

    /// Load configuration from a directory. Returns error if the file is
    /// missing or cannot be parsed.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(Self::FILE_NAME);

        let content = std::fs::read_to_string(&config_path).map_err(|e| {
            HalError::Configuration(format!("Failed to read {}: {}", config_path.display(), e))
        })?;

        let mut config = Self::from_yaml_str(&content).map_err(|e| {
            HalError::Configuration(format!("Failed to parse {}: {}", config_path.display(), e))
        })?;
        config.resolve_paths(config_dir);

        tracing::info!("Loaded HAL config from {}", config_path.display());
        Ok(config)
    }

    /// Load configuration from a directory, returning defaults if the file
    /// is missing or unparseable.
    pub fn load_or_default(config_dir: &Path) -> Self {
        let config_path = config_dir.join(Self::FILE_NAME);
        if !config_path.exists() {
            tracing::debug!(
                "No {} found in {}, using defaults",
                Self::FILE_NAME,
                config_dir.display()
            );
            return Self::default();
        }
        match Self::load(config_dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| HalError::Configuration(e.to_string()))?;
        if let Some(rows) = &config.hardware {
            HardwareTable::new(rows.clone()).validate()?;
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, config_dir: &Path) {
        if let Some(pipeline) = &self.pipeline {
            if pipeline.is_relative() {
                self.pipeline = Some(config_dir.join(pipeline));
            }
        }
    }

    /// The hardware table this configuration selects: inline rows when
    /// given, otherwise the backend's built-in table.
    pub fn hardware_table(&self) -> Result<HardwareTable> {
        match &self.hardware {
            Some(rows) => Ok(HardwareTable::new(rows.clone())),
            None => Ok(HardwareTable::builtin(self.backend.parse()?)),
        }
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_interval_ms > 0).then(|| Duration::from_millis(self.frame_interval_ms))
    }
}
