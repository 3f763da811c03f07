// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Static description of the camera hardware.
//!
//! One [`HardwareConfiguration`] row binds a logical camera to a named piece
//! of hardware inside a manager category. Rows come from a built-in variant
//! or from a YAML/JSON file.

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ids::{CameraId, ControllerId, ManagerId};
use crate::core::{HalError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareConfiguration {
    #[serde(rename = "camera")]
    pub camera_id: CameraId,
    pub manager: ManagerId,
    pub controller: ControllerId,
    #[serde(rename = "hardware")]
    pub hardware_name: String,
}

impl HardwareConfiguration {
    pub fn new(
        camera_id: CameraId,
        manager: ManagerId,
        controller: ControllerId,
        hardware_name: impl Into<String>,
    ) -> Self {
        Self {
            camera_id,
            manager,
            controller,
            hardware_name: hardware_name.into(),
        }
    }
}

/// Built-in hardware tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareVariant {
    /// Vendor media pipeline with hardware VI/VPSS/VO/VENC blocks.
    #[default]
    Mpi,
    /// Generic Video4Linux capture.
    V4l2,
}

impl HardwareVariant {
    pub fn name(self) -> &'static str {
        match self {
            HardwareVariant::Mpi => "mpi",
            HardwareVariant::V4l2 => "v4l2",
        }
    }
}

impl FromStr for HardwareVariant {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mpi" => Ok(HardwareVariant::Mpi),
            "v4l2" => Ok(HardwareVariant::V4l2),
            other => Err(HalError::InvalidArgument(format!(
                "unknown hardware variant '{}'",
                other
            ))),
        }
    }
}

/// Ordered list of hardware rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareTable {
    rows: Vec<HardwareConfiguration>,
}

impl HardwareTable {
    pub fn new(rows: Vec<HardwareConfiguration>) -> Self {
        Self { rows }
    }

    pub fn builtin(variant: HardwareVariant) -> Self {
        use ControllerId as C;
        use ManagerId as M;
        let cam1 = CameraId(1);
        let rows = match variant {
            HardwareVariant::Mpi => vec![
                HardwareConfiguration::new(cam1, M::Sensor, C::Sensor, "imx335"),
                HardwareConfiguration::new(cam1, M::Isp, C::Isp, "isp"),
                HardwareConfiguration::new(cam1, M::Flash, C::Flash, "flash0"),
                HardwareConfiguration::new(cam1, M::Vi, C::Vi, "vi"),
                HardwareConfiguration::new(cam1, M::Vo, C::Vo, "vo"),
                HardwareConfiguration::new(cam1, M::Vpss, C::Vpss, "vpss"),
                HardwareConfiguration::new(cam1, M::Venc, C::Venc, "venc"),
                HardwareConfiguration::new(CameraId(2), M::Sensor, C::Sensor, "imx600"),
            ],
            HardwareVariant::V4l2 => vec![
                HardwareConfiguration::new(cam1, M::Sensor, C::Sensor, "uvcvideo"),
                HardwareConfiguration::new(cam1, M::Isp, C::Isp, "isp"),
                HardwareConfiguration::new(cam1, M::Flash, C::Flash, "flash0"),
            ],
        };
        Self { rows }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let table: Self = serde_yaml::from_str(content)
            .map_err(|e| HalError::Configuration(format!("Invalid hardware table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(content)
            .map_err(|e| HalError::Configuration(format!("Invalid hardware table: {}", e)))?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Every row must pair a manager with its own controller kind and name
    /// its hardware.
    pub fn validate(&self) -> Result<()> {
        for row in &self.rows {
            if row.hardware_name.is_empty() {
                return Err(HalError::Configuration(format!(
                    "{} row for camera {} has no hardware name",
                    row.manager, row.camera_id
                )));
            }
            if row.manager.controller_id() != row.controller {
                return Err(HalError::Configuration(format!(
                    "manager '{}' cannot own a '{}' controller",
                    row.manager, row.controller
                )));
            }
        }
        Ok(())
    }

    pub fn rows(&self) -> &[HardwareConfiguration] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct camera ids in ascending order.
    pub fn camera_ids(&self) -> Vec<CameraId> {
        self.rows
            .iter()
            .map(|r| r.camera_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn contains_camera(&self, camera_id: CameraId) -> bool {
        self.rows.iter().any(|r| r.camera_id == camera_id)
    }

    pub fn rows_for_camera(&self, camera_id: CameraId) -> impl Iterator<Item = &HardwareConfiguration> {
        self.rows.iter().filter(move |r| r.camera_id == camera_id)
    }

    /// Hardware name the camera uses inside `manager`.
    pub fn hardware_name(&self, camera_id: CameraId, manager: ManagerId) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.camera_id == camera_id && r.manager == manager)
            .map(|r| r.hardware_name.as_str())
    }

    pub fn sensor_name(&self, camera_id: CameraId) -> Option<&str> {
        self.hardware_name(camera_id, ManagerId::Sensor)
    }

    /// Keep only rows `present` accepts, e.g. hardware that probed successfully.
    pub fn retain_present(&mut self, present: impl Fn(&HardwareConfiguration) -> bool) {
        self.rows.retain(|row| present(row));
    }

    /// Add a row, replacing an existing row for the same camera and manager.
    pub fn insert(&mut self, row: HardwareConfiguration) {
        match self
            .rows
            .iter_mut()
            .find(|r| r.camera_id == row.camera_id && r.manager == row.manager)
        {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    /// Remove and return every row of `camera_id`.
    pub fn remove_camera(&mut self, camera_id: CameraId) -> Vec<HardwareConfiguration> {
        let (removed, kept) = std::mem::take(&mut self.rows)
            .into_iter()
            .partition(|r| r.camera_id == camera_id);
        self.rows = kept;
        removed
    }
}
