// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware category a [`Manager`](super::Manager) is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerId {
    Sensor,
    Isp,
    Flash,
    Vi,
    Vo,
    Vpss,
    Venc,
}

impl ManagerId {
    pub const ALL: [ManagerId; 7] = [
        ManagerId::Sensor,
        ManagerId::Isp,
        ManagerId::Flash,
        ManagerId::Vi,
        ManagerId::Vo,
        ManagerId::Vpss,
        ManagerId::Venc,
    ];

    /// The controller kind this manager creates.
    pub fn controller_id(self) -> ControllerId {
        match self {
            ManagerId::Sensor => ControllerId::Sensor,
            ManagerId::Isp => ControllerId::Isp,
            ManagerId::Flash => ControllerId::Flash,
            ManagerId::Vi => ControllerId::Vi,
            ManagerId::Vo => ControllerId::Vo,
            ManagerId::Vpss => ControllerId::Vpss,
            ManagerId::Venc => ControllerId::Venc,
        }
    }

    /// Whether the manager can own several controllers keyed by hardware name.
    pub fn is_keyed(self) -> bool {
        matches!(self, ManagerId::Sensor | ManagerId::Flash)
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerId::Sensor => "sensor",
            ManagerId::Isp => "isp",
            ManagerId::Flash => "flash",
            ManagerId::Vi => "vi",
            ManagerId::Vo => "vo",
            ManagerId::Vpss => "vpss",
            ManagerId::Venc => "venc",
        };
        f.write_str(name)
    }
}

/// Kind of controller inside a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerId {
    Sensor,
    Isp,
    Flash,
    Vi,
    Vo,
    Vpss,
    Venc,
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControllerId::Sensor => "sensor",
            ControllerId::Isp => "isp",
            ControllerId::Flash => "flash",
            ControllerId::Vi => "vi",
            ControllerId::Vo => "vo",
            ControllerId::Vpss => "vpss",
            ControllerId::Venc => "venc",
        };
        f.write_str(name)
    }
}

/// Logical camera identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub u32);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lcam{:03}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashMode {
    #[default]
    Off,
    Torch,
    Single,
}
