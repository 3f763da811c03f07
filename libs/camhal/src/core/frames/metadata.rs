// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Camera metadata container.
//!
//! The tag schema itself belongs to the host service; the core only moves
//! tagged values between controllers and callbacks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Numeric metadata tag.
pub type MetaTag = u32;

/// Tags the core itself reads or writes.
pub mod tags {
    use super::MetaTag;

    pub const SENSOR_EXPOSURE_TIME: MetaTag = 0x0001_0000;
    pub const SENSOR_SENSITIVITY: MetaTag = 0x0001_0001;
    pub const CONTROL_AE_MODE: MetaTag = 0x0002_0000;
    pub const CONTROL_AWB_MODE: MetaTag = 0x0002_0001;
    pub const CONTROL_AF_MODE: MetaTag = 0x0002_0002;
    pub const FLASH_MODE: MetaTag = 0x0003_0000;
    pub const FLASH_AVAILABLE: MetaTag = 0x0003_0001;
    pub const CAMERA_CONNECTION_TYPE: MetaTag = 0x0004_0000;
    pub const CAMERA_POSITION: MetaTag = 0x0004_0001;
}

/// A metadata value; every entry is an array like the host schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaValue {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
}

/// Ordered tag -> value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraMetadata {
    entries: BTreeMap<MetaTag, MetaValue>,
}

impl CameraMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `tag`.
    pub fn set(&mut self, tag: MetaTag, value: MetaValue) {
        self.entries.insert(tag, value);
    }

    pub fn get(&self, tag: MetaTag) -> Option<&MetaValue> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: MetaTag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn remove(&mut self, tag: MetaTag) -> Option<MetaValue> {
        self.entries.remove(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = MetaTag> + '_ {
        self.entries.keys().copied()
    }

    /// Copy every entry of `other` into `self`, replacing duplicates.
    pub fn merge(&mut self, other: &CameraMetadata) {
        for (tag, value) in &other.entries {
            self.entries.insert(*tag, value.clone());
        }
    }

    /// Keep only entries whose tag is listed in `tags`.
    pub fn retain_tags(&mut self, tags: &[MetaTag]) {
        self.entries.retain(|tag, _| tags.contains(tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_duplicates() {
        let mut a = CameraMetadata::new();
        a.set(tags::CONTROL_AE_MODE, MetaValue::U8(vec![0]));
        let mut b = CameraMetadata::new();
        b.set(tags::CONTROL_AE_MODE, MetaValue::U8(vec![1]));
        b.set(tags::FLASH_MODE, MetaValue::U8(vec![2]));

        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(tags::CONTROL_AE_MODE), Some(&MetaValue::U8(vec![1])));
    }

    #[test]
    fn test_retain_tags() {
        let mut meta = CameraMetadata::new();
        meta.set(tags::CONTROL_AE_MODE, MetaValue::U8(vec![0]));
        meta.set(tags::SENSOR_EXPOSURE_TIME, MetaValue::I64(vec![10_000]));
        meta.retain_tags(&[tags::SENSOR_EXPOSURE_TIME]);
        assert!(!meta.contains(tags::CONTROL_AE_MODE));
        assert!(meta.contains(tags::SENSOR_EXPOSURE_TIME));
    }
}
