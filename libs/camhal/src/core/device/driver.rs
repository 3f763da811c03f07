// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The vendor boundary.

use serde::{Deserialize, Serialize};

use super::ids::FlashMode;
use super::routing::RouteEndpoint;
use crate::core::frames::{CameraMetadata, FrameCallback, FrameSpec, MetaTag, PixelFormat, StreamId};
use crate::core::graph::PortFormat;
use crate::core::Result;

/// Stream parameters pushed into a media block before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub stream_id: StreamId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub frame_rate: u32,
    pub buffer_count: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_id: 0,
            width: 1920,
            height: 1080,
            format: PixelFormat::Yuv420Sp,
            frame_rate: 30,
            buffer_count: 4,
        }
    }
}

impl From<&PortFormat> for StreamConfig {
    fn from(format: &PortFormat) -> Self {
        let defaults = Self::default();
        Self {
            stream_id: format.stream_id,
            width: if format.width == 0 { defaults.width } else { format.width },
            height: if format.height == 0 { defaults.height } else { format.height },
            format: format.format,
            frame_rate: defaults.frame_rate,
            buffer_count: if format.buffer_count == 0 {
                defaults.buffer_count
            } else {
                format.buffer_count
            },
        }
    }
}

/// Every call the core makes into camera hardware.
///
/// Hardware is addressed by the name from the hardware table. Completion
/// callbacks may be invoked from driver-owned threads.
pub trait HardwareDriver: Send + Sync {
    fn init(&self, hardware: &str) -> Result<()>;

    fn power_up(&self, hardware: &str) -> Result<()>;

    fn power_down(&self, hardware: &str) -> Result<()>;

    fn configure(&self, hardware: &str, config: &StreamConfig) -> Result<()>;

    fn start(&self, hardware: &str) -> Result<()>;

    fn stop(&self, hardware: &str) -> Result<()>;

    /// Queue an empty buffer; it comes back through the node callback.
    fn send_frame(&self, hardware: &str, frame: FrameSpec) -> Result<()>;

    /// Install or clear the completion callback of a block.
    fn set_node_callback(&self, hardware: &str, callback: Option<FrameCallback>);

    /// Wire two blocks so frames pass inside the hardware.
    fn bind(&self, src: &RouteEndpoint, dst: &RouteEndpoint) -> Result<()>;

    fn unbind(&self, src: &RouteEndpoint, dst: &RouteEndpoint) -> Result<()>;

    fn set_ability_metadata_tags(&self, hardware: &str, tags: &[MetaTag]) -> Result<()>;

    fn get_ability_metadata(&self, hardware: &str) -> Result<CameraMetadata>;

    fn set_flashlight(&self, hardware: &str, mode: FlashMode, enable: bool) -> Result<()>;

    /// Bring up the shared media system. Called once before the first
    /// controller powers up.
    fn start_system(&self) -> Result<()>;

    fn stop_system(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_config_from_port_fills_defaults() {
        let format = PortFormat {
            stream_id: 2,
            width: 640,
            format: PixelFormat::Rgba8888,
            ..Default::default()
        };
        let config = StreamConfig::from(&format);
        assert_eq!(config.stream_id, 2);
        assert_eq!(config.width, 640);
        assert_eq!(config.height, 1080);
        assert_eq!(config.buffer_count, 4);
        assert_eq!(config.format, PixelFormat::Rgba8888);
    }
}
