// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Semi-planar YUV 4:2:0 (NV12).
    #[default]
    Yuv420Sp,
    /// Semi-planar YUV 4:2:2.
    Yuv422Sp,
    /// Packed 32-bit RGBA.
    Rgba8888,
    /// 10-bit Bayer raw, unpacked to 16 bits per sample.
    Raw10,
    /// Compressed JPEG still.
    Jpeg,
    /// H.264 elementary stream.
    H264,
    /// H.265 elementary stream.
    H265,
}

impl PixelFormat {
    /// Bytes needed to hold one frame of `width` x `height`.
    ///
    /// Compressed formats are sized for the worst case (one uncompressed
    /// YUV 4:2:0 frame).
    pub fn frame_size(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Yuv420Sp | Self::Jpeg | Self::H264 | Self::H265 => pixels * 3 / 2,
            Self::Yuv422Sp | Self::Raw10 => pixels * 2,
            Self::Rgba8888 => pixels * 4,
        }
    }

    /// Whether buffers of this format carry an encoded bitstream.
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Jpeg | Self::H264 | Self::H265)
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yuv420Sp => write!(f, "YUV420SP"),
            Self::Yuv422Sp => write!(f, "YUV422SP"),
            Self::Rgba8888 => write!(f, "RGBA8888"),
            Self::Raw10 => write!(f, "RAW10"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::H264 => write!(f, "H264"),
            Self::H265 => write!(f, "H265"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(PixelFormat::Yuv420Sp.frame_size(640, 480), 460_800);
        assert_eq!(PixelFormat::Rgba8888.frame_size(2, 2), 16);
        assert_eq!(PixelFormat::Raw10.frame_size(4, 4), 32);
    }

    #[test]
    fn test_serde_names() {
        let f: PixelFormat = serde_json::from_str("\"yuv420sp\"").unwrap();
        assert_eq!(f, PixelFormat::Yuv420Sp);
        assert_eq!(serde_json::to_string(&PixelFormat::H264).unwrap(), "\"h264\"");
    }
}
