// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Frame buffers, frame descriptors and camera metadata.

mod buffer;
mod metadata;
mod pixel_format;

pub use buffer::*;
pub use metadata::*;
pub use pixel_format::PixelFormat;
