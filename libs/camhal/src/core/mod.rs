// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod frames;
pub mod graph;
pub mod nodes;
pub mod pipeline;
pub mod pool;

pub use config::HalConfig;
pub use context::HalContext;
pub use device::*;
pub use error::*;
pub use frames::*;
pub use graph::*;
pub use nodes::*;
pub use pipeline::*;
pub use pool::*;
