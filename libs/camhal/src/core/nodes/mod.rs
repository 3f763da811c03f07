// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Concrete pipeline stages.
//!
//! - [`SourceNode`]: pulls buffers from a pool into a hardware block and
//!   distributes completed buffers downstream.
//! - [`SinkNode`]: hands delivered buffers to an external consumer.
//! - [`ForkNode`]: duplicates a stream into a second pool.
//! - [`MergeNode`]: pairs buffers from two pools into one delivery.

mod binding;
mod device_node;
mod fork_node;
mod merge_node;
mod port_handler;
mod sink_node;
mod source_node;

pub use binding::{HardwareBinding, LoopbackBinding};
pub use device_node::{new_device_node, DeviceBinding};
pub use fork_node::ForkNode;
pub use merge_node::{MergeConfig, MergeNode};
pub use sink_node::{SinkCallback, SinkNode};
pub use source_node::SourceNode;
