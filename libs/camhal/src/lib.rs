// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Camera HAL pipeline core.
//!
//! Two halves that only make sense together:
//!
//! - the pipeline graph ([`core::graph`], [`core::nodes`]): named stages with
//!   directional ports, and the collector/distributor machinery that moves
//!   frame buffers between a [`core::pool::BufferPool`] and a hardware block;
//! - the device layer ([`core::device`]): the [`DeviceManager`] registry of
//!   managers and controllers built from a [`HardwareTable`], with per-camera
//!   power control and hardware route wiring.
//!
//! [`Pipeline`] assembles both from a declarative [`PipelineDefinition`].

#![allow(clippy::type_complexity)] // Callback types are clear in context

pub mod core;

pub use core::{
    BufferPool, BufferPoolRegistry, BufferStatus, CameraId, CameraMetadata, CaptureId,
    Controller, ControllerId, DeviceManager, DeviceBinding, DeviceManagerRegistry, FlashMode,
    ForkNode, FrameBuffer, FrameSpec, HalConfig, HalContext, HalError, HardwareConfiguration,
    HardwareDriver, HardwareTable, HeapBufferPool, ManagerId, MergeNode, Node, NodeFactory,
    Pipeline, PipelineDefinition, PixelFormat, Port, PortFormat, Result, SimulatedDriver,
    SinkNode, SourceNode, StreamId,
};
