// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Source stages backed by a media block controller.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::binding::HardwareBinding;
use super::source_node::SourceNode;
use crate::core::device::{
    downcast_controller, ControllerId, DeviceManager, ManagerId, StreamConfig, StreamController,
};
use crate::core::frames::{FrameCallback, FrameSpec, StreamId};
use crate::core::graph::Port;
use crate::core::pool::BufferPoolRegistry;
use crate::core::{HalError, Result};

/// Drives one [`StreamController`] through the [`DeviceManager`].
///
/// Several streams of one node share the controller. It is configured and
/// started by the first stream and stopped when the last one goes away.
pub struct DeviceBinding {
    device_manager: Arc<DeviceManager>,
    manager: ManagerId,
    controller: ControllerId,
    streams: Mutex<HashMap<StreamId, Arc<StreamController>>>,
}

impl DeviceBinding {
    pub fn new(device_manager: Arc<DeviceManager>, manager: ManagerId) -> Self {
        Self {
            device_manager,
            manager,
            controller: manager.controller_id(),
            streams: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self) -> Result<Arc<StreamController>> {
        self.device_manager
            .get_controller(self.manager, self.controller, None)
            .and_then(downcast_controller::<StreamController>)
            .ok_or_else(|| {
                HalError::NotFound(format!(
                    "[{}] no {} stream controller",
                    self.device_manager.backend(),
                    self.manager
                ))
            })
    }

    /// Names of the peer across `port` when that peer is itself hardware.
    fn hardware_peer(port: &Arc<Port>) -> Option<(String, String)> {
        let peer = port.peer()?;
        let node = peer.node()?;
        if !node.is_hardware_backed() {
            return None;
        }
        Some((node.name().to_string(), peer.name().to_string()))
    }

    /// Number of streams currently holding the controller.
    pub fn active_streams(&self) -> usize {
        self.streams.lock().len()
    }
}

impl HardwareBinding for DeviceBinding {
    fn is_hardware(&self) -> bool {
        true
    }

    fn start(
        &self,
        node: &str,
        stream_id: StreamId,
        port: &Arc<Port>,
        on_buffer: FrameCallback,
    ) -> Result<()> {
        let mut streams = self.streams.lock();
        if streams.contains_key(&stream_id) {
            return Ok(());
        }

        let first = streams.is_empty();
        let controller = match streams.values().next() {
            Some(controller) => Arc::clone(controller),
            None => {
                let controller = self.resolve()?;
                controller.configure(StreamConfig::from(&port.format()))?;
                controller.start()?;
                controller.set_node_callback(on_buffer);
                controller
            }
        };

        if let Some((peer_node, peer_port)) = Self::hardware_peer(port) {
            if let Err(e) = self
                .device_manager
                .connect(node, port.name(), &peer_node, &peer_port)
            {
                if first {
                    controller.clear_node_callback();
                    if let Err(stop_err) = controller.stop() {
                        tracing::warn!("[{}] {} stop failed: {}", node, self.manager, stop_err);
                    }
                }
                return Err(e);
            }
        }
        streams.insert(stream_id, controller);
        tracing::debug!(
            "[{}] {} bound for stream {} ({} active)",
            node,
            self.manager,
            stream_id,
            streams.len()
        );
        Ok(())
    }

    fn stop(&self, node: &str, stream_id: StreamId, port: &Arc<Port>) -> Result<()> {
        let mut streams = self.streams.lock();
        let Some(controller) = streams.remove(&stream_id) else {
            return Ok(());
        };

        if let Some((peer_node, peer_port)) = Self::hardware_peer(port) {
            if let Err(e) = self
                .device_manager
                .unconnect(node, port.name(), &peer_node, &peer_port)
            {
                tracing::warn!("[{}] unconnect from '{}' failed: {}", node, peer_node, e);
            }
        }

        if !streams.is_empty() {
            tracing::debug!(
                "[{}] stream {} released, {} still on {}",
                node,
                stream_id,
                streams.len(),
                self.manager
            );
            return Ok(());
        }
        controller.clear_node_callback();
        controller.stop()?;
        tracing::debug!("[{}] {} released for stream {}", node, self.manager, stream_id);
        Ok(())
    }

    fn provide_buffers(&self, frame: FrameSpec) -> Result<()> {
        let controller = {
            let streams = self.streams.lock();
            streams
                .get(&frame.buffer.stream_id)
                .or_else(|| streams.values().next())
                .cloned()
        };
        let controller = controller
            .ok_or_else(|| HalError::Hardware(format!("{} is not started", self.manager)))?;
        controller.send_frame(frame)
    }
}

/// A [`SourceNode`] driving the `manager` block of `device_manager`.
pub fn new_device_node(
    name: impl Into<String>,
    device_manager: Arc<DeviceManager>,
    manager: ManagerId,
    pools: Arc<BufferPoolRegistry>,
) -> Arc<SourceNode> {
    let binding = Arc::new(DeviceBinding::new(device_manager, manager));
    SourceNode::new(name, manager.to_string(), binding, pools)
}
