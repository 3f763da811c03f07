// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! The pipeline stage contract.
//!
//! Every stage implements [`Node`] and embeds a [`NodeBase`] that owns its
//! name, type tag and ports. Stage-specific behaviour (buffer engines,
//! hardware bindings) is composed into the concrete type rather than
//! inherited.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::Port;
use crate::core::frames::{
    CameraMetadata, CaptureId, FrameBuffer, FrameSpec, PoolId, StreamId,
};
use crate::core::{HalError, Result};

/// Capability interface shared by every pipeline stage.
///
/// Lifecycle methods default to successful no-ops so stages only override
/// what they take part in.
pub trait Node: Send + Sync + 'static {
    /// Shared name/port storage of this stage.
    fn base(&self) -> &NodeBase;

    fn as_any(&self) -> &dyn Any;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn node_type(&self) -> &str {
        self.base().node_type()
    }

    /// Existing port called `name`, or a new one bound to this node.
    fn get_port(&self, name: &str) -> Arc<Port> {
        self.base().get_port(name)
    }

    /// Whether buffers for this stage travel inside hardware.
    fn is_hardware_backed(&self) -> bool {
        false
    }

    fn init(&self, _stream_id: StreamId) -> Result<()> {
        Ok(())
    }

    fn start(&self, _stream_id: StreamId) -> Result<()> {
        Ok(())
    }

    fn flush(&self, _stream_id: StreamId) -> Result<()> {
        Ok(())
    }

    fn stop(&self, _stream_id: StreamId) -> Result<()> {
        Ok(())
    }

    fn config(&self, _stream_id: StreamId, _meta: &CameraMetadata) -> Result<()> {
        Ok(())
    }

    fn capture(&self, _stream_id: StreamId, _capture_id: CaptureId) -> Result<()> {
        Ok(())
    }

    fn cancel_capture(&self, _stream_id: StreamId) -> Result<()> {
        Ok(())
    }

    /// Accept one buffer from an upstream peer.
    ///
    /// The default forwards it through the output port backed by the
    /// buffer's pool.
    fn deliver_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        self.base().forward_buffer(buffer)
    }

    /// Accept a group of buffers that belong together.
    fn deliver_buffers(&self, buffers: Vec<FrameBuffer>) -> Result<()> {
        for buffer in buffers {
            self.deliver_buffer(buffer)?;
        }
        Ok(())
    }

    /// Hand an empty buffer to the hardware behind this stage.
    fn provide_buffers(&self, _frame: FrameSpec) -> Result<()> {
        Err(HalError::GraphError(format!(
            "[{}] node does not take buffers from a pool",
            self.name()
        )))
    }
}

/// Name, type tag and ports of a stage.
///
/// Dropping the base disconnects every port it owns.
pub struct NodeBase {
    name: String,
    node_type: String,
    self_ref: Weak<dyn Node>,
    ports: Mutex<Vec<Arc<Port>>>,
}

impl NodeBase {
    /// `self_ref` must point at the node embedding this base; it becomes the
    /// owner of every port the base creates.
    pub fn new(
        name: impl Into<String>,
        node_type: impl Into<String>,
        self_ref: Weak<dyn Node>,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            self_ref,
            ports: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    /// Return the port called `name`, creating it on first reference.
    pub fn get_port(&self, name: &str) -> Arc<Port> {
        let mut ports = self.ports.lock();
        if let Some(port) = ports.iter().find(|p| p.name() == name) {
            return Arc::clone(port);
        }
        let port = Arc::new(Port::new(name, self.self_ref.clone()));
        ports.push(Arc::clone(&port));
        tracing::trace!("[{}] created port '{}'", self.name, name);
        port
    }

    pub fn find_port(&self, name: &str) -> Option<Arc<Port>> {
        self.ports.lock().iter().find(|p| p.name() == name).cloned()
    }

    /// All ports in creation order.
    pub fn ports(&self) -> Vec<Arc<Port>> {
        self.ports.lock().clone()
    }

    pub fn input_ports(&self) -> Vec<Arc<Port>> {
        self.ports.lock().iter().filter(|p| p.is_input()).cloned().collect()
    }

    pub fn output_ports(&self) -> Vec<Arc<Port>> {
        self.ports.lock().iter().filter(|p| p.is_output()).cloned().collect()
    }

    /// First output port whose format carries `stream_id`.
    pub fn output_port_for_stream(&self, stream_id: StreamId) -> Option<Arc<Port>> {
        self.ports
            .lock()
            .iter()
            .find(|p| p.is_output() && p.format().stream_id == stream_id)
            .cloned()
    }

    /// First output port backed by `pool_id`.
    pub fn output_port_for_pool(&self, pool_id: PoolId) -> Option<Arc<Port>> {
        self.ports
            .lock()
            .iter()
            .find(|p| p.is_output() && p.format().pool_id == pool_id)
            .cloned()
    }

    /// Send `buffer` out of the port whose pool matches the buffer's pool.
    pub fn forward_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        let Some(port) = self.output_port_for_pool(buffer.pool_id()) else {
            tracing::warn!(
                "[{}] no output port for pool {}, dropping buffer {}",
                self.name,
                buffer.pool_id(),
                buffer.index()
            );
            return Err(HalError::PortError(format!(
                "node '{}' has no output port for pool {}",
                self.name,
                buffer.pool_id()
            )));
        };
        tracing::trace!(
            "[{}] forwarding buffer {} via '{}'",
            self.name,
            buffer.index(),
            port.name()
        );
        port.deliver_buffer(buffer)
    }

    /// Disconnect every owned port.
    pub fn disconnect_all(&self) {
        for port in self.ports.lock().iter() {
            port.disconnect();
        }
    }
}

impl Drop for NodeBase {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl std::fmt::Debug for NodeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeBase")
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("ports", &self.ports.lock().len())
            .finish()
    }
}
