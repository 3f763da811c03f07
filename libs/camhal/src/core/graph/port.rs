// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Named, directional node endpoints.
//!
//! Direction is derived from the name: ports whose name starts with
//! [`INPUT_PORT_PREFIX`] are inputs, every other port is an output. Graph
//! builders must follow that convention.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::Node;
use crate::core::frames::{FrameBuffer, PixelFormat, PoolId, StreamId};
use crate::core::{HalError, Result};

/// Name prefix marking an input port.
pub const INPUT_PORT_PREFIX: &str = "in";

/// Direction of a port, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Receives buffers from a peer output.
    Input,
    /// Sends buffers to a peer input.
    Output,
}

/// Stream format bound to a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PortFormat {
    pub stream_id: StreamId,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub usage: u64,
    #[serde(default)]
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Pool backing this port; 0 when the port has no pool.
    #[serde(default)]
    pub pool_id: PoolId,
}

/// Endpoint on a node, optionally linked to one peer port.
pub struct Port {
    name: String,
    format: Mutex<PortFormat>,
    node: Weak<dyn Node>,
    peer: Mutex<Option<Arc<Port>>>,
}

impl Port {
    /// Create a port owned by `node`.
    pub fn new(name: impl Into<String>, node: Weak<dyn Node>) -> Self {
        Self {
            name: name.into(),
            format: Mutex::new(PortFormat::default()),
            node,
            peer: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PortDirection {
        if self.name.starts_with(INPUT_PORT_PREFIX) {
            PortDirection::Input
        } else {
            PortDirection::Output
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction() == PortDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction() == PortDirection::Output
    }

    pub fn format(&self) -> PortFormat {
        *self.format.lock()
    }

    pub fn set_format(&self, format: PortFormat) {
        *self.format.lock() = format;
    }

    /// Owning node, if it is still alive.
    pub fn node(&self) -> Option<Arc<dyn Node>> {
        self.node.upgrade()
    }

    /// Link this port to `peer`, replacing any previous peer.
    ///
    /// Only this side is changed; use [`link_ports`] to wire both ends.
    pub fn connect(&self, peer: &Arc<Port>) {
        let previous = self.peer.lock().replace(Arc::clone(peer));
        if let Some(previous) = previous {
            tracing::debug!(
                "[{}] port replaced peer '{}' with '{}'",
                self.name,
                previous.name(),
                peer.name()
            );
        }
    }

    /// Drop the peer link.
    pub fn disconnect(&self) {
        self.peer.lock().take();
    }

    pub fn peer(&self) -> Option<Arc<Port>> {
        self.peer.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.peer.lock().is_some()
    }

    /// Hand `buffer` to the node that owns the peer port.
    pub fn deliver_buffer(&self, buffer: FrameBuffer) -> Result<()> {
        self.peer_node()?.deliver_buffer(buffer)
    }

    /// Hand a group of buffers to the peer node as one unit.
    pub fn deliver_buffers(&self, buffers: Vec<FrameBuffer>) -> Result<()> {
        self.peer_node()?.deliver_buffers(buffers)
    }

    fn peer_node(&self) -> Result<Arc<dyn Node>> {
        let peer = self
            .peer()
            .ok_or_else(|| HalError::PortError(format!("port '{}' has no peer", self.name)))?;
        peer.node().ok_or_else(|| {
            HalError::PortError(format!(
                "peer '{}' of port '{}' has no live node",
                peer.name(),
                self.name
            ))
        })
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("name", &self.name)
            .field("direction", &self.direction())
            .field("format", &self.format())
            .field("peer", &self.peer().map(|p| p.name().to_string()))
            .finish()
    }
}

/// Wire `a` and `b` to each other.
pub fn link_ports(a: &Arc<Port>, b: &Arc<Port>) {
    a.connect(b);
    b.connect(a);
}

/// Undo [`link_ports`].
pub fn unlink_ports(a: &Arc<Port>, b: &Arc<Port>) {
    a.disconnect();
    b.disconnect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(name: &str) -> Arc<Port> {
        let node: Weak<dyn Node> = Weak::<crate::core::nodes::SinkNode>::new();
        Arc::new(Port::new(name, node))
    }

    #[test]
    fn test_direction_from_name() {
        assert_eq!(detached("in0").direction(), PortDirection::Input);
        assert_eq!(detached("in#1").direction(), PortDirection::Input);
        assert_eq!(detached("out0").direction(), PortDirection::Output);
        assert_eq!(detached("video").direction(), PortDirection::Output);
    }

    #[test]
    fn test_link_and_unlink() {
        let out = detached("out0");
        let inp = detached("in0");

        link_ports(&out, &inp);
        assert!(Arc::ptr_eq(&out.peer().unwrap(), &inp));
        assert!(Arc::ptr_eq(&inp.peer().unwrap(), &out));

        unlink_ports(&out, &inp);
        assert!(out.peer().is_none());
        assert!(inp.peer().is_none());
    }

    #[test]
    fn test_deliver_without_peer_fails() {
        let out = detached("out0");
        assert!(out.deliver_buffer(FrameBuffer::new(0, 1, 1)).is_err());
    }
}
