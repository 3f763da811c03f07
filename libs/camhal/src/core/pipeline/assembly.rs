// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::Arc;

use super::definition::PipelineDefinition;
use super::factory::NodeFactory;
use crate::core::context::HalContext;
use crate::core::frames::{CameraMetadata, CaptureId, StreamId};
use crate::core::graph::{link_ports, Node, PortFormat};
use crate::core::nodes::{SinkCallback, SinkNode};
use crate::core::pool::{BufferPool, HeapBufferPool};
use crate::core::{HalError, Result};

/// A built node graph plus the pools it owns.
///
/// Dropping the pipeline disconnects every port and unregisters its pools.
pub struct Pipeline {
    name: String,
    context: HalContext,
    nodes: Vec<Arc<dyn Node>>,
    pools: Vec<(String, Arc<HeapBufferPool>)>,
}

impl Pipeline {
    /// Create pools and nodes from `def` and link the connections.
    pub fn build(def: &PipelineDefinition, context: &HalContext, factory: &NodeFactory) -> Result<Self> {
        def.validate()?;

        let mut pipeline = Self {
            name: def.display_name().to_string(),
            context: context.clone(),
            nodes: Vec::with_capacity(def.nodes.len()),
            pools: Vec::with_capacity(def.pools.len()),
        };

        for pool_def in &def.pools {
            let pool = context.pools.create_heap_pool(pool_def.config);
            tracing::debug!(
                "[{}] pool '{}' -> id {} ({} x {} bytes)",
                pipeline.name,
                pool_def.name,
                pool.id(),
                pool.buffer_count(),
                pool.buffer_size()
            );
            pipeline.pools.push((pool_def.name.clone(), pool));
        }

        for node_def in &def.nodes {
            let node = factory.create(node_def, context)?;
            pipeline.nodes.push(node);
        }

        for conn in &def.connections {
            let from = conn.parse_from()?;
            let to = conn.parse_to()?;
            let src = pipeline.require_node(from.node)?;
            let dst = pipeline.require_node(to.node)?;

            let out = src.get_port(from.port);
            let input = dst.get_port(to.port);
            if !out.is_output() {
                return Err(HalError::GraphError(format!("'{}' is not an output port", conn.from)));
            }
            if !input.is_input() {
                return Err(HalError::GraphError(format!("'{}' is not an input port", conn.to)));
            }
            if out.is_connected() || input.is_connected() {
                return Err(HalError::PortError(format!(
                    "'{}' -> '{}': port already linked",
                    conn.from, conn.to
                )));
            }

            let mut format = PortFormat {
                stream_id: conn.stream_id,
                ..Default::default()
            };
            if let Some(pool_name) = &conn.pool {
                let pool = pipeline.pool(pool_name).ok_or_else(|| {
                    HalError::GraphError(format!("unknown pool '{}'", pool_name))
                })?;
                let config = pool.config();
                format.width = config.width;
                format.height = config.height;
                format.format = config.format;
                format.usage = config.usage;
                format.buffer_count = config.buffer_count;
                format.pool_id = pool.id();
            }
            out.set_format(format);
            input.set_format(format);
            link_ports(&out, &input);
            tracing::debug!("[{}] linked {} -> {}", pipeline.name, conn.from, conn.to);
        }

        tracing::info!(
            "[{}] built ({} nodes, {} pools, {} links)",
            pipeline.name,
            pipeline.nodes.len(),
            pipeline.pools.len(),
            def.connections.len()
        );
        Ok(pipeline)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nodes in definition order.
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.nodes.iter().find(|n| n.name() == name).cloned()
    }

    fn require_node(&self, name: &str) -> Result<Arc<dyn Node>> {
        self.node(name)
            .ok_or_else(|| HalError::GraphError(format!("unknown node '{}'", name)))
    }

    pub fn pool(&self, name: &str) -> Option<Arc<HeapBufferPool>> {
        self.pools
            .iter()
            .find(|(pool_name, _)| pool_name == name)
            .map(|(_, pool)| Arc::clone(pool))
    }

    /// Names of every sink node.
    pub fn sink_names(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.as_any().is::<SinkNode>())
            .map(|n| n.name().to_string())
            .collect()
    }

    /// Init then Config every node for `stream_id`.
    pub fn pre_config(&self, stream_id: StreamId, meta: &CameraMetadata) -> Result<()> {
        for node in &self.nodes {
            node.init(stream_id)?;
            node.config(stream_id, meta)?;
        }
        Ok(())
    }

    /// Start `stream_id` on every node, most downstream first.
    pub fn start_recv_frame(&self, stream_id: StreamId) -> Result<()> {
        for node in self.nodes.iter().rev() {
            node.start(stream_id).map_err(|e| {
                tracing::error!("[{}] start of '{}' failed: {}", self.name, node.name(), e);
                e
            })?;
        }
        tracing::info!("[{}] stream {} receiving", self.name, stream_id);
        Ok(())
    }

    /// Stop `stream_id` on every node, most upstream first. Every node is
    /// stopped even if one fails; the first failure is returned.
    pub fn stop_recv_frame(&self, stream_id: StreamId) -> Result<()> {
        let mut first_error = None;
        for node in &self.nodes {
            if let Err(e) = node.stop(stream_id) {
                tracing::error!("[{}] stop of '{}' failed: {}", self.name, node.name(), e);
                first_error.get_or_insert(e);
            }
        }
        tracing::info!("[{}] stream {} stopped", self.name, stream_id);
        first_error.map_or(Ok(()), Err)
    }

    pub fn flush(&self, stream_id: StreamId) -> Result<()> {
        for node in &self.nodes {
            node.flush(stream_id)?;
        }
        Ok(())
    }

    /// Queue a capture request on every node handling `stream_id`.
    pub fn capture(&self, stream_id: StreamId, capture_id: CaptureId) -> Result<()> {
        for node in &self.nodes {
            node.capture(stream_id, capture_id)?;
        }
        Ok(())
    }

    pub fn cancel_capture(&self, stream_id: StreamId) -> Result<()> {
        for node in &self.nodes {
            node.cancel_capture(stream_id)?;
        }
        Ok(())
    }

    pub fn set_sink_callback(&self, node: &str, callback: SinkCallback) -> Result<()> {
        let node = self
            .node(node)
            .ok_or_else(|| HalError::NotFound(format!("no node '{}'", node)))?;
        let sink = node.as_any().downcast_ref::<SinkNode>().ok_or_else(|| {
            HalError::InvalidArgument(format!("'{}' is not a sink", node.name()))
        })?;
        sink.set_callback(callback);
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        for node in &self.nodes {
            node.base().disconnect_all();
        }
        for (_, pool) in &self.pools {
            pool.notify_stop();
            self.context.pools.remove(pool.id());
        }
        tracing::debug!("[{}] torn down", self.name);
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .field("pools", &self.pools.len())
            .finish()
    }
}
