// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::definition::NodeDefinition;
use crate::core::context::HalContext;
use crate::core::device::{ManagerId, StageKind};
use crate::core::graph::Node;
use crate::core::nodes::{new_device_node, ForkNode, LoopbackBinding, MergeConfig, MergeNode, SinkNode, SourceNode};
use crate::core::{HalError, Result};

mod private {
    use super::{Arc, HalContext, Node, NodeDefinition, Result};

    /// Factory function signature for creating nodes.
    pub type ConstructorFn =
        Box<dyn Fn(&NodeDefinition, &HalContext) -> Result<Arc<dyn Node>> + Send + Sync>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SourceConfig {
    /// Delay between completions of the loopback source.
    interval_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeviceConfig {
    /// Media block to drive; inferred from the node name when absent.
    manager: Option<ManagerId>,
}

/// Deserialize a node's config, falling back to defaults when absent.
fn node_config<C: DeserializeOwned + Default>(def: &NodeDefinition) -> Result<C> {
    if def.config.is_null() {
        return Ok(C::default());
    }
    serde_json::from_value(def.config.clone()).map_err(|e| {
        HalError::Configuration(format!(
            "Failed to deserialize config for '{}': {}",
            def.name, e
        ))
    })
}

/// Type-name to constructor table for pipeline nodes.
pub struct NodeFactory {
    constructors: RwLock<HashMap<String, private::ConstructorFn>>,
}

impl Default for NodeFactory {
    fn default() -> Self {
        Self::with_builtin_nodes()
    }
}

impl NodeFactory {
    /// A factory with no node types.
    pub fn empty() -> Self {
        Self {
            constructors: RwLock::new(HashMap::new()),
        }
    }

    /// A factory knowing `source`, `device`, `sink`, `fork` and `merge`.
    pub fn with_builtin_nodes() -> Self {
        let factory = Self::empty();

        factory.register("source", |def, ctx| {
            let config: SourceConfig = node_config(def)?;
            let binding = LoopbackBinding::new(config.interval_ms.map(Duration::from_millis));
            let node: Arc<dyn Node> =
                SourceNode::new(&def.name, "source", Arc::new(binding), Arc::clone(&ctx.pools));
            Ok(node)
        });

        factory.register("device", |def, ctx| {
            let config: DeviceConfig = node_config(def)?;
            let manager = config
                .manager
                .or_else(|| StageKind::from_node_name(&def.name).map(StageKind::manager_id))
                .ok_or_else(|| {
                    HalError::Configuration(format!(
                        "Cannot tell which block '{}' drives; set config.manager",
                        def.name
                    ))
                })?;
            let device_manager = ctx.device_manager.clone().ok_or_else(|| {
                HalError::Configuration(format!(
                    "Device node '{}' needs a device manager",
                    def.name
                ))
            })?;
            let node: Arc<dyn Node> =
                new_device_node(&def.name, device_manager, manager, Arc::clone(&ctx.pools));
            Ok(node)
        });

        factory.register("sink", |def, _ctx| {
            let node: Arc<dyn Node> = SinkNode::new(&def.name);
            Ok(node)
        });

        factory.register("fork", |def, ctx| {
            let node: Arc<dyn Node> = ForkNode::new(&def.name, Arc::clone(&ctx.pools));
            Ok(node)
        });

        factory.register("merge", |def, _ctx| {
            let config: MergeConfig = node_config(def)?;
            let node: Arc<dyn Node> = MergeNode::new(&def.name, config);
            Ok(node)
        });

        factory
    }

    /// Register a node type. An existing type of the same name is kept.
    pub fn register<F>(&self, node_type: &str, constructor: F)
    where
        F: Fn(&NodeDefinition, &HalContext) -> Result<Arc<dyn Node>> + Send + Sync + 'static,
    {
        let mut constructors = self.constructors.write();
        if constructors.contains_key(node_type) {
            tracing::debug!("Node type '{}' already registered, skipping duplicate", node_type);
            return;
        }
        constructors.insert(node_type.to_string(), Box::new(constructor));
        tracing::debug!("[register] node type registered '{}'", node_type);
    }

    pub fn can_create(&self, node_type: &str) -> bool {
        self.constructors.read().contains_key(node_type)
    }

    pub fn create(&self, def: &NodeDefinition, ctx: &HalContext) -> Result<Arc<dyn Node>> {
        let constructors = self.constructors.read();
        let constructor = constructors.get(&def.node_type).ok_or_else(|| {
            HalError::NotFound(format!(
                "No factory registered for node type '{}'",
                def.node_type
            ))
        })?;
        constructor(def, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, node_type: &str, config: serde_json::Value) -> NodeDefinition {
        NodeDefinition {
            name: name.into(),
            node_type: node_type.into(),
            config,
        }
    }

    #[test]
    fn test_builtin_types() {
        let factory = NodeFactory::with_builtin_nodes();
        for node_type in ["source", "device", "sink", "fork", "merge"] {
            assert!(factory.can_create(node_type), "missing {}", node_type);
        }
        let ctx = HalContext::software();
        let node = factory
            .create(&def("merge", "merge", serde_json::json!({ "max_pending": 8 })), &ctx)
            .unwrap();
        assert_eq!(node.node_type(), "merge");
    }

    #[test]
    fn test_device_node_needs_device_manager() {
        let factory = NodeFactory::with_builtin_nodes();
        let result = factory.create(&def("vpss#0", "device", serde_json::Value::Null), &HalContext::software());
        assert!(matches!(result, Err(HalError::Configuration(_))));
    }

    #[test]
    fn test_bad_config_is_rejected() {
        let factory = NodeFactory::with_builtin_nodes();
        let result = factory.create(
            &def("src", "source", serde_json::json!({ "interval_ms": "fast" })),
            &HalContext::software(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_custom_type() {
        let factory = NodeFactory::empty();
        factory.register("tap", |def, _ctx| {
            let node: Arc<dyn Node> = SinkNode::new(&def.name);
            Ok(node)
        });
        assert!(factory.can_create("tap"));
        assert!(factory
            .create(&def("x", "sink", serde_json::Value::Null), &HalContext::software())
            .is_err());
    }
}
