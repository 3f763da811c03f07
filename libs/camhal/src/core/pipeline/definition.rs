// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline definition files (JSON or YAML).
//!
//! # Example
//!
//! ```yaml
//! name: preview
//! pools:
//!   - { name: preview, buffer_count: 4, width: 640, height: 480, format: yuv420sp }
//! nodes:
//!   - { name: "vpss#0", type: device }
//!   - { name: preview_sink, type: sink }
//! connections:
//!   - { from: "vpss#0.out#0", to: "preview_sink.in0", pool: preview, stream_id: 0 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::frames::StreamId;
use crate::core::pool::HeapBufferPoolConfig;
use crate::core::{HalError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Optional pipeline name for logging.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub pools: Vec<PoolDefinition>,

    /// Nodes in upstream-to-downstream order. Streams start in reverse
    /// order and stop in this order.
    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,
}

/// A named heap pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolDefinition {
    pub name: String,
    #[serde(flatten)]
    pub config: HeapBufferPoolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node name; media block names carry their index (`vpss#0`).
    pub name: String,

    /// Type name registered in the [`NodeFactory`](super::NodeFactory).
    #[serde(rename = "type")]
    pub node_type: String,

    #[serde(default)]
    pub config: serde_json::Value,
}

/// Link from an output port to an input port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    /// Source output port: `"node.port"`
    pub from: String,

    /// Target input port: `"node.port"`
    pub to: String,

    /// Pool backing the link. Hardware-to-hardware links have none.
    #[serde(default)]
    pub pool: Option<String>,

    #[serde(default)]
    pub stream_id: StreamId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPortRef<'a> {
    pub node: &'a str,
    pub port: &'a str,
}

impl ConnectionDefinition {
    pub fn parse_from(&self) -> Result<ParsedPortRef<'_>> {
        parse_port_ref(&self.from)
    }

    pub fn parse_to(&self) -> Result<ParsedPortRef<'_>> {
        parse_port_ref(&self.to)
    }
}

/// Parse `"node.port"`; node names may not contain `.`.
fn parse_port_ref(s: &str) -> Result<ParsedPortRef<'_>> {
    match s.split_once('.') {
        Some((node, port)) if !node.is_empty() && !port.is_empty() => {
            Ok(ParsedPortRef { node, port })
        }
        _ => Err(HalError::GraphError(format!(
            "Invalid port reference '{}', expected 'node.port'",
            s
        ))),
    }
}

impl PipelineDefinition {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| HalError::GraphError(format!("Failed to parse pipeline JSON: {}", e)))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| HalError::GraphError(format!("Failed to parse pipeline YAML: {}", e)))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HalError::GraphError(format!(
                "Failed to open pipeline file '{}': {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("pipeline")
    }

    /// Check names and references without building anything.
    pub fn validate(&self) -> Result<()> {
        let mut pools: HashSet<&str> = HashSet::new();
        for pool in &self.pools {
            if !pools.insert(pool.name.as_str()) {
                return Err(HalError::GraphError(format!(
                    "Duplicate pool name: '{}'",
                    pool.name
                )));
            }
            if pool.config.buffer_count == 0 {
                return Err(HalError::GraphError(format!(
                    "Pool '{}' has no buffers",
                    pool.name
                )));
            }
        }

        let mut nodes: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if node.name.contains('.') {
                return Err(HalError::GraphError(format!(
                    "Node name '{}' may not contain '.'",
                    node.name
                )));
            }
            if !nodes.insert(node.name.as_str()) {
                return Err(HalError::GraphError(format!(
                    "Duplicate node name: '{}'",
                    node.name
                )));
            }
        }

        for conn in &self.connections {
            for port_ref in [conn.parse_from()?, conn.parse_to()?] {
                if !nodes.contains(port_ref.node) {
                    return Err(HalError::GraphError(format!(
                        "Connection references unknown node: '{}'",
                        port_ref.node
                    )));
                }
            }
            if let Some(pool) = &conn.pool {
                if !pools.contains(pool.as_str()) {
                    return Err(HalError::GraphError(format!(
                        "Connection references unknown pool: '{}'",
                        pool
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frames::PixelFormat;

    const PREVIEW: &str = r#"
name: preview
pools:
  - { name: preview, buffer_count: 4, width: 640, height: 480, format: yuv420sp }
nodes:
  - { name: "vpss#0", type: device, config: { manager: vpss } }
  - { name: preview_sink, type: sink }
connections:
  - { from: "vpss#0.out#0", to: "preview_sink.in0", pool: preview }
"#;

    #[test]
    fn test_parse_yaml() {
        let def = PipelineDefinition::from_yaml_str(PREVIEW).unwrap();
        assert_eq!(def.display_name(), "preview");
        assert_eq!(def.pools[0].config.format, PixelFormat::Yuv420Sp);
        assert_eq!(def.pools[0].config.buffer_count, 4);
        assert_eq!(def.nodes[0].config["manager"], "vpss");
        assert!(def.nodes[1].config.is_null());
        assert_eq!(def.connections[0].stream_id, 0);

        let from = def.connections[0].parse_from().unwrap();
        assert_eq!(from, ParsedPortRef { node: "vpss#0", port: "out#0" });
        def.validate().unwrap();
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "nodes": [ { "name": "src", "type": "source" }, { "name": "sink", "type": "sink" } ],
            "connections": [ { "from": "src.out0", "to": "sink.in0", "stream_id": 2 } ]
        }"#;
        let def = PipelineDefinition::from_json_str(json).unwrap();
        assert_eq!(def.connections[0].stream_id, 2);
        def.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_references() {
        let mut def = PipelineDefinition::from_yaml_str(PREVIEW).unwrap();
        def.connections[0].pool = Some("video".into());
        assert!(def.validate().is_err());

        let mut def = PipelineDefinition::from_yaml_str(PREVIEW).unwrap();
        def.connections[0].to = "display.in0".into();
        assert!(def.validate().is_err());

        let mut def = PipelineDefinition::from_yaml_str(PREVIEW).unwrap();
        def.connections[0].from = "vpss#0".into();
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut def = PipelineDefinition::from_yaml_str(PREVIEW).unwrap();
        def.nodes.push(def.nodes[1].clone());
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.yaml");
        std::fs::write(&path, PREVIEW).unwrap();
        assert_eq!(PipelineDefinition::load(&path).unwrap().nodes.len(), 2);
        assert!(PipelineDefinition::load(&dir.path().join("missing.yaml")).is_err());
    }
}
