// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Hardware-to-hardware wiring between media blocks.
//!
//! Node and port names carry the block kind and index (`vpss#0`,
//! `out#1`). A [`RouteTable`] maps (source kind, destination kind) pairs to
//! the action needed to wire them.

use std::collections::HashMap;
use std::fmt;

use super::ids::{ControllerId, ManagerId};

/// Media block kinds that take part in hardware wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Vi,
    Vo,
    Vpss,
    Venc,
}

impl StageKind {
    /// Kind named by a node, matched by substring.
    ///
    /// `vpss` and `venc` are tested before `vi`/`vo`.
    pub fn from_node_name(name: &str) -> Option<Self> {
        let name = name.to_ascii_lowercase();
        [
            ("vpss", StageKind::Vpss),
            ("venc", StageKind::Venc),
            ("vi", StageKind::Vi),
            ("vo", StageKind::Vo),
        ]
        .into_iter()
        .find(|(key, _)| name.contains(key))
        .map(|(_, kind)| kind)
    }

    /// A display block only consumes frames.
    pub fn has_outputs(self) -> bool {
        !matches!(self, StageKind::Vo)
    }

    pub fn manager_id(self) -> ManagerId {
        match self {
            StageKind::Vi => ManagerId::Vi,
            StageKind::Vo => ManagerId::Vo,
            StageKind::Vpss => ManagerId::Vpss,
            StageKind::Venc => ManagerId::Venc,
        }
    }

    pub fn controller_id(self) -> ControllerId {
        self.manager_id().controller_id()
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.manager_id(), f)
    }
}

/// Numeric suffix after `#`, or 0 when absent or not a number.
pub fn parse_index(name: &str) -> u32 {
    name.rsplit_once('#')
        .and_then(|(_, index)| index.trim().parse().ok())
        .unwrap_or(0)
}

/// One side of a hardware wire: block kind, device index, channel index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteEndpoint {
    pub kind: StageKind,
    pub device: u32,
    pub channel: u32,
}

impl RouteEndpoint {
    /// Endpoint for `node`/`port`, or `None` when the node is not a media block.
    pub fn parse(node: &str, port: &str) -> Option<Self> {
        let kind = StageKind::from_node_name(node)?;
        Some(Self {
            kind,
            device: parse_index(node),
            channel: parse_index(port),
        })
    }
}

impl fmt::Display for RouteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}:{}", self.kind, self.device, self.channel)
    }
}

/// What wiring a route needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteHandler {
    /// Whether tearing the route down requires an explicit unbind.
    pub unbind_required: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: HashMap<(StageKind, StageKind), RouteHandler>,
}

impl RouteTable {
    /// A table with no routes; every connect is a no-op.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Routes of the vendor media pipeline.
    pub fn mpi() -> Self {
        let mut table = Self::empty();
        table.insert(StageKind::Vi, StageKind::Vpss, RouteHandler { unbind_required: true });
        table.insert(StageKind::Vpss, StageKind::Venc, RouteHandler { unbind_required: true });
        table.insert(StageKind::Vpss, StageKind::Vo, RouteHandler { unbind_required: false });
        table
    }

    pub fn insert(&mut self, src: StageKind, dst: StageKind, handler: RouteHandler) {
        self.routes.insert((src, dst), handler);
    }

    pub fn get(&self, src: StageKind, dst: StageKind) -> Option<RouteHandler> {
        self.routes.get(&(src, dst)).copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_prefers_longer_names() {
        assert_eq!(StageKind::from_node_name("vpss#0"), Some(StageKind::Vpss));
        assert_eq!(StageKind::from_node_name("venc#1"), Some(StageKind::Venc));
        assert_eq!(StageKind::from_node_name("vi#0"), Some(StageKind::Vi));
        assert_eq!(StageKind::from_node_name("vo#0"), Some(StageKind::Vo));
        assert_eq!(StageKind::from_node_name("fork"), None);
    }

    #[test]
    fn test_parse_index() {
        assert_eq!(parse_index("out#2"), 2);
        assert_eq!(parse_index("vpss"), 0);
        assert_eq!(parse_index("vpss#x"), 0);
    }

    #[test]
    fn test_mpi_routes() {
        let table = RouteTable::mpi();
        assert_eq!(table.len(), 3);
        assert!(table.get(StageKind::Vi, StageKind::Vpss).unwrap().unbind_required);
        assert!(!table.get(StageKind::Vpss, StageKind::Vo).unwrap().unbind_required);
        assert!(table.get(StageKind::Vi, StageKind::Venc).is_none());
    }

    #[test]
    fn test_endpoint_parse() {
        let endpoint = RouteEndpoint::parse("vpss#1", "out#3").unwrap();
        assert_eq!(endpoint.kind, StageKind::Vpss);
        assert_eq!((endpoint.device, endpoint.channel), (1, 3));
        assert_eq!(endpoint.to_string(), "vpss#1:3");
        assert!(RouteEndpoint::parse("sink", "in0").is_none());
    }
}
