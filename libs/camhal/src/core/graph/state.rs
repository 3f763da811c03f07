// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

/// Per-stream lifecycle of a source node.
///
/// `Unstarted -> (start) -> Running -> (flush) -> Draining -> (stop) -> Unstarted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StreamState {
    /// No worker threads exist for the stream.
    #[default]
    Unstarted,
    /// Collector and distributor are both running.
    Running,
    /// Collector stopped; buffers already in flight are still delivered.
    Draining,
    /// Stream is routed through hardware; no software buffer flow.
    Wired,
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unstarted => write!(f, "Unstarted"),
            Self::Running => write!(f, "Running"),
            Self::Draining => write!(f, "Draining"),
            Self::Wired => write!(f, "Wired"),
        }
    }
}
