// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Pipeline graph primitives: ports, nodes and capture bookkeeping.

mod capture_queue;
mod node;
mod port;
mod state;

pub use capture_queue::CaptureQueue;
pub use node::{Node, NodeBase};
pub use port::{link_ports, unlink_ports, Port, PortDirection, PortFormat, INPUT_PORT_PREFIX};
pub use state::StreamState;
