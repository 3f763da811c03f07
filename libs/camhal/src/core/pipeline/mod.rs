// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Declarative pipeline assembly.

mod assembly;
mod definition;
mod factory;

pub use definition::{
    ConnectionDefinition, NodeDefinition, ParsedPortRef, PipelineDefinition, PoolDefinition,
};
pub use assembly::Pipeline;
pub use factory::NodeFactory;
