// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

/// The single failure value of the HAL core.
///
/// Every variant means the same thing to a caller (the operation failed);
/// the variant only carries context for logs.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Hardware operation failed: {0}")]
    Hardware(String),

    #[error("Buffer operation failed: {0}")]
    BufferError(String),

    #[error("Port connection error: {0}")]
    PortError(String),

    #[error("Pipeline graph error: {0}")]
    GraphError(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Worker thread error: {0}")]
    Thread(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HalError>;
