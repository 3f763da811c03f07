// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! camhal-runtime - runs a camera pipeline against the simulated driver.
//!
//! Loads `camhal.yaml` from the config directory, powers up one camera,
//! assembles the pipeline and streams until every sink has received the
//! requested number of frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use camhal::core::device::{DeviceStatus, HardwareVariant, RouteTable};
use camhal::core::nodes::SinkCallback;
use camhal::{
    BufferPoolRegistry, CameraId, CameraMetadata, DeviceManagerRegistry, FrameBuffer, HalConfig,
    HalContext, NodeFactory, Pipeline, PipelineDefinition, SimulatedDriver,
};
use clap::Parser;

const DEFAULT_PIPELINE: &str = include_str!("../pipelines/mpi_preview.yaml");

#[derive(Parser, Debug)]
#[command(name = "camhal-runtime")]
#[command(author, version, about = "Camera HAL pipeline runtime", long_about = None)]
struct Args {
    /// Directory containing camhal.yaml
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Hardware backend, overrides the config file (mpi, v4l2)
    #[arg(long)]
    backend: Option<String>,

    /// Pipeline definition (YAML or JSON), overrides the config file
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Camera to power up
    #[arg(long, default_value = "1")]
    camera: u32,

    /// Stream to start
    #[arg(long, default_value = "0")]
    stream: i32,

    /// Frames each sink must receive before stopping
    #[arg(long, default_value = "30")]
    frames: usize,

    /// Give up after this many seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Capture ids queued before the stream starts
    #[arg(long, value_delimiter = ',')]
    capture: Vec<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // ---------------------------------------------------------------
    // Logging
    // ---------------------------------------------------------------
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .init();

    // ---------------------------------------------------------------
    // Configuration
    // ---------------------------------------------------------------
    let mut config = HalConfig::load_or_default(&args.config_dir);
    if let Some(backend) = &args.backend {
        config.backend = backend.clone();
    }
    let camera = CameraId(args.camera);

    tracing::info!(
        "[camhal-runtime] backend '{}', camera {}, stream {}",
        config.backend,
        camera,
        args.stream
    );

    // ---------------------------------------------------------------
    // Device layer
    // ---------------------------------------------------------------
    let driver = Arc::new(SimulatedDriver::with_frame_interval(config.frame_interval()));
    let registry = DeviceManagerRegistry::with_builtin_backends(driver.clone());
    if config.hardware.is_some() {
        let variant: HardwareVariant = config
            .backend
            .parse()
            .with_context(|| format!("Unknown backend '{}'", config.backend))?;
        let routes = match variant {
            HardwareVariant::Mpi => RouteTable::mpi(),
            HardwareVariant::V4l2 => RouteTable::empty(),
        };
        registry.register_table(&config.backend, driver.clone(), config.hardware_table()?, routes);
    }

    let device_manager = registry
        .get_or_create(&config.backend)
        .with_context(|| format!("Failed to create device manager '{}'", config.backend))?;
    device_manager.set_device_status_callback(Arc::new(|camera, status| match status {
        DeviceStatus::Error => tracing::error!("[{}] device error", camera),
        other => tracing::info!("[{}] {:?}", camera, other),
    }));
    device_manager
        .power_up(camera)
        .with_context(|| format!("Failed to power up camera {}", camera))?;

    // ---------------------------------------------------------------
    // Pipeline
    // ---------------------------------------------------------------
    let definition = load_definition(args.pipeline.as_deref().or(config.pipeline.as_deref()))?;
    let context = HalContext::new(
        Arc::new(BufferPoolRegistry::new()),
        Some(Arc::clone(&device_manager)),
    );
    let pipeline = Pipeline::build(&definition, &context, &NodeFactory::with_builtin_nodes())
        .context("Failed to build pipeline")?;

    let sinks = pipeline.sink_names();
    if sinks.is_empty() {
        return Err(anyhow!("Pipeline '{}' has no sink nodes", pipeline.name()));
    }

    let (tx, rx) = crossbeam_channel::unbounded::<(usize, FrameBuffer)>();
    for (index, sink) in sinks.iter().enumerate() {
        let tx = tx.clone();
        let callback: SinkCallback = Arc::new(move |buffer| {
            let _ = tx.send((index, buffer));
        });
        pipeline.set_sink_callback(sink, callback)?;
    }
    drop(tx);

    pipeline.pre_config(args.stream, &CameraMetadata::new())?;
    for capture_id in &args.capture {
        pipeline.capture(args.stream, *capture_id)?;
    }
    pipeline.start_recv_frame(args.stream)?;

    // ---------------------------------------------------------------
    // Stream
    // ---------------------------------------------------------------
    let started = Instant::now();
    let deadline = started + Duration::from_secs(args.timeout_secs);
    let mut received = vec![0usize; sinks.len()];
    let mut captured = 0usize;

    while received.iter().any(|count| *count < args.frames) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((index, buffer)) => {
                received[index] += 1;
                if buffer.is_valid() {
                    captured += 1;
                    tracing::info!(
                        "[{}] capture {} completed (frame {})",
                        sinks[index],
                        buffer.capture_id,
                        buffer.frame_number
                    );
                } else {
                    tracing::trace!("[{}] frame {} dropped", sinks[index], buffer.frame_number);
                }
            }
            Err(_) => {
                tracing::warn!("[camhal-runtime] timed out after {}s", args.timeout_secs);
                break;
            }
        }
    }

    // ---------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------
    let stop_result = pipeline.stop_recv_frame(args.stream);
    drop(pipeline);
    let power_result = device_manager.power_down(camera);

    let elapsed = started.elapsed().as_secs_f64();
    for (sink, count) in sinks.iter().zip(&received) {
        tracing::info!(
            "[{}] {} frames in {:.2}s ({:.1} fps)",
            sink,
            count,
            elapsed,
            *count as f64 / elapsed.max(f64::EPSILON)
        );
    }
    tracing::info!(
        "[camhal-runtime] {} of {} requested captures completed",
        captured,
        args.capture.len()
    );

    stop_result.context("Failed to stop stream")?;
    power_result.context("Failed to power down camera")?;
    Ok(())
}

fn load_definition(path: Option<&Path>) -> Result<PipelineDefinition> {
    match path {
        Some(path) => PipelineDefinition::load(path)
            .with_context(|| format!("Failed to load pipeline {}", path.display())),
        None => {
            tracing::debug!("[camhal-runtime] using built-in preview pipeline");
            PipelineDefinition::from_yaml_str(DEFAULT_PIPELINE)
                .context("Built-in pipeline is invalid")
        }
    }
}
