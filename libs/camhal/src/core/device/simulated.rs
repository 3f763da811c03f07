// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! In-process stand-in for camera hardware.
//!
//! Frames sent to a block are filled on a worker thread and handed back
//! through the block's node callback, the same way a vendor driver completes
//! buffers. Every call is counted and any call can be made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use super::driver::{HardwareDriver, StreamConfig};
use super::ids::FlashMode;
use super::routing::RouteEndpoint;
use crate::core::frames::{CameraMetadata, FrameCallback, FrameSpec, MetaTag};
use crate::core::{HalError, Result};

/// Name under which system-wide calls are counted.
const SYSTEM: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverOp {
    Init,
    PowerUp,
    PowerDown,
    Configure,
    Start,
    Stop,
    SendFrame,
    Bind,
    Unbind,
    SetAbilityTags,
    GetAbilityMetadata,
    SetFlashlight,
    StartSystem,
    StopSystem,
}

enum DriverMessage {
    Frame { hardware: String, frame: FrameSpec },
    Shutdown,
}

#[derive(Default)]
struct SimState {
    callbacks: HashMap<String, FrameCallback>,
    configs: HashMap<String, StreamConfig>,
    bindings: Vec<(RouteEndpoint, RouteEndpoint)>,
    calls: HashMap<(DriverOp, String), u32>,
    failures: HashSet<(DriverOp, String)>,
    ability: HashMap<String, CameraMetadata>,
    flash: HashMap<String, (FlashMode, bool)>,
    system_running: bool,
}

pub struct SimulatedDriver {
    state: Arc<Mutex<SimState>>,
    tx: Sender<DriverMessage>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDriver {
    /// Driver that completes frames as fast as they arrive.
    pub fn new() -> Self {
        Self::with_frame_interval(None)
    }

    /// Driver that spaces completions by `interval`.
    pub fn with_frame_interval(interval: Option<Duration>) -> Self {
        let state = Arc::new(Mutex::new(SimState::default()));
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name("simulated-driver".into())
            .spawn(move || run_frame_worker(rx, worker_state, interval))
            .map_err(|e| tracing::error!("Failed to spawn simulated driver worker: {}", e))
            .ok();
        Self {
            state,
            tx,
            worker: Mutex::new(worker),
        }
    }

    /// Make every later `op` on `hardware` fail. Use `"system"` for the
    /// system-wide calls.
    pub fn fail_on(&self, op: DriverOp, hardware: &str) {
        self.state.lock().failures.insert((op, hardware.to_string()));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// How many times `op` was attempted on `hardware`.
    pub fn call_count(&self, op: DriverOp, hardware: &str) -> u32 {
        self.state
            .lock()
            .calls
            .get(&(op, hardware.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Currently bound endpoint pairs in bind order.
    pub fn bindings(&self) -> Vec<(RouteEndpoint, RouteEndpoint)> {
        self.state.lock().bindings.clone()
    }

    pub fn set_ability_metadata(&self, hardware: &str, meta: CameraMetadata) {
        self.state.lock().ability.insert(hardware.to_string(), meta);
    }

    pub fn flashlight(&self, hardware: &str) -> Option<(FlashMode, bool)> {
        self.state.lock().flash.get(hardware).copied()
    }

    pub fn stream_config(&self, hardware: &str) -> Option<StreamConfig> {
        self.state.lock().configs.get(hardware).copied()
    }

    pub fn is_system_running(&self) -> bool {
        self.state.lock().system_running
    }

    fn record(&self, op: DriverOp, hardware: &str) -> Result<()> {
        let mut state = self.state.lock();
        *state.calls.entry((op, hardware.to_string())).or_insert(0) += 1;
        if state.failures.contains(&(op, hardware.to_string())) {
            return Err(HalError::Hardware(format!(
                "simulated {:?} failure on '{}'",
                op, hardware
            )));
        }
        Ok(())
    }
}

fn run_frame_worker(
    rx: Receiver<DriverMessage>,
    state: Arc<Mutex<SimState>>,
    interval: Option<Duration>,
) {
    let epoch = Instant::now();
    let mut frame_number: u64 = 0;
    while let Ok(message) = rx.recv() {
        let (hardware, mut frame) = match message {
            DriverMessage::Frame { hardware, frame } => (hardware, frame),
            DriverMessage::Shutdown => break,
        };
        if let Some(interval) = interval {
            std::thread::sleep(interval);
        }

        let buffer = &mut frame.buffer;
        buffer.frame_number = frame_number;
        buffer.timestamp_ns = epoch.elapsed().as_nanos() as u64;
        for (i, byte) in buffer.data_mut().iter_mut().enumerate() {
            *byte = (frame_number as usize + i) as u8;
        }
        frame_number += 1;

        // Invoke outside the lock; the callback may re-enter the driver.
        let callback = state.lock().callbacks.get(&hardware).cloned();
        match callback {
            Some(callback) => callback(frame),
            None => tracing::trace!("[{}] no node callback, frame reclaimed", hardware),
        }
    }
    tracing::debug!("simulated driver worker exiting");
}

impl HardwareDriver for SimulatedDriver {
    fn init(&self, hardware: &str) -> Result<()> {
        self.record(DriverOp::Init, hardware)
    }

    fn power_up(&self, hardware: &str) -> Result<()> {
        self.record(DriverOp::PowerUp, hardware)
    }

    fn power_down(&self, hardware: &str) -> Result<()> {
        self.record(DriverOp::PowerDown, hardware)
    }

    fn configure(&self, hardware: &str, config: &StreamConfig) -> Result<()> {
        self.record(DriverOp::Configure, hardware)?;
        self.state.lock().configs.insert(hardware.to_string(), *config);
        Ok(())
    }

    fn start(&self, hardware: &str) -> Result<()> {
        self.record(DriverOp::Start, hardware)
    }

    fn stop(&self, hardware: &str) -> Result<()> {
        self.record(DriverOp::Stop, hardware)
    }

    fn send_frame(&self, hardware: &str, frame: FrameSpec) -> Result<()> {
        self.record(DriverOp::SendFrame, hardware)?;
        self.tx
            .send(DriverMessage::Frame {
                hardware: hardware.to_string(),
                frame,
            })
            .map_err(|_| HalError::Hardware("simulated driver worker is gone".into()))
    }

    fn set_node_callback(&self, hardware: &str, callback: Option<FrameCallback>) {
        let mut state = self.state.lock();
        match callback {
            Some(callback) => {
                state.callbacks.insert(hardware.to_string(), callback);
            }
            None => {
                state.callbacks.remove(hardware);
            }
        }
    }

    fn bind(&self, src: &RouteEndpoint, dst: &RouteEndpoint) -> Result<()> {
        self.record(DriverOp::Bind, &src.to_string())?;
        self.state.lock().bindings.push((src.clone(), dst.clone()));
        Ok(())
    }

    fn unbind(&self, src: &RouteEndpoint, dst: &RouteEndpoint) -> Result<()> {
        self.record(DriverOp::Unbind, &src.to_string())?;
        self.state
            .lock()
            .bindings
            .retain(|(s, d)| !(s == src && d == dst));
        Ok(())
    }

    fn set_ability_metadata_tags(&self, hardware: &str, _tags: &[MetaTag]) -> Result<()> {
        self.record(DriverOp::SetAbilityTags, hardware)
    }

    fn get_ability_metadata(&self, hardware: &str) -> Result<CameraMetadata> {
        self.record(DriverOp::GetAbilityMetadata, hardware)?;
        Ok(self
            .state
            .lock()
            .ability
            .get(hardware)
            .cloned()
            .unwrap_or_default())
    }

    fn set_flashlight(&self, hardware: &str, mode: FlashMode, enable: bool) -> Result<()> {
        self.record(DriverOp::SetFlashlight, hardware)?;
        self.state
            .lock()
            .flash
            .insert(hardware.to_string(), (mode, enable));
        Ok(())
    }

    fn start_system(&self) -> Result<()> {
        self.record(DriverOp::StartSystem, SYSTEM)?;
        self.state.lock().system_running = true;
        Ok(())
    }

    fn stop_system(&self) -> Result<()> {
        self.record(DriverOp::StopSystem, SYSTEM)?;
        self.state.lock().system_running = false;
        Ok(())
    }
}

impl Drop for SimulatedDriver {
    fn drop(&mut self) {
        let _ = self.tx.send(DriverMessage::Shutdown);
        if let Some(handle) = self.worker.get_mut().take() {
            if handle.thread().id() == std::thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("simulated driver worker panicked");
            }
        }
    }
}
