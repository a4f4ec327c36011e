//! Shared application context
//!
//! One `Context` holds everything the command path and the capture path
//! mutate: sockets, register file, camera driver, trigger mode and feed
//! numbering. The control loop owns it and lends it to the dispatcher and the
//! state machine for the duration of a single call; all mutation therefore
//! happens on the control thread.

use crate::camera::{CameraDriver, TriggerMode};
use crate::comm::CommServer;
use crate::config::AppConfig;
use crate::error::Result;
use crate::registers::RegisterFile;
use std::path::PathBuf;
use std::time::Instant;

pub struct Context {
    pub config: AppConfig,
    /// Where the configuration is persisted; None disables persistence
    pub config_path: Option<PathBuf>,
    pub comm: CommServer,
    pub registers: RegisterFile,
    pub camera: Box<dyn CameraDriver>,
    /// Configured capture trigger source; mutable only while idle
    pub trigger_mode: TriggerMode,
    /// Sequence number of the last feed frame sent; numbering starts at 1
    pub feed_seq: u32,
    started: Instant,
}

impl Context {
    pub fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        comm: CommServer,
        camera: Box<dyn CameraDriver>,
    ) -> Self {
        let registers = RegisterFile::new(config.camera.exposure_us);
        Self {
            config,
            config_path,
            comm,
            registers,
            camera,
            trigger_mode: TriggerMode::Internal,
            feed_seq: 0,
            started: Instant::now(),
        }
    }

    /// Milliseconds since the daemon started (feed timestamp base)
    pub fn uptime_ms(&self) -> u32 {
        self.started.elapsed().as_millis() as u32
    }

    /// Persist a new exposure time into the configuration file
    pub fn store_exposure(&mut self, exposure_us: u32) -> Result<()> {
        self.config.camera.exposure_us = exposure_us;
        if let Some(path) = &self.config_path {
            self.config.to_file(path)?;
        }
        Ok(())
    }
}
