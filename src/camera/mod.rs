//! Camera capture drivers
//!
//! The control core talks to capture hardware through the [`CameraDriver`]
//! trait only: arm the pipeline, trigger a capture, poll for a completed
//! frame, apply exposure, switch the external trigger line. Real sensor
//! drivers live out of tree; the in-tree [`mock`] driver simulates the
//! pipeline for development and tests.

pub mod mock;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use mock::MockCamera;
use std::time::Duration;

/// Configured capture trigger source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    /// Software-initiated capture requests
    Internal,
    /// Hardware trigger line
    External,
}

/// One captured frame
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Pixel format fourcc (see [`crate::protocol::fourcc`])
    pub pix_fmt: u32,
    pub data: Vec<u8>,
}

/// Outcome of polling for a completed capture
#[derive(Debug)]
pub enum CaptureRead {
    /// A capture completed and was read out
    Frame(Frame),
    /// A capture is outstanding but did not finish within the timeout
    Timeout,
    /// No capture has been started
    NoCapturePending,
}

/// Camera driver trait for capture hardware abstraction
pub trait CameraDriver {
    /// Arm the capture pipeline so the next trigger produces a frame
    fn setup_capture(&mut self) -> Result<()>;

    /// Software-trigger one capture; a trigger with nothing armed is ignored
    fn trigger_capture(&mut self) -> Result<()>;

    /// Poll for a completed frame, waiting up to `timeout`
    fn read_captured_frame(&mut self, timeout: Duration) -> Result<CaptureRead>;

    /// Apply the shutter exposure time [us]
    fn set_shutter_exposure(&mut self, exposure_us: u32) -> Result<()>;

    /// Enable or disable the external hardware trigger line
    fn set_external_trigger_enabled(&mut self, enabled: bool) -> Result<()>;
}

/// Create a camera driver based on configuration
pub fn create_camera(config: &AppConfig) -> Result<Box<dyn CameraDriver>> {
    match config.camera.device_type.as_str() {
        "mock" => Ok(Box::new(MockCamera::new(&config.camera))),
        other => Err(Error::UnknownDevice(other.to_string())),
    }
}
