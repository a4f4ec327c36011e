//! Mock camera driver for hardware-free development and testing
//!
//! Simulates the capture pipeline of a global-shutter greyscale sensor:
//!
//! 1. `setup_capture` arms one capture slot
//! 2. `trigger_capture` consumes the armed slot and starts an exposure
//! 3. after a short readout latency the frame can be read out
//!
//! A trigger without an armed slot is ignored, like a trigger pulse hitting a
//! sensor with no buffer set up. Frames are a horizontal gradient scrolled by
//! frame number with additive per-pixel noise, so consecutive frames are
//! distinguishable by eye in a viewer.

use super::{CameraDriver, CaptureRead, Frame};
use crate::config::CameraConfig;
use crate::error::Result;
use crate::protocol::PIX_FMT_GREY;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

/// Simulated readout latency per capture
const READOUT_LATENCY: Duration = Duration::from_micros(500);

/// Divisor applied to the exposure time when simulating capture latency,
/// so long exposures do not slow tests to sensor speed
const EXPOSURE_SPEEDUP: u64 = 100;

/// Captures in flight at most (double buffering)
const PIPELINE_DEPTH: usize = 2;

/// Mock camera with a simulated capture pipeline
pub struct MockCamera {
    width: u32,
    height: u32,
    exposure_us: u32,
    /// One capture slot armed by `setup_capture`
    armed: bool,
    ext_trigger: bool,
    /// Completion instants of captures in flight
    pending: VecDeque<Instant>,
    frame_nr: u64,
    rng: StdRng,
}

impl MockCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            exposure_us: config.exposure_us,
            armed: false,
            ext_trigger: false,
            pending: VecDeque::new(),
            frame_nr: 0,
            rng: StdRng::seed_from_u64(0x5EED),
        }
    }

    /// Whether the external trigger line is currently enabled
    pub fn external_trigger_enabled(&self) -> bool {
        self.ext_trigger
    }

    fn capture_latency(&self) -> Duration {
        READOUT_LATENCY + Duration::from_micros(u64::from(self.exposure_us) / EXPOSURE_SPEEDUP)
    }

    fn render_frame(&mut self) -> Frame {
        self.frame_nr += 1;
        let mut data = vec![0u8; (self.width * self.height) as usize];
        for (i, px) in data.iter_mut().enumerate() {
            let x = i as u64 % u64::from(self.width);
            let base = ((x + self.frame_nr * 4) % 256) as u8;
            let noise: i16 = self.rng.gen_range(-6..=6);
            *px = (i16::from(base) + noise).clamp(0, 255) as u8;
        }
        Frame {
            width: self.width,
            height: self.height,
            pix_fmt: PIX_FMT_GREY,
            data,
        }
    }
}

impl CameraDriver for MockCamera {
    fn setup_capture(&mut self) -> Result<()> {
        self.armed = true;
        Ok(())
    }

    fn trigger_capture(&mut self) -> Result<()> {
        if self.armed && self.pending.len() < PIPELINE_DEPTH {
            self.armed = false;
            self.pending.push_back(Instant::now() + self.capture_latency());
        }
        Ok(())
    }

    fn read_captured_frame(&mut self, timeout: Duration) -> Result<CaptureRead> {
        let Some(&ready_at) = self.pending.front() else {
            if self.armed {
                // Armed but never triggered: a capture is pending its trigger
                thread::sleep(timeout);
                return Ok(CaptureRead::Timeout);
            }
            return Ok(CaptureRead::NoCapturePending);
        };

        let now = Instant::now();
        if ready_at > now {
            let remaining = ready_at - now;
            if remaining > timeout {
                thread::sleep(timeout);
                return Ok(CaptureRead::Timeout);
            }
            thread::sleep(remaining);
        }
        self.pending.pop_front();
        Ok(CaptureRead::Frame(self.render_frame()))
    }

    fn set_shutter_exposure(&mut self, exposure_us: u32) -> Result<()> {
        if exposure_us == 0 {
            return Err(crate::error::Error::InvalidParameter(
                "Exposure time must be non-zero".to_string(),
            ));
        }
        self.exposure_us = exposure_us;
        Ok(())
    }

    fn set_external_trigger_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ext_trigger = enabled;
        Ok(())
    }
}
