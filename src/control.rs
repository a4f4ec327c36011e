//! Cooperative control loop
//!
//! Single-threaded scheduler alternating three bounded polls per iteration:
//!
//! 1. Accept pending connections on the command and feed ports
//! 2. Receive and fully handle at most one command message
//! 3. Poll the camera for one completed frame, then deliver the frame,
//!    self-trigger and overlap events to the state machine
//!
//! All mutation of the register file, connection state and capture state
//! happens on this thread; introducing additional threads would require
//! explicit synchronization around those structures.

use crate::camera::CaptureRead;
use crate::context::Context;
use crate::dispatch;
use crate::error::Error;
use crate::hsm::{MainEvent, MainState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Bounded wait for new connections per iteration
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(10);

/// Bounded wait for an inbound command per iteration
const COMMAND_TIMEOUT: Duration = Duration::from_millis(5);

/// Bounded wait for a completed frame; short to keep loop latency low
const CAMERA_TIMEOUT: Duration = Duration::from_millis(1);

/// The cooperative scheduler driving communication and capture
pub struct ControlLoop {
    ctx: Context,
    hsm: MainState,
    /// Reusable command body buffer
    body_buf: Vec<u8>,
}

impl ControlLoop {
    /// Create the loop and enter the idle state
    pub fn new(ctx: Context) -> Self {
        let mut this = Self {
            ctx,
            hsm: MainState::new(),
            body_buf: Vec::new(),
        };
        this.hsm.start(&mut this.ctx);
        this
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Run until the shutdown flag clears
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) {
            self.step();
        }
        // Flush the pipeline so the sensor is quiet before teardown
        self.hsm.dispatch(&mut self.ctx, &MainEvent::GoIdle);
    }

    /// One scheduler iteration: accept, command, frame
    pub fn step(&mut self) {
        if let Err(e) = self.ctx.comm.accept_pending(ACCEPT_TIMEOUT) {
            log::error!("Error accepting new connections: {}", e);
        }

        self.poll_command();
        self.poll_camera();
    }

    fn poll_command(&mut self) {
        match self
            .ctx
            .comm
            .receive_command(COMMAND_TIMEOUT, &mut self.body_buf)
        {
            Ok(Some(header)) => {
                log::info!(
                    "Command received (type {}, ident {})",
                    header.msg_type,
                    header.ident
                );
                if let Err(e) =
                    dispatch::handle_message(&mut self.ctx, &mut self.hsm, &header, &self.body_buf)
                {
                    log::warn!("Error handling command: {}", e);
                }
            }
            Ok(None) => {}
            // No command client attached; demotion was already logged
            Err(Error::NotConnected) | Err(Error::ConnectionClosed) => {}
            Err(e) => log::warn!("Command channel error: {}", e),
        }
    }

    fn poll_camera(&mut self) {
        match self.ctx.camera.read_captured_frame(CAMERA_TIMEOUT) {
            Ok(CaptureRead::Frame(frame)) => {
                // Process sequentially, re-arm, then allow overlap work
                self.hsm.dispatch(&mut self.ctx, &MainEvent::FrameSeq(&frame));
                if let Err(e) = self.ctx.camera.setup_capture() {
                    log::error!("Unable to setup capture: {}", e);
                }
                self.hsm.dispatch(&mut self.ctx, &MainEvent::Trigger);
                self.hsm.dispatch(&mut self.ctx, &MainEvent::FramePar);
            }
            Ok(CaptureRead::Timeout) | Ok(CaptureRead::NoCapturePending) => {
                self.hsm.dispatch(&mut self.ctx, &MainEvent::Trigger);
            }
            Err(e) => {
                log::error!("Error reading captured frame: {}", e);
                self.hsm.dispatch(&mut self.ctx, &MainEvent::Trigger);
            }
        }
    }
}
