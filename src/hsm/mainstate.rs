//! Capture-control state handlers
//!
//! Idle accepts mode and trigger-source changes; the Capture states own the
//! armed pipeline and push completed frames to the feed client. Register
//! writes arrive through [`MainState::apply_register`], which translates
//! acquisition and trigger registers into events and applies everything else
//! immediately, so every write produces a uniform [`RequestOutcome`].

use super::{MainEvent, Reaction, RequestOutcome, StateId};
use crate::camera::{CaptureRead, Frame, TriggerMode};
use crate::comm::Channel;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::protocol::{
    FeedHeader, MsgHeader, FEED_HEADER_SIZE, HEADER_SIZE, MSG_FEED_DATA, STATUS_FEED,
};
use crate::registers::{REG_ACQUISITION_MODE, REG_EXPOSURE_TIME, REG_TRIGGER_MODE};
use std::thread;
use std::time::Duration;

/// Attempts before a capture drain is declared stuck
const DRAIN_MAX_ATTEMPTS: usize = 64;

/// Poll timeout for each drain attempt
const DRAIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Pause after a frame while idle; triggering again right away would violate
/// the vertical blank time of the sensor
const VERTICAL_BLANK_PAUSE: Duration = Duration::from_millis(1);

/// The capture-control state machine
pub struct MainState {
    state: StateId,
}

impl MainState {
    pub fn new() -> Self {
        Self {
            state: StateId::Top,
        }
    }

    /// Current (innermost) active state
    pub fn state(&self) -> StateId {
        self.state
    }

    /// Enter the initial state
    pub fn start(&mut self, ctx: &mut Context) {
        self.enter(ctx, StateId::Idle);
        self.state = StateId::Idle;
    }

    /// Dispatch one event.
    ///
    /// The returned outcome is meaningful for command events (`GoIdle`,
    /// `GoAcquire`, trigger-source selection) and stays `Pending` for events
    /// no handler claims.
    pub fn dispatch(&mut self, ctx: &mut Context, event: &MainEvent) -> RequestOutcome {
        let mut outcome = RequestOutcome::Pending;
        let mut state = self.state;
        loop {
            let reaction = match state {
                // Events falling through the root are dropped
                StateId::Top => Reaction::Deferred,
                StateId::Idle => self.on_idle(ctx, event, &mut outcome),
                StateId::Capture => self.on_capture(ctx, event, &mut outcome),
                StateId::Internal => self.on_internal(ctx, event),
                StateId::External => self.on_external(ctx, event),
            };
            match reaction {
                Reaction::Handled => break,
                Reaction::Transition(target) => {
                    self.transition(ctx, target);
                    break;
                }
                Reaction::Deferred => match state.parent() {
                    Some(parent) => state = parent,
                    None => break,
                },
            }
        }
        outcome
    }

    /// Apply one `{id, value}` register write.
    ///
    /// Acquisition and trigger registers are translated into state-machine
    /// events; the exposure register applies immediately regardless of state.
    /// The register file is updated once the write is acknowledged.
    pub fn apply_register(&mut self, ctx: &mut Context, id: u32, value: u32) -> RequestOutcome {
        let outcome = match id {
            REG_ACQUISITION_MODE => match value {
                0 => self.dispatch(ctx, &MainEvent::GoIdle),
                1 => self.dispatch(ctx, &MainEvent::GoAcquire),
                _ => {
                    log::warn!("Invalid acquisition mode ({})", value);
                    RequestOutcome::Rejected
                }
            },
            REG_TRIGGER_MODE => match value {
                0 => self.dispatch(ctx, &MainEvent::UseInternalTrigger),
                1 => self.dispatch(ctx, &MainEvent::UseExternalTrigger),
                _ => {
                    log::warn!("Invalid trigger mode ({})", value);
                    RequestOutcome::Rejected
                }
            },
            REG_EXPOSURE_TIME => apply_exposure(ctx, value),
            _ => {
                log::warn!("Write to invalid register ({:#x})", id);
                RequestOutcome::Rejected
            }
        };

        match outcome {
            RequestOutcome::Acknowledged => {
                ctx.registers.set(id, value);
                RequestOutcome::Acknowledged
            }
            RequestOutcome::Rejected => RequestOutcome::Rejected,
            RequestOutcome::Pending => {
                log::error!("Change of register {} was not handled by the state machine", id);
                RequestOutcome::Rejected
            }
        }
    }

    fn on_idle(
        &mut self,
        ctx: &mut Context,
        event: &MainEvent,
        outcome: &mut RequestOutcome,
    ) -> Reaction {
        match event {
            MainEvent::FrameSeq(_) => {
                thread::sleep(VERTICAL_BLANK_PAUSE);
                Reaction::Handled
            }
            MainEvent::FramePar => Reaction::Handled,
            MainEvent::GoIdle => {
                *outcome = RequestOutcome::Acknowledged;
                Reaction::Handled
            }
            MainEvent::GoAcquire => {
                *outcome = RequestOutcome::Acknowledged;
                match ctx.trigger_mode {
                    TriggerMode::Internal => Reaction::Transition(StateId::Internal),
                    TriggerMode::External => Reaction::Transition(StateId::External),
                }
            }
            MainEvent::UseInternalTrigger => {
                ctx.trigger_mode = TriggerMode::Internal;
                *outcome = RequestOutcome::Acknowledged;
                Reaction::Handled
            }
            MainEvent::UseExternalTrigger => {
                ctx.trigger_mode = TriggerMode::External;
                *outcome = RequestOutcome::Acknowledged;
                Reaction::Handled
            }
            MainEvent::Trigger => Reaction::Deferred,
        }
    }

    fn on_capture(
        &mut self,
        ctx: &mut Context,
        event: &MainEvent,
        outcome: &mut RequestOutcome,
    ) -> Reaction {
        match event {
            MainEvent::FrameSeq(frame) => {
                self.send_feed_frame(ctx, frame);
                Reaction::Handled
            }
            // Hook for processing that may overlap the next capture
            MainEvent::FramePar => Reaction::Handled,
            MainEvent::GoIdle => match drain(ctx) {
                Ok(()) => {
                    *outcome = RequestOutcome::Acknowledged;
                    Reaction::Transition(StateId::Idle)
                }
                Err(e) => {
                    log::error!("Staying in capture mode, drain failed: {}", e);
                    *outcome = RequestOutcome::Rejected;
                    Reaction::Handled
                }
            },
            MainEvent::GoAcquire => {
                *outcome = RequestOutcome::Acknowledged;
                Reaction::Handled
            }
            MainEvent::UseInternalTrigger | MainEvent::UseExternalTrigger => {
                // Trigger source is only mutable from idle
                *outcome = RequestOutcome::Rejected;
                Reaction::Handled
            }
            MainEvent::Trigger => Reaction::Deferred,
        }
    }

    fn on_internal(&mut self, ctx: &mut Context, event: &MainEvent) -> Reaction {
        match event {
            MainEvent::Trigger => {
                self_trigger(ctx);
                Reaction::Handled
            }
            _ => Reaction::Deferred,
        }
    }

    fn on_external(&mut self, _ctx: &mut Context, _event: &MainEvent) -> Reaction {
        Reaction::Deferred
    }

    /// Push one captured frame to the feed client.
    ///
    /// The sequence number advances per produced frame; the feed itself is
    /// lossy best-effort, so a failed send only drops the client.
    fn send_feed_frame(&mut self, ctx: &mut Context, frame: &Frame) {
        ctx.feed_seq += 1;
        let feed = FeedHeader {
            seq_nr: ctx.feed_seq,
            time_stamp: ctx.uptime_ms(),
            img_width: frame.width,
            img_height: frame.height,
            pix_fmt: frame.pix_fmt,
        };
        let body_len = (FEED_HEADER_SIZE + frame.data.len()) as u32;
        let header = MsgHeader::new(MSG_FEED_DATA, ctx.feed_seq, STATUS_FEED, body_len);

        let mut buf = Vec::with_capacity(HEADER_SIZE + FEED_HEADER_SIZE);
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(&feed.encode());

        let sent = ctx
            .comm
            .send(Channel::Feed, &buf)
            .and_then(|_| ctx.comm.send(Channel::Feed, &frame.data));
        match sent {
            Ok(_) => {}
            Err(Error::NotConnected) => {
                log::debug!("No feed client, frame {} dropped", ctx.feed_seq)
            }
            Err(e) => log::warn!("Feed send failed: {}", e),
        }
    }

    fn transition(&mut self, ctx: &mut Context, target: StateId) {
        let src_path = self.state.path();
        let dst_path = target.path();
        let common = src_path
            .iter()
            .zip(dst_path.iter())
            .take_while(|(a, b)| a == b)
            .count();
        for state in src_path[common..].iter().rev() {
            self.exit(ctx, *state);
        }
        for state in &dst_path[common..] {
            self.enter(ctx, *state);
        }
        self.state = target;
    }

    fn enter(&mut self, ctx: &mut Context, state: StateId) {
        match state {
            StateId::Idle => log::info!("Enter idle mode"),
            StateId::Capture => {
                log::info!("Enter capture mode");
                if let Err(e) = ctx.camera.setup_capture() {
                    log::error!("Unable to setup initial capture: {}", e);
                }
            }
            StateId::Internal => {
                log::info!("Enter internal capture mode");
                self_trigger(ctx);
            }
            StateId::External => {
                log::info!("Enter external capture mode");
                if let Err(e) = ctx.camera.set_external_trigger_enabled(true) {
                    log::error!("Unable to enable external trigger: {}", e);
                }
            }
            StateId::Top => {}
        }
    }

    fn exit(&mut self, ctx: &mut Context, state: StateId) {
        match state {
            StateId::Capture => {
                // Idle must only be entered with zero captures outstanding
                if let Err(e) = drain(ctx) {
                    log::error!("Drain on capture exit failed: {}", e);
                }
            }
            StateId::External => {
                if let Err(e) = ctx.camera.set_external_trigger_enabled(false) {
                    log::error!("Unable to disable external trigger: {}", e);
                }
            }
            _ => {}
        }
    }
}

impl Default for MainState {
    fn default() -> Self {
        Self::new()
    }
}

/// Software-trigger one capture, logging failures
fn self_trigger(ctx: &mut Context) {
    if let Err(e) = ctx.camera.trigger_capture() {
        log::error!("Unable to trigger capture: {}", e);
    }
}

/// Flush the capture pipeline until the camera reports nothing pending.
///
/// Self-triggers each attempt so an armed-but-untriggered capture cannot
/// stall the flush. Bounded so a collaborator that never reports an empty
/// pipeline cannot hang the device.
fn drain(ctx: &mut Context) -> Result<()> {
    for _ in 0..DRAIN_MAX_ATTEMPTS {
        self_trigger(ctx);
        match ctx.camera.read_captured_frame(DRAIN_POLL_TIMEOUT)? {
            CaptureRead::NoCapturePending => return Ok(()),
            CaptureRead::Frame(_) => log::debug!("Removed stale frame from queue"),
            CaptureRead::Timeout => {}
        }
    }
    Err(Error::DrainNotConverged(DRAIN_MAX_ATTEMPTS))
}

/// Apply and persist a new exposure time [us]
fn apply_exposure(ctx: &mut Context, exposure_us: u32) -> RequestOutcome {
    if let Err(e) = ctx.camera.set_shutter_exposure(exposure_us) {
        log::error!("Failed to modify exposure time: {}", e);
        return RequestOutcome::Rejected;
    }
    if let Err(e) = ctx.store_exposure(exposure_us) {
        log::error!("Failed to store exposure time to configuration: {}", e);
        return RequestOutcome::Rejected;
    }
    log::info!("Exposure time stored and applied to {} us", exposure_us);
    RequestOutcome::Acknowledged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommServer;
    use crate::config::AppConfig;
    use crate::protocol::PIX_FMT_GREY;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct CamStats {
        setups: usize,
        triggers: usize,
        exposures: Vec<u32>,
        ext_trigger: Vec<bool>,
    }

    /// Scripted camera: `reads` are returned in order; once exhausted the
    /// camera reports NoCapturePending, or Timeout forever when `stuck`.
    struct TestCamera {
        stats: Rc<RefCell<CamStats>>,
        reads: VecDeque<CaptureRead>,
        stuck: bool,
    }

    impl crate::camera::CameraDriver for TestCamera {
        fn setup_capture(&mut self) -> Result<()> {
            self.stats.borrow_mut().setups += 1;
            Ok(())
        }

        fn trigger_capture(&mut self) -> Result<()> {
            self.stats.borrow_mut().triggers += 1;
            Ok(())
        }

        fn read_captured_frame(&mut self, _timeout: Duration) -> Result<CaptureRead> {
            if let Some(read) = self.reads.pop_front() {
                return Ok(read);
            }
            Ok(if self.stuck {
                CaptureRead::Timeout
            } else {
                CaptureRead::NoCapturePending
            })
        }

        fn set_shutter_exposure(&mut self, exposure_us: u32) -> Result<()> {
            if exposure_us == 0 {
                return Err(Error::InvalidParameter("zero exposure".to_string()));
            }
            self.stats.borrow_mut().exposures.push(exposure_us);
            Ok(())
        }

        fn set_external_trigger_enabled(&mut self, enabled: bool) -> Result<()> {
            self.stats.borrow_mut().ext_trigger.push(enabled);
            Ok(())
        }
    }

    fn test_context(reads: Vec<CaptureRead>, stuck: bool) -> (Context, Rc<RefCell<CamStats>>) {
        let stats = Rc::new(RefCell::new(CamStats::default()));
        let camera = TestCamera {
            stats: Rc::clone(&stats),
            reads: reads.into(),
            stuck,
        };
        let ctx = Context::new(
            AppConfig::default(),
            None,
            CommServer::unbound(),
            Box::new(camera),
        );
        (ctx, stats)
    }

    fn started(reads: Vec<CaptureRead>, stuck: bool) -> (MainState, Context, Rc<RefCell<CamStats>>) {
        let (mut ctx, stats) = test_context(reads, stuck);
        let mut hsm = MainState::new();
        hsm.start(&mut ctx);
        (hsm, ctx, stats)
    }

    fn frame() -> Frame {
        Frame {
            width: 4,
            height: 2,
            pix_fmt: PIX_FMT_GREY,
            data: vec![0u8; 8],
        }
    }

    #[test]
    fn test_starts_idle() {
        let (hsm, _ctx, _stats) = started(vec![], false);
        assert_eq!(hsm.state(), StateId::Idle);
    }

    #[test]
    fn test_acquire_internal_triggers_at_least_once() {
        let (mut hsm, mut ctx, stats) = started(vec![], false);
        let outcome = hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        assert_eq!(outcome, RequestOutcome::Acknowledged);
        assert_eq!(hsm.state(), StateId::Internal);
        assert!(stats.borrow().setups >= 1);
        assert!(stats.borrow().triggers >= 1);
    }

    #[test]
    fn test_acquire_external_switches_trigger_line() {
        let (mut hsm, mut ctx, stats) = started(vec![], false);
        assert_eq!(
            hsm.dispatch(&mut ctx, &MainEvent::UseExternalTrigger),
            RequestOutcome::Acknowledged
        );
        assert_eq!(ctx.trigger_mode, TriggerMode::External);

        let outcome = hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        assert_eq!(outcome, RequestOutcome::Acknowledged);
        assert_eq!(hsm.state(), StateId::External);
        assert_eq!(stats.borrow().ext_trigger, vec![true]);

        // Leaving external capture releases the trigger line again
        assert_eq!(
            hsm.dispatch(&mut ctx, &MainEvent::GoIdle),
            RequestOutcome::Acknowledged
        );
        assert_eq!(hsm.state(), StateId::Idle);
        assert_eq!(stats.borrow().ext_trigger, vec![true, false]);
    }

    #[test]
    fn test_trigger_mode_locked_while_capturing() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        assert_eq!(hsm.state(), StateId::Internal);

        let outcome = hsm.dispatch(&mut ctx, &MainEvent::UseExternalTrigger);
        assert_eq!(outcome, RequestOutcome::Rejected);
        assert_eq!(ctx.trigger_mode, TriggerMode::Internal);
        assert_eq!(hsm.state(), StateId::Internal);
    }

    #[test]
    fn test_acquire_while_capturing_is_acknowledged_noop() {
        let (mut hsm, mut ctx, stats) = started(vec![], false);
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        let setups = stats.borrow().setups;

        let outcome = hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        assert_eq!(outcome, RequestOutcome::Acknowledged);
        assert_eq!(hsm.state(), StateId::Internal);
        // The pipeline is not re-armed; nothing was entered again
        assert_eq!(stats.borrow().setups, setups);
    }

    #[test]
    fn test_go_idle_drains_before_transition() {
        // Two stale captures are flushed before the pipeline reports empty
        let (mut hsm, mut ctx, stats) = started(
            vec![
                CaptureRead::Frame(frame()),
                CaptureRead::Frame(frame()),
                CaptureRead::NoCapturePending,
            ],
            false,
        );
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        let triggers_before = stats.borrow().triggers;

        let outcome = hsm.dispatch(&mut ctx, &MainEvent::GoIdle);
        assert_eq!(outcome, RequestOutcome::Acknowledged);
        assert_eq!(hsm.state(), StateId::Idle);
        // Drain self-triggered at least once per flushed capture
        assert!(stats.borrow().triggers > triggers_before);
    }

    #[test]
    fn test_go_idle_rejected_when_drain_stuck() {
        let (mut hsm, mut ctx, _stats) = started(vec![], true);
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);

        let outcome = hsm.dispatch(&mut ctx, &MainEvent::GoIdle);
        assert_eq!(outcome, RequestOutcome::Rejected);
        assert_eq!(hsm.state(), StateId::Internal);
    }

    #[test]
    fn test_go_idle_in_idle_is_acknowledged() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        assert_eq!(
            hsm.dispatch(&mut ctx, &MainEvent::GoIdle),
            RequestOutcome::Acknowledged
        );
        assert_eq!(hsm.state(), StateId::Idle);
    }

    #[test]
    fn test_feed_seq_advances_per_frame() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);

        let f = frame();
        hsm.dispatch(&mut ctx, &MainEvent::FrameSeq(&f));
        hsm.dispatch(&mut ctx, &MainEvent::FrameSeq(&f));
        assert_eq!(ctx.feed_seq, 2);
    }

    #[test]
    fn test_trigger_tick_self_triggers_only_internal() {
        let (mut hsm, mut ctx, stats) = started(vec![], false);
        hsm.dispatch(&mut ctx, &MainEvent::GoAcquire);
        let triggers = stats.borrow().triggers;
        hsm.dispatch(&mut ctx, &MainEvent::Trigger);
        assert_eq!(stats.borrow().triggers, triggers + 1);

        hsm.dispatch(&mut ctx, &MainEvent::GoIdle);
        let triggers = stats.borrow().triggers;
        // Idle defers the tick to Top where it is dropped
        hsm.dispatch(&mut ctx, &MainEvent::Trigger);
        assert_eq!(stats.borrow().triggers, triggers);
    }

    #[test]
    fn test_exposure_register_applies_and_updates_table() {
        let (mut hsm, mut ctx, stats) = started(vec![], false);
        let outcome = hsm.apply_register(&mut ctx, REG_EXPOSURE_TIME, 20_000);
        assert_eq!(outcome, RequestOutcome::Acknowledged);
        assert_eq!(stats.borrow().exposures, vec![20_000]);
        assert_eq!(ctx.registers.get(REG_EXPOSURE_TIME), Some(20_000));
    }

    #[test]
    fn test_exposure_register_rejected_on_camera_error() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        let outcome = hsm.apply_register(&mut ctx, REG_EXPOSURE_TIME, 0);
        assert_eq!(outcome, RequestOutcome::Rejected);
        // Table keeps the previous value
        assert_eq!(
            ctx.registers.get(REG_EXPOSURE_TIME),
            Some(ctx.config.camera.exposure_us)
        );
    }

    #[test]
    fn test_acquisition_register_drives_state() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        assert_eq!(
            hsm.apply_register(&mut ctx, REG_ACQUISITION_MODE, 1),
            RequestOutcome::Acknowledged
        );
        assert_eq!(hsm.state(), StateId::Internal);
        assert_eq!(ctx.registers.get(REG_ACQUISITION_MODE), Some(1));

        assert_eq!(
            hsm.apply_register(&mut ctx, REG_ACQUISITION_MODE, 0),
            RequestOutcome::Acknowledged
        );
        assert_eq!(hsm.state(), StateId::Idle);
        assert_eq!(ctx.registers.get(REG_ACQUISITION_MODE), Some(0));
    }

    #[test]
    fn test_invalid_register_values_rejected() {
        let (mut hsm, mut ctx, _stats) = started(vec![], false);
        assert_eq!(
            hsm.apply_register(&mut ctx, REG_ACQUISITION_MODE, 7),
            RequestOutcome::Rejected
        );
        assert_eq!(
            hsm.apply_register(&mut ctx, REG_TRIGGER_MODE, 2),
            RequestOutcome::Rejected
        );
        assert_eq!(
            hsm.apply_register(&mut ctx, 0xDEAD, 1),
            RequestOutcome::Rejected
        );
        assert_eq!(hsm.state(), StateId::Idle);
    }
}
