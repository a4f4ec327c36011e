//! Hierarchical capture-control state machine
//!
//! States nest as:
//!
//! ```text
//! Top
//! ├── Idle                 (initial)
//! └── Capture              (abstract; arms the pipeline, drains on exit)
//!     ├── Internal         (software self-triggering)
//!     └── External         (hardware trigger line)
//! ```
//!
//! Events are offered to the innermost active state first; a handler that
//! defers passes the event to its parent, and events deferred past `Top` are
//! dropped. Transitions run exit hooks from the source state up to (but not
//! including) the least common ancestor, then entry hooks down to the target,
//! so nested-state semantics are preserved.

mod mainstate;

pub use mainstate::MainState;

use crate::camera::Frame;

/// States of the capture machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    /// Non-visible root
    Top,
    Idle,
    /// Abstract parent of the two acquiring states
    Capture,
    Internal,
    External,
}

impl StateId {
    /// Parent in the state hierarchy
    pub fn parent(self) -> Option<StateId> {
        match self {
            StateId::Top => None,
            StateId::Idle | StateId::Capture => Some(StateId::Top),
            StateId::Internal | StateId::External => Some(StateId::Capture),
        }
    }

    /// Path from the root to this state, inclusive
    pub(crate) fn path(self) -> &'static [StateId] {
        match self {
            StateId::Top => &[StateId::Top],
            StateId::Idle => &[StateId::Top, StateId::Idle],
            StateId::Capture => &[StateId::Top, StateId::Capture],
            StateId::Internal => &[StateId::Top, StateId::Capture, StateId::Internal],
            StateId::External => &[StateId::Top, StateId::Capture, StateId::External],
        }
    }
}

/// How a state handler disposed of an event
#[derive(Debug)]
pub enum Reaction {
    /// Event consumed
    Handled,
    /// Offer the event to the parent state
    Deferred,
    /// Event consumed, change the active state
    Transition(StateId),
}

/// Per-request result threaded back to the command dispatcher.
///
/// Starts `Pending`, set by whichever handler consumes the triggering event,
/// and consumed immediately to build the reply status; never persisted past
/// one command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Pending,
    Acknowledged,
    Rejected,
}

/// Events fed to the state machine
#[derive(Debug)]
pub enum MainEvent<'a> {
    /// A captured frame, handled before the next capture is set up
    FrameSeq(&'a Frame),
    /// Hook for work that may overlap the next capture
    FramePar,
    /// Self-trigger tick from the control loop
    Trigger,
    /// Host requested idle mode
    GoIdle,
    /// Host requested acquisition mode
    GoAcquire,
    /// Host selected the internal (software) trigger source
    UseInternalTrigger,
    /// Host selected the external (hardware) trigger source
    UseExternalTrigger,
}
