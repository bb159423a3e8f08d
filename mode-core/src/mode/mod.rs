//! Mode identifiers, lifecycle phases, and the per-mode state machine.
//!
//! A mode is one independently-progressing activity owned by a
//! [`Scheduler`](crate::Scheduler). Its lifecycle only moves forward:
//! `Begin → Running → End`, with `Discard` reserved for immediate removal.
//! Handlers report an [`Outcome`] for every phase they are invoked with and the
//! scheduler turns it into the phase requested for the following tick.

use core::fmt;
use core::time::Duration;

use crate::scheduler::ModeContext;

/// Process-unique identifier of a mode registered with a scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ModeId(u32);

impl ModeId {
    /// First identifier handed out to dynamically registered modes.
    pub const FIRST_USER: ModeId = ModeId(16);

    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns `true` when the identifier belongs to a [`ReservedMode`].
    #[must_use]
    pub const fn is_reserved(self) -> bool {
        ReservedMode::from_id(self).is_some()
    }
}

impl fmt::Display for ModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ReservedMode::from_id(*self) {
            Some(reserved) => f.write_str(reserved.name()),
            None => write!(f, "mode#{}", self.0),
        }
    }
}

/// Number of [`ReservedMode`] variants.
pub const RESERVED_MODE_COUNT: usize = 5;

/// Built-in control modes present in every scheduler.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReservedMode {
    Start,
    Pause,
    Exit,
    Reset,
    Reboot,
}

impl ReservedMode {
    /// Every reserved mode in identifier order.
    pub const ALL: [ReservedMode; RESERVED_MODE_COUNT] = [
        ReservedMode::Start,
        ReservedMode::Pause,
        ReservedMode::Exit,
        ReservedMode::Reset,
        ReservedMode::Reboot,
    ];

    /// Fixed identifier of the reserved mode.
    #[must_use]
    pub const fn id(self) -> ModeId {
        match self {
            ReservedMode::Start => ModeId(1),
            ReservedMode::Pause => ModeId(2),
            ReservedMode::Exit => ModeId(3),
            ReservedMode::Reset => ModeId(4),
            ReservedMode::Reboot => ModeId(5),
        }
    }

    /// Attempts to map an identifier back to a reserved mode.
    #[must_use]
    pub const fn from_id(id: ModeId) -> Option<Self> {
        match id.0 {
            1 => Some(ReservedMode::Start),
            2 => Some(ReservedMode::Pause),
            3 => Some(ReservedMode::Exit),
            4 => Some(ReservedMode::Reset),
            5 => Some(ReservedMode::Reboot),
            _ => None,
        }
    }

    /// Lower-case name used by consoles and logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ReservedMode::Start => "start",
            ReservedMode::Pause => "pause",
            ReservedMode::Exit => "exit",
            ReservedMode::Reset => "reset",
            ReservedMode::Reboot => "reboot",
        }
    }

    /// Case-insensitive lookup by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|reserved| reserved.name().eq_ignore_ascii_case(name))
    }

    /// Returns `true` for the modes that stop every other mode when they begin.
    ///
    /// `Pause` is cooperative: it freezes other modes instead of ending them.
    #[must_use]
    pub const fn is_takeover(self) -> bool {
        !matches!(self, ReservedMode::Pause)
    }
}

/// Lifecycle stage of a mode. Ordering follows the lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    Begin,
    Running,
    End,
    /// Remove the mode immediately, skipping `on_end`.
    Discard,
}

impl Phase {
    /// Short label used in logs and status output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Phase::Begin => "begin",
            Phase::Running => "running",
            Phase::End => "end",
            Phase::Discard => "discard",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result reported by a mode hook.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// Keep running; the mode is advanced again on the next tick.
    Continue,
    /// The mode is done; `on_end` runs and the mode is removed.
    Finished,
    /// Drop the mode without calling `on_end`.
    Discard,
}

impl Outcome {
    /// Maps a hook outcome to the phase requested for the next tick.
    #[must_use]
    pub const fn next_phase(self) -> Phase {
        match self {
            Outcome::Continue => Phase::Running,
            Outcome::Finished => Phase::End,
            Outcome::Discard => Phase::Discard,
        }
    }

    /// Convenience constructor for hooks that report readiness as a flag.
    #[must_use]
    pub const fn continue_if(flag: bool) -> Self {
        if flag {
            Outcome::Continue
        } else {
            Outcome::Finished
        }
    }
}

/// Behavior hooks of a user mode.
///
/// Hooks run inside [`Scheduler::tick`](crate::Scheduler::tick) and receive a
/// [`ModeContext`] through which they may request transitions for any mode of
/// the same scheduler. Requests made from a hook are applied on the next tick.
pub trait ModeHandler {
    /// Invoked on the tick that activates the mode.
    fn on_begin(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Continue
    }

    /// Invoked on every following tick while the mode is running.
    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome;

    /// Invoked once before the mode is removed, whether it finished on its own
    /// or was stopped.
    fn on_end(&mut self, _ctx: &mut ModeContext<'_>) {}

    /// Invoked when the owning scheduler enters (`true`) or leaves (`false`)
    /// the paused state while this mode is active.
    fn on_pause(&mut self, _paused: bool, _ctx: &mut ModeContext<'_>) {}
}

/// Bookkeeping record of an active mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Mode {
    id: ModeId,
    phase: Phase,
    active_time: Duration,
}

impl Mode {
    /// Creates the record for a freshly activated mode.
    #[must_use]
    pub const fn new(id: ModeId) -> Self {
        Self {
            id,
            phase: Phase::Begin,
            active_time: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ModeId {
        self.id
    }

    /// Phase most recently applied to the mode.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Time accumulated while running since activation.
    #[must_use]
    pub const fn active_time(&self) -> Duration {
        self.active_time
    }

    /// Moves the mode to `next`, refusing to go backwards.
    pub fn advance(&mut self, next: Phase) -> bool {
        if next < self.phase {
            return false;
        }
        self.phase = next;
        true
    }

    /// Adds one tick worth of running time.
    pub fn accrue(&mut self, delta: Duration) {
        self.active_time = self.active_time.saturating_add(delta);
    }
}
