#![no_std]

// Boxed user handlers and shared behavior timers need an allocator; everything
// else stays in fixed-capacity `heapless` containers.
extern crate alloc;

// Cooperative mode scheduling shared by every device of the odometer.
//
// A device owns one `Scheduler`; each independently-progressing activity
// (recording, calibrating, pausing, exiting) is a mode advanced once per tick.
// The crate avoids the standard library so the same core can be linked into
// host tooling and constrained targets alike.

pub mod behavior;
pub mod console;
pub mod journal;
pub mod mode;
pub mod scheduler;
pub mod system;

pub use behavior::{Behavior, DeviceMode, ModeHandle, SpanTimer};
pub use journal::{LOG_CAPACITY, LogBuffer, LogSink, MAX_LOG_LINE};
pub use mode::{ModeHandler, ModeId, Outcome, Phase, ReservedMode};
pub use scheduler::{
    DEFAULT_MODE_CAPACITY, DEFAULT_TICK_INTERVAL, InputSource, Key, KeyAction, KeyBindings,
    MessageQueue, ModeContext, ModeControl, RegistryError, Scheduler, SchedulerConfig,
    TickInstant,
};
pub use system::{NoopSystemHooks, SystemHooks};
