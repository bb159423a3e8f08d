//! Scheduler tunables and keyboard bindings.

use core::time::Duration;

use super::input::Key;

/// Default spacing between two ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of modes, reserved ones included, a scheduler can track.
pub const DEFAULT_MODE_CAPACITY: usize = 32;

/// Control actions a key can be bound to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeyAction {
    TogglePause,
    Reboot,
    Reset,
    Exit,
}

/// Keys translated into system mode requests after the entity hooks had a
/// chance to consume them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyBindings {
    pub pause: Key,
    pub reboot: Key,
    pub reset: Key,
    pub exit: Key,
}

impl KeyBindings {
    pub const fn new() -> Self {
        Self {
            pause: Key::Char('p'),
            reboot: Key::Char('q'),
            reset: Key::Char('z'),
            exit: Key::Escape,
        }
    }

    /// Looks up the action bound to `key`.
    #[must_use]
    pub fn action(&self, key: Key) -> Option<KeyAction> {
        if key == self.pause {
            Some(KeyAction::TogglePause)
        } else if key == self.reboot {
            Some(KeyAction::Reboot)
        } else if key == self.reset {
            Some(KeyAction::Reset)
        } else if key == self.exit {
            Some(KeyAction::Exit)
        } else {
            None
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime configuration of a [`Scheduler`](crate::Scheduler).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    min_tick_interval: Duration,
    logging_enabled: bool,
    bindings: KeyBindings,
}

impl SchedulerConfig {
    /// Creates a configuration ticking no faster than `min_tick_interval`.
    pub const fn new(min_tick_interval: Duration) -> Self {
        Self {
            min_tick_interval,
            logging_enabled: true,
            bindings: KeyBindings::new(),
        }
    }

    /// Enables or disables the handler log buffer.
    #[must_use]
    pub const fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn with_bindings(mut self, bindings: KeyBindings) -> Self {
        self.bindings = bindings;
        self
    }

    #[must_use]
    pub const fn with_min_tick_interval(mut self, min_tick_interval: Duration) -> Self {
        self.min_tick_interval = min_tick_interval;
        self
    }

    pub const fn min_tick_interval(&self) -> Duration {
        self.min_tick_interval
    }

    pub const fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub const fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_INTERVAL)
    }
}
