//! Binding of outer behaviors to modes of a parent scheduler.
//!
//! A [`Behavior`] is the part of an entity that runs as one mode of its
//! owner: a camera recorder, an IMU reader, a calibration routine. Binding it
//! with [`DeviceMode::bind`] registers it with the parent and returns a
//! [`ModeHandle`] that starts, stops and inspects it from anywhere holding a
//! [`ModeControl`].

use alloc::rc::Rc;
use core::cell::Cell;
use core::time::Duration;

use crate::mode::{ModeHandler, ModeId, Outcome};
use crate::scheduler::{ModeContext, ModeControl, RegistryError, Scheduler, TickInstant};
use crate::system::SystemHooks;

/// Phase callbacks of a bound behavior.
pub trait Behavior {
    /// Checked when the mode begins; a behavior that is not ready finishes
    /// immediately.
    fn is_ready(&self) -> bool {
        true
    }

    fn on_begin(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::continue_if(self.is_ready())
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome;

    fn on_end(&mut self, _ctx: &mut ModeContext<'_>) {}

    fn on_pause(&mut self, _paused: bool, _ctx: &mut ModeContext<'_>) {}
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct Span {
    started: Option<Duration>,
    last: Duration,
}

/// Wall-clock span of a behavior's latest `Begin..End`, pauses included.
#[derive(Clone, Debug, Default)]
pub struct SpanTimer(Rc<Cell<Span>>);

impl SpanTimer {
    fn begin(&self, now: Duration) {
        self.0.set(Span {
            started: Some(now),
            last: now,
        });
    }

    fn touch(&self, now: Duration) {
        let mut span = self.0.get();
        span.last = now;
        self.0.set(span);
    }

    /// Time between the latest begin and the latest dispatch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let span = self.0.get();
        span.started
            .map_or(Duration::ZERO, |started| span.last.saturating_sub(started))
    }
}

/// Adapts a [`Behavior`] into a [`ModeHandler`].
#[derive(Debug)]
pub struct DeviceMode<B> {
    behavior: B,
    timer: SpanTimer,
}

impl<B> DeviceMode<B>
where
    B: Behavior + 'static,
{
    pub fn new(behavior: B) -> Self {
        Self {
            behavior,
            timer: SpanTimer::default(),
        }
    }

    /// Registers `behavior` as a mode of `parent`.
    ///
    /// # Errors
    ///
    /// Propagates the parent's [`RegistryError`].
    pub fn bind<I, H, const CAPACITY: usize>(
        parent: &mut Scheduler<I, H, CAPACITY>,
        behavior: B,
    ) -> Result<ModeHandle, RegistryError>
    where
        I: TickInstant,
        H: SystemHooks,
    {
        let mode = Self::new(behavior);
        let timer = mode.timer.clone();
        let id = parent.register_mode(mode)?;
        Ok(ModeHandle { id, timer })
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }
}

impl<B: Behavior> ModeHandler for DeviceMode<B> {
    fn on_begin(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.timer.begin(ctx.uptime());
        self.behavior.on_begin(ctx)
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.timer.touch(ctx.uptime());
        self.behavior.on_run(ctx)
    }

    fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
        self.timer.touch(ctx.uptime());
        self.behavior.on_end(ctx);
    }

    fn on_pause(&mut self, paused: bool, ctx: &mut ModeContext<'_>) {
        self.behavior.on_pause(paused, ctx);
    }
}

/// Owner-side proxy of a bound behavior.
#[derive(Clone, Debug)]
pub struct ModeHandle {
    id: ModeId,
    timer: SpanTimer,
}

impl ModeHandle {
    #[must_use]
    pub fn id(&self) -> ModeId {
        self.id
    }

    /// Requests that the behavior begins on the parent's next tick.
    pub fn start(&self, parent: &mut dyn ModeControl) -> bool {
        parent.begin_mode(self.id)
    }

    /// Requests that the behavior ends on the parent's next tick.
    pub fn stop(&self, parent: &mut dyn ModeControl) -> bool {
        parent.stop_mode(self.id)
    }

    /// Starts the behavior when idle, stops it otherwise.
    pub fn toggle(&self, parent: &mut dyn ModeControl) -> bool {
        if parent.mode_active(self.id) {
            self.stop(parent)
        } else {
            self.start(parent)
        }
    }

    #[must_use]
    pub fn is_active(&self, parent: &dyn ModeControl) -> bool {
        parent.mode_active(self.id)
    }

    /// Wall-clock span of the latest activation.
    #[must_use]
    pub fn active_time(&self) -> Duration {
        self.timer.elapsed()
    }
}
