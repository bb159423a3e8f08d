//! Device-level dispatcher owning a set of modes.
//!
//! Requests made through [`ModeControl`] are staged in a queue and applied on
//! the next [`Scheduler::tick`]: each tick drains the staged requests, moves
//! every addressed mode exactly one phase forward, invokes its handler and
//! stages whatever the handler asks for next. Work requested during a tick is
//! therefore first seen on the following one.

mod clock;
mod config;
mod input;
mod queue;
mod table;

use alloc::boxed::Box;
use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::journal::{LogBuffer, LogSink};
use crate::mode::{ModeHandler, ModeId, Outcome, Phase, RESERVED_MODE_COUNT, ReservedMode};
use crate::system::{self, NoopSystemHooks, SystemHooks};

pub use clock::TickInstant;
pub use config::{
    DEFAULT_MODE_CAPACITY, DEFAULT_TICK_INTERVAL, KeyAction, KeyBindings, SchedulerConfig,
};
pub use input::{InputSource, Key};
pub use queue::MessageQueue;
pub use table::RegistryError;

use clock::TickClock;
use table::ModeTable;

#[cfg(test)]
pub(crate) use clock::tests::MockInstant;

/// Operations available to both scheduler owners and running handlers.
///
/// Requests return `false` when the scheduler refuses them: unknown ids,
/// `Begin` for an already active mode, phases behind the current one, or any
/// phase other than `Begin` for an inactive mode.
pub trait ModeControl {
    /// Returns `true` when `id` is registered.
    fn got_mode(&self, id: ModeId) -> bool;

    /// Returns `true` while `id` is active.
    fn mode_active(&self, id: ModeId) -> bool;

    /// Running time of the current, or most recent, activation of `id`.
    fn active_time(&self, id: ModeId) -> Duration;

    /// Requests activation of `id` on the next tick.
    fn begin_mode(&mut self, id: ModeId) -> bool;

    /// Requests that `id` ends on the next tick.
    fn stop_mode(&mut self, id: ModeId) -> bool;

    /// Requests that every active mode except `id` ends, beginning `id` if it
    /// is not active. Returns `true` only when `id` was newly requested.
    fn stop_all_except(&mut self, id: ModeId) -> bool;

    /// Requests that every active mode ends.
    fn stop_all(&mut self) -> bool;

    /// Buffers a line for the scheduler's log sink.
    fn log(&mut self, args: fmt::Arguments<'_>);

    fn is_paused(&self) -> bool {
        self.mode_active(ReservedMode::Pause.id())
    }

    fn start(&mut self) -> bool {
        self.begin_mode(ReservedMode::Start.id())
    }

    fn pause(&mut self) -> bool {
        self.begin_mode(ReservedMode::Pause.id())
    }

    fn resume(&mut self) -> bool {
        self.stop_mode(ReservedMode::Pause.id())
    }

    /// Pauses a running scheduler, or resumes a paused one.
    fn toggle_pause(&mut self) -> bool {
        if self.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    fn exit(&mut self) -> bool {
        self.begin_mode(ReservedMode::Exit.id())
    }

    fn reset(&mut self) -> bool {
        self.begin_mode(ReservedMode::Reset.id())
    }

    fn reboot(&mut self) -> bool {
        self.begin_mode(ReservedMode::Reboot.id())
    }
}

/// View of the scheduler handed to a handler for one dispatch.
pub struct ModeContext<'a> {
    id: ModeId,
    phase: Phase,
    delta: Duration,
    uptime: Duration,
    control: &'a mut dyn ModeControl,
}

impl<'a> ModeContext<'a> {
    pub fn new(
        id: ModeId,
        phase: Phase,
        delta: Duration,
        uptime: Duration,
        control: &'a mut dyn ModeControl,
    ) -> Self {
        Self {
            id,
            phase,
            delta,
            uptime,
            control,
        }
    }

    /// Mode being dispatched.
    pub fn id(&self) -> ModeId {
        self.id
    }

    /// Phase being applied.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Time since the previous tick.
    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Time since the scheduler's first tick.
    pub fn uptime(&self) -> Duration {
        self.uptime
    }

    /// Running time of the dispatched mode.
    pub fn own_active_time(&self) -> Duration {
        self.control.active_time(self.id)
    }

    /// Requests that the dispatched mode ends on the next tick.
    pub fn stop_self(&mut self) -> bool {
        self.control.stop_mode(self.id)
    }
}

impl ModeControl for ModeContext<'_> {
    fn got_mode(&self, id: ModeId) -> bool {
        self.control.got_mode(id)
    }

    fn mode_active(&self, id: ModeId) -> bool {
        self.control.mode_active(id)
    }

    fn active_time(&self, id: ModeId) -> Duration {
        self.control.active_time(id)
    }

    fn begin_mode(&mut self, id: ModeId) -> bool {
        self.control.begin_mode(id)
    }

    fn stop_mode(&mut self, id: ModeId) -> bool {
        self.control.stop_mode(id)
    }

    fn stop_all_except(&mut self, id: ModeId) -> bool {
        self.control.stop_all_except(id)
    }

    fn stop_all(&mut self) -> bool {
        self.control.stop_all()
    }

    fn log(&mut self, args: fmt::Arguments<'_>) {
        self.control.log(args);
    }
}

impl fmt::Debug for ModeContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeContext")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("delta", &self.delta)
            .field("uptime", &self.uptime)
            .finish_non_exhaustive()
    }
}

/// Behavior attached to a registered mode.
pub(crate) enum HandlerKind {
    System(ReservedMode),
    User(Box<dyn ModeHandler>),
}

impl HandlerKind {
    fn advance<H: SystemHooks>(
        &mut self,
        phase: Phase,
        hooks: &mut H,
        ctx: &mut ModeContext<'_>,
    ) -> Outcome {
        match self {
            HandlerKind::System(mode) => system::advance(*mode, phase, hooks, ctx),
            HandlerKind::User(handler) if phase == Phase::Begin => handler.on_begin(ctx),
            HandlerKind::User(handler) => handler.on_run(ctx),
        }
    }

    fn finish<H: SystemHooks>(&mut self, hooks: &mut H, ctx: &mut ModeContext<'_>) {
        match self {
            HandlerKind::System(mode) => system::finish(*mode, hooks, ctx),
            HandlerKind::User(handler) => handler.on_end(ctx),
        }
    }
}

/// Cooperative, tick-driven owner of a set of modes.
///
/// `I` is the timestamp type fed to [`tick`](Self::tick), `H` the entity hooks
/// customizing the reserved modes, and `CAPACITY` the number of modes
/// (reserved ones included) the scheduler can track.
pub struct Scheduler<I, H = NoopSystemHooks, const CAPACITY: usize = DEFAULT_MODE_CAPACITY> {
    handlers: Vec<(ModeId, HandlerKind), CAPACITY>,
    table: ModeTable<CAPACITY>,
    hooks: H,
    clock: TickClock<I>,
    bindings: KeyBindings,
    input: Option<Box<dyn InputSource>>,
    next_user_id: u32,
    pause_notified: bool,
}

impl<I: TickInstant> Scheduler<I> {
    /// Creates a scheduler with default configuration and no entity hooks.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default(), NoopSystemHooks)
    }
}

impl<I: TickInstant> Default for Scheduler<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: TickInstant, H: SystemHooks> Scheduler<I, H> {
    /// Creates a scheduler with default configuration around `hooks`.
    pub fn with_hooks(hooks: H) -> Self {
        Self::with_config(SchedulerConfig::default(), hooks)
    }
}

impl<I, H, const CAPACITY: usize> Scheduler<I, H, CAPACITY>
where
    I: TickInstant,
    H: SystemHooks,
{
    /// Creates a scheduler with the reserved modes registered.
    pub fn with_config(config: SchedulerConfig, hooks: H) -> Self {
        const { assert!(CAPACITY > RESERVED_MODE_COUNT, "capacity must leave room for user modes") };

        let mut scheduler = Self {
            handlers: Vec::new(),
            table: ModeTable::new(config.logging_enabled()),
            hooks,
            clock: TickClock::new(config.min_tick_interval()),
            bindings: *config.bindings(),
            input: None,
            next_user_id: ModeId::FIRST_USER.get(),
            pause_notified: false,
        };
        for reserved in ReservedMode::ALL {
            // Capacity is checked above, so the reserved ids always fit.
            let _ = scheduler.insert(reserved.id(), HandlerKind::System(reserved));
        }
        scheduler
    }

    /// Registers a user mode under the next free identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RegistryFull`] once `CAPACITY` modes are
    /// registered.
    pub fn register_mode<M>(&mut self, handler: M) -> Result<ModeId, RegistryError>
    where
        M: ModeHandler + 'static,
    {
        if self.table.is_full() {
            return Err(RegistryError::RegistryFull);
        }
        let mut candidate = self.next_user_id;
        while self.table.got_mode(ModeId::new(candidate)) {
            candidate = candidate.saturating_add(1);
        }
        let id = ModeId::new(candidate);
        self.insert(id, HandlerKind::User(Box::new(handler)))?;
        self.next_user_id = candidate.saturating_add(1);
        Ok(id)
    }

    /// Registers a user mode under an explicit identifier.
    ///
    /// # Errors
    ///
    /// Fails when `id` lies below [`ModeId::FIRST_USER`], is already
    /// registered, or the registry is full.
    pub fn register_mode_as<M>(&mut self, id: ModeId, handler: M) -> Result<ModeId, RegistryError>
    where
        M: ModeHandler + 'static,
    {
        if id < ModeId::FIRST_USER {
            return Err(RegistryError::ReservedId(id));
        }
        self.insert(id, HandlerKind::User(Box::new(handler)))?;
        Ok(id)
    }

    fn insert(&mut self, id: ModeId, handler: HandlerKind) -> Result<(), RegistryError> {
        if self.handlers.is_full() {
            return Err(RegistryError::RegistryFull);
        }
        self.table.register(id)?;
        self.handlers
            .push((id, handler))
            .map_err(|_| RegistryError::RegistryFull)
    }

    /// Removes an inactive user mode. Reserved modes stay registered.
    pub fn unregister_mode(&mut self, id: ModeId) -> bool {
        if id.is_reserved() || !self.table.unregister(id) {
            return false;
        }
        self.handlers.retain(|(handler, _)| *handler != id);
        true
    }

    /// Attaches the destination for handler log lines.
    pub fn set_log_sink(&mut self, sink: Box<dyn LogSink>) {
        self.table.journal_mut().set_sink(sink);
    }

    pub fn take_log_sink(&mut self) -> Option<Box<dyn LogSink>> {
        self.table.journal_mut().take_sink()
    }

    /// Attaches the keyboard polled once per tick.
    pub fn set_input(&mut self, input: Box<dyn InputSource>) {
        self.input = Some(input);
    }

    pub fn take_input(&mut self) -> Option<Box<dyn InputSource>> {
        self.input.take()
    }

    pub fn set_min_tick_interval(&mut self, interval: Duration) {
        self.clock.set_min_interval(interval);
    }

    pub fn min_tick_interval(&self) -> Duration {
        self.clock.min_interval()
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Lines logged since the last flush.
    pub fn journal(&self) -> &LogBuffer {
        self.table.journal()
    }

    /// Hands buffered lines to the log sink without waiting for a tick.
    pub fn flush_log(&mut self) {
        self.table.journal_mut().flush();
    }

    /// Phase waiting to be applied to `id` on the next tick, including
    /// requests held back while paused.
    pub fn pending_phase(&self, id: ModeId) -> Option<Phase> {
        self.table.pending_phase(id)
    }

    /// Phase last applied to `id`, if it is active.
    pub fn mode_phase(&self, id: ModeId) -> Option<Phase> {
        self.table.mode(id).map(crate::mode::Mode::phase)
    }

    /// Active modes in activation order.
    pub fn active_modes(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.table.active_ids()
    }

    /// Registered modes in registration order, reserved ones first.
    pub fn registered_modes(&self) -> impl Iterator<Item = ModeId> + '_ {
        self.table.registered_ids()
    }

    /// Number of ticks that ran.
    pub fn tick_count(&self) -> u64 {
        self.clock.ticks()
    }

    /// Time between the first and the latest tick.
    pub fn uptime(&self) -> Duration {
        self.clock.uptime()
    }

    /// Returns `true` when no mode is active and nothing is pending.
    pub fn is_complete(&self) -> bool {
        self.table.is_idle()
    }

    /// Returns `true` when requests are waiting for the next tick.
    pub fn has_pending(&self) -> bool {
        self.table.has_requests()
    }

    /// Runs one scheduling step at `now`.
    ///
    /// Returns `false` without doing anything when `now` is earlier than the
    /// previous tick or closer to it than the minimum tick interval.
    pub fn tick(&mut self, now: I) -> bool {
        let Some(delta) = self.clock.advance(now) else {
            return false;
        };
        let uptime = self.clock.uptime();

        self.table.journal_mut().flush();
        self.poll_input();

        let (pending, activations) = self.table.take_requests();
        let pause = ReservedMode::Pause.id();
        if pending.iter().any(|(id, _)| *id == pause) {
            self.tick_paused(pending, &activations, delta, uptime);
            return true;
        }

        for id in activations {
            self.table.activate(id);
        }
        for (id, phase) in pending {
            self.dispatch(id, phase, delta, uptime);
        }
        true
    }

    fn poll_input(&mut self) {
        let Some(key) = self.input.as_mut().and_then(|input| input.poll()) else {
            return;
        };
        if self.hooks.on_key(key, &mut self.table) {
            return;
        }
        let accepted = match self.bindings.action(key) {
            Some(KeyAction::TogglePause) => self.table.toggle_pause(),
            Some(KeyAction::Reboot) => self.table.reboot(),
            Some(KeyAction::Reset) => self.table.reset(),
            Some(KeyAction::Exit) => self.table.exit(),
            None => return,
        };
        if !accepted {
            log::debug!("key {key:?} ignored");
        }
    }

    // Pause is handled on its own: every other request of this tick waits in
    // the frozen map until the scheduler is no longer paused.
    fn tick_paused(
        &mut self,
        pending: queue::PendingMap<CAPACITY>,
        activations: &[ModeId],
        delta: Duration,
        uptime: Duration,
    ) {
        let pause = ReservedMode::Pause.id();
        let mut pause_phase = None;
        for (id, phase) in pending {
            if id == pause {
                pause_phase = Some(phase);
            } else {
                self.table.freeze(id, phase);
            }
        }
        if activations.contains(&pause) {
            self.table.activate(pause);
        }
        if let Some(phase) = pause_phase {
            self.dispatch(pause, phase, delta, uptime);
        }

        let paused = self.table.mode_active(pause);
        if paused && !self.pause_notified {
            self.pause_notified = true;
            self.notify_pause(true, delta, uptime);
        } else if !paused {
            if self.pause_notified {
                self.pause_notified = false;
                self.notify_pause(false, delta, uptime);
            }
            self.table.thaw();
        }
    }

    fn notify_pause(&mut self, paused: bool, delta: Duration, uptime: Duration) {
        let Self {
            handlers, table, ..
        } = self;
        let active: Vec<ModeId, CAPACITY> = table.active_ids().collect();
        for id in active {
            let Some(phase) = table.mode(id).map(crate::mode::Mode::phase) else {
                continue;
            };
            let Some(HandlerKind::User(handler)) = lookup(handlers, id) else {
                continue;
            };
            let mut ctx = ModeContext::new(id, phase, delta, uptime, &mut *table);
            handler.on_pause(paused, &mut ctx);
        }
    }

    // Applies one drained request: bookkeeping first, then the handler.
    fn dispatch(&mut self, id: ModeId, phase: Phase, delta: Duration, uptime: Duration) {
        let Self {
            handlers,
            table,
            hooks,
            ..
        } = self;

        let Some(mode) = table.mode_mut(id) else {
            log::trace!("{id} is inactive, dropped stale {phase}");
            return;
        };
        match phase {
            Phase::Begin if mode.phase() != Phase::Begin => return,
            Phase::Begin => {}
            Phase::Running => {
                mode.accrue(delta);
                mode.advance(Phase::Running);
            }
            Phase::End => {
                mode.advance(Phase::End);
            }
            Phase::Discard => {
                table.deactivate(id);
                return;
            }
        }

        let Some(handler) = lookup(handlers, id) else {
            table.deactivate(id);
            return;
        };

        let outcome = if phase == Phase::End {
            Outcome::Finished
        } else {
            let mut ctx = ModeContext::new(id, phase, delta, uptime, &mut *table);
            handler.advance(phase, &mut *hooks, &mut ctx)
        };

        match outcome {
            Outcome::Continue => {
                table.request(id, Phase::Running);
            }
            Outcome::Finished => {
                if let Some(mode) = table.mode_mut(id) {
                    mode.advance(Phase::End);
                }
                let mut ctx = ModeContext::new(id, Phase::End, delta, uptime, &mut *table);
                handler.finish(&mut *hooks, &mut ctx);
                table.deactivate(id);
            }
            Outcome::Discard => table.deactivate(id),
        }
    }
}

fn lookup<const N: usize>(
    handlers: &mut Vec<(ModeId, HandlerKind), N>,
    id: ModeId,
) -> Option<&mut HandlerKind> {
    handlers
        .iter_mut()
        .find(|(handler, _)| *handler == id)
        .map(|(_, handler)| handler)
}

impl<I, H, const CAPACITY: usize> ModeControl for Scheduler<I, H, CAPACITY>
where
    I: TickInstant,
    H: SystemHooks,
{
    fn got_mode(&self, id: ModeId) -> bool {
        self.table.got_mode(id)
    }

    fn mode_active(&self, id: ModeId) -> bool {
        self.table.mode_active(id)
    }

    fn active_time(&self, id: ModeId) -> Duration {
        self.table.active_time(id)
    }

    fn begin_mode(&mut self, id: ModeId) -> bool {
        self.table.begin_mode(id)
    }

    fn stop_mode(&mut self, id: ModeId) -> bool {
        self.table.stop_mode(id)
    }

    fn stop_all_except(&mut self, id: ModeId) -> bool {
        self.table.stop_all_except(id)
    }

    fn stop_all(&mut self) -> bool {
        self.table.stop_all()
    }

    fn log(&mut self, args: fmt::Arguments<'_>) {
        self.table.log(args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec as StdVec;
    use core::cell::RefCell;

    type Calls = Rc<RefCell<StdVec<(&'static str, Phase)>>>;

    /// Records every hook call and finishes after `runs` calls to `on_run`.
    struct Recorder {
        calls: Calls,
        runs: usize,
    }

    impl ModeHandler for Recorder {
        fn on_begin(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
            self.calls.borrow_mut().push(("begin", ctx.phase()));
            Outcome::Continue
        }

        fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
            self.calls.borrow_mut().push(("run", ctx.phase()));
            self.runs = self.runs.saturating_sub(1);
            Outcome::continue_if(self.runs > 0)
        }

        fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
            self.calls.borrow_mut().push(("end", ctx.phase()));
        }

        fn on_pause(&mut self, paused: bool, ctx: &mut ModeContext<'_>) {
            let label = if paused { "pause" } else { "resume" };
            self.calls.borrow_mut().push((label, ctx.phase()));
        }
    }

    fn recorder(runs: usize) -> (Recorder, Calls) {
        let calls = Calls::default();
        (
            Recorder {
                calls: Rc::clone(&calls),
                runs,
            },
            calls,
        )
    }

    fn scheduler() -> Scheduler<MockInstant> {
        Scheduler::with_config(
            SchedulerConfig::new(Duration::from_millis(10)),
            NoopSystemHooks,
        )
    }

    #[test]
    fn reserved_modes_are_registered_up_front() {
        let scheduler = scheduler();
        for reserved in ReservedMode::ALL {
            assert!(scheduler.got_mode(reserved.id()));
        }
        assert!(scheduler.is_complete());
        assert_eq!(scheduler.registered_modes().count(), RESERVED_MODE_COUNT);
    }

    #[test]
    fn user_ids_skip_taken_identifiers() {
        let mut scheduler = scheduler();
        let (explicit, _) = recorder(1);
        scheduler
            .register_mode_as(ModeId::FIRST_USER, explicit)
            .expect("explicit id");
        let (next, _) = recorder(1);
        let id = scheduler.register_mode(next).expect("generated id");
        assert_eq!(id, ModeId::new(ModeId::FIRST_USER.get() + 1));

        let (reserved, _) = recorder(1);
        assert_eq!(
            scheduler.register_mode_as(ReservedMode::Pause.id(), reserved),
            Err(RegistryError::ReservedId(ReservedMode::Pause.id()))
        );
        let (spare, _) = recorder(1);
        assert_eq!(
            scheduler.register_mode_as(ModeId::new(7), spare),
            Err(RegistryError::ReservedId(ModeId::new(7)))
        );
    }

    #[test]
    fn registry_reports_when_full() {
        let mut scheduler: Scheduler<MockInstant, NoopSystemHooks, 7> =
            Scheduler::with_config(SchedulerConfig::default(), NoopSystemHooks);
        scheduler.register_mode(recorder(1).0).expect("slot 6");
        scheduler.register_mode(recorder(1).0).expect("slot 7");
        assert_eq!(
            scheduler.register_mode(recorder(1).0),
            Err(RegistryError::RegistryFull)
        );
    }

    #[test]
    fn handler_sees_each_phase_once() {
        let mut scheduler = scheduler();
        let (handler, calls) = recorder(2);
        let id = scheduler.register_mode(handler).expect("registers");
        assert!(scheduler.begin_mode(id));

        for step in 0..4 {
            scheduler.tick(MockInstant::millis(step * 10));
        }

        assert_eq!(
            *calls.borrow(),
            [
                ("begin", Phase::Begin),
                ("run", Phase::Running),
                ("run", Phase::Running),
                ("end", Phase::End),
            ]
        );
        assert!(scheduler.is_complete());
        assert_eq!(scheduler.active_time(id), Duration::from_millis(20));
    }

    #[test]
    fn gated_ticks_do_nothing() {
        let mut scheduler = scheduler();
        let (handler, calls) = recorder(5);
        let id = scheduler.register_mode(handler).expect("registers");
        scheduler.begin_mode(id);

        assert!(scheduler.tick(MockInstant::millis(0)));
        assert!(!scheduler.tick(MockInstant::millis(5)));
        assert_eq!(calls.borrow().len(), 1);
        assert_eq!(scheduler.pending_phase(id), Some(Phase::Running));
        assert_eq!(scheduler.tick_count(), 1);
    }

    #[test]
    fn discard_skips_on_end() {
        struct Discarding;

        impl ModeHandler for Discarding {
            fn on_run(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
                Outcome::Discard
            }

            fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
                ctx.log(format_args!("unexpected end"));
            }
        }

        let mut scheduler = scheduler();
        let id = scheduler.register_mode(Discarding).expect("registers");
        scheduler.begin_mode(id);
        scheduler.tick(MockInstant::millis(0));
        scheduler.tick(MockInstant::millis(10));

        assert!(!scheduler.mode_active(id));
        assert!(scheduler.journal().is_empty());
    }

    #[test]
    fn external_stop_runs_on_end_once() {
        let mut scheduler = scheduler();
        let (handler, calls) = recorder(usize::MAX);
        let id = scheduler.register_mode(handler).expect("registers");
        scheduler.begin_mode(id);
        scheduler.tick(MockInstant::millis(0));
        assert!(scheduler.stop_mode(id));
        scheduler.tick(MockInstant::millis(10));
        scheduler.tick(MockInstant::millis(20));

        let ends = calls
            .borrow()
            .iter()
            .filter(|(label, _)| *label == "end")
            .count();
        assert_eq!(ends, 1);
        assert!(!scheduler.mode_active(id));
    }

    #[test]
    fn input_keys_drive_system_modes() {
        let mut scheduler = scheduler();
        let mut keys = alloc::vec![Key::Escape];
        scheduler.set_input(Box::new(move || keys.pop()));

        // Keys are polled before the queue is drained, so the request is
        // applied on the same tick.
        scheduler.tick(MockInstant::millis(0));
        assert!(scheduler.mode_active(ReservedMode::Exit.id()));
        scheduler.tick(MockInstant::millis(10));
        assert!(scheduler.is_complete());
    }

    #[test]
    fn pause_notifies_active_handlers() {
        let mut scheduler = scheduler();
        let (handler, calls) = recorder(usize::MAX);
        let id = scheduler.register_mode(handler).expect("registers");
        scheduler.begin_mode(id);
        scheduler.tick(MockInstant::millis(0));

        scheduler.pause();
        scheduler.tick(MockInstant::millis(10));
        assert!(scheduler.is_paused());
        scheduler.tick(MockInstant::millis(20));
        scheduler.resume();
        scheduler.tick(MockInstant::millis(30));
        assert!(!scheduler.is_paused());

        let labels: StdVec<_> = calls.borrow().iter().map(|(label, _)| *label).collect();
        assert_eq!(labels, ["begin", "pause", "resume"]);
        assert_eq!(scheduler.pending_phase(id), Some(Phase::Running));
        assert_eq!(scheduler.active_time(id), Duration::ZERO);
    }

    #[test]
    fn handler_logs_reach_the_sink_on_next_tick() {
        struct Chatty;

        impl ModeHandler for Chatty {
            fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
                ctx.log(format_args!("{} ran at {:?}", ctx.id(), ctx.uptime()));
                Outcome::Finished
            }
        }

        let lines = Rc::new(RefCell::new(StdVec::<alloc::string::String>::new()));
        let sink_lines = Rc::clone(&lines);
        let mut scheduler = scheduler();
        scheduler.set_log_sink(Box::new(move |line: &str| {
            sink_lines.borrow_mut().push(line.into());
        }));
        let id = scheduler.register_mode(Chatty).expect("registers");
        scheduler.begin_mode(id);
        scheduler.tick(MockInstant::millis(0));
        scheduler.tick(MockInstant::millis(10));
        assert!(lines.borrow().is_empty());
        assert_eq!(scheduler.journal().len(), 1);

        scheduler.tick(MockInstant::millis(20));
        assert_eq!(*lines.borrow(), ["mode#16 ran at 10ms"]);
    }

    #[test]
    fn unregister_requires_inactive_user_mode() {
        let mut scheduler = scheduler();
        let id = scheduler.register_mode(recorder(5).0).expect("registers");
        scheduler.begin_mode(id);
        assert!(!scheduler.unregister_mode(id));
        assert!(!scheduler.unregister_mode(ReservedMode::Start.id()));
        scheduler.tick(MockInstant::millis(0));
        scheduler.stop_mode(id);
        scheduler.tick(MockInstant::millis(10));
        assert!(scheduler.unregister_mode(id));
        assert!(!scheduler.got_mode(id));
        assert!(!scheduler.begin_mode(id));
    }
}
