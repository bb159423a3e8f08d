//! Built-in control modes and the entity hooks that customize them.
//!
//! `Start`, `Exit`, `Reset` and `Reboot` take the device over: beginning one
//! ends every other active mode. `Pause` is cooperative; the scheduler freezes
//! every other mode while it is active and replays their requests once it
//! ends. The entity owning a scheduler shapes what each of them does through
//! [`SystemHooks`].

use crate::mode::{Outcome, Phase, ReservedMode};
use crate::scheduler::{Key, ModeContext, ModeControl};

/// Entity-level callbacks invoked by the reserved modes.
///
/// Every hook has a default, so an entity only overrides what it needs.
pub trait SystemHooks {
    /// Gates the `Start` mode; when `false` it finishes without running.
    fn is_ready(&self) -> bool {
        true
    }

    /// Runs while `Start` is active. Return `Continue` to keep starting up.
    fn on_start(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Finished
    }

    /// Sees every phase of `Pause`. The outcome is ignored at `End`.
    fn on_pause(&mut self, _phase: Phase, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Continue
    }

    /// Runs while `Exit` is active.
    fn on_exit(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Finished
    }

    /// Runs while `Reset` is active; `Start` follows once it ends.
    fn on_reset(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Finished
    }

    /// Runs while `Reboot` is active; `Start` follows once it ends.
    fn on_reboot(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        Outcome::Finished
    }

    /// Called when a reserved mode ends.
    fn on_finished(&mut self, _mode: ReservedMode, _ctx: &mut ModeContext<'_>) {}

    /// Offered every polled key before the default bindings. Returning `true`
    /// consumes the key.
    fn on_key(&mut self, _key: Key, _control: &mut dyn ModeControl) -> bool {
        false
    }
}

/// Hooks that keep every default.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoopSystemHooks;

impl SystemHooks for NoopSystemHooks {}

pub(crate) fn advance<H>(
    mode: ReservedMode,
    phase: Phase,
    hooks: &mut H,
    ctx: &mut ModeContext<'_>,
) -> Outcome
where
    H: SystemHooks + ?Sized,
{
    if mode == ReservedMode::Pause {
        return hooks.on_pause(phase, ctx);
    }

    match phase {
        Phase::Begin => {
            // Catch modes activated after the takeover was requested.
            ctx.stop_all_except(mode.id());
            if mode == ReservedMode::Start && !hooks.is_ready() {
                ctx.log(format_args!("start: device not ready"));
                return Outcome::Finished;
            }
            Outcome::Continue
        }
        Phase::Running => match mode {
            ReservedMode::Start => hooks.on_start(ctx),
            ReservedMode::Exit => hooks.on_exit(ctx),
            ReservedMode::Reset => hooks.on_reset(ctx),
            ReservedMode::Reboot => hooks.on_reboot(ctx),
            ReservedMode::Pause => Outcome::Continue,
        },
        Phase::End | Phase::Discard => Outcome::Finished,
    }
}

pub(crate) fn finish<H>(mode: ReservedMode, hooks: &mut H, ctx: &mut ModeContext<'_>)
where
    H: SystemHooks + ?Sized,
{
    if mode == ReservedMode::Pause {
        let _ = hooks.on_pause(Phase::End, ctx);
    }
    hooks.on_finished(mode, ctx);
    if matches!(mode, ReservedMode::Reset | ReservedMode::Reboot) {
        ctx.start();
    }
}
