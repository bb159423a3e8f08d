//! Applying parsed console commands to a scheduler.

use core::fmt;

use heapless::Vec;

use super::grammar::{self, Command, ParseError, Target, TickCommand};
use crate::mode::{ModeId, ReservedMode};
use crate::scheduler::{ModeControl, RegistryError};

/// Default number of named user modes a directory holds.
pub const DEFAULT_DIRECTORY_CAPACITY: usize = 16;

/// Command reference shown by `help`.
pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("begin", "begin <mode>            request that a mode begins"),
    ("stop", "stop <mode>             request that a mode ends"),
    ("only", "only <mode>             end every other mode and begin <mode>"),
    ("stop-all", "stop-all                end every active mode"),
    ("pause", "pause                   freeze every other mode"),
    ("resume", "resume                  end the pause and replay frozen requests"),
    ("exit", "exit                    end everything and shut down"),
    ("reset", "reset                   end everything, then start again"),
    ("reboot", "reboot                  end everything, reinitialize, then start"),
    ("tick", "tick [n] [every <dur>]  advance the clock n ticks"),
    ("status", "status                  list active and pending modes"),
    ("help", "help [command]          show this reference"),
];

/// Usage line for `topic`, matched case-insensitively.
pub fn help_for(topic: &str) -> Option<&'static str> {
    COMMAND_HELP
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, usage)| *usage)
}

/// Names of the user modes a console can address.
///
/// Reserved modes are always resolvable by their own names.
#[derive(Clone, Debug, Default)]
pub struct ModeDirectory<const CAPACITY: usize = DEFAULT_DIRECTORY_CAPACITY> {
    entries: Vec<(&'static str, ModeId), CAPACITY>,
}

impl<const CAPACITY: usize> ModeDirectory<CAPACITY> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Names (or renames) a mode.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ReservedId`] for reserved modes and
    /// [`RegistryError::RegistryFull`] once `CAPACITY` names are stored.
    pub fn insert(&mut self, name: &'static str, id: ModeId) -> Result<(), RegistryError> {
        if id.is_reserved() {
            return Err(RegistryError::ReservedId(id));
        }
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            existing.1 = id;
            return Ok(());
        }
        self.entries
            .push((name, id))
            .map_err(|_| RegistryError::RegistryFull)
    }

    /// Looks a name up, reserved names included.
    pub fn lookup(&self, name: &str) -> Option<ModeId> {
        ReservedMode::from_name(name).map(ReservedMode::id).or_else(|| {
            self.entries
                .iter()
                .find(|(entry, _)| entry.eq_ignore_ascii_case(name))
                .map(|(_, id)| *id)
        })
    }

    /// Resolves a parsed target. Numeric targets are taken as raw ids.
    pub fn resolve(&self, target: Target<'_>) -> Option<ModeId> {
        match target {
            Target::Id(raw) => Some(ModeId::new(raw)),
            Target::Name(name) => self.lookup(name),
        }
    }

    /// Name of `id`, if it has one.
    pub fn name_of(&self, id: ModeId) -> Option<&'static str> {
        ReservedMode::from_id(id).map(ReservedMode::name).or_else(|| {
            self.entries
                .iter()
                .find(|(_, entry)| *entry == id)
                .map(|(name, _)| *name)
        })
    }

    /// Named user modes in insertion order.
    pub fn names(&self) -> impl Iterator<Item = (&'static str, ModeId)> + '_ {
        self.entries.iter().copied()
    }
}

/// What the caller still has to do after [`execute`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action<'a> {
    /// The request was staged for the next tick.
    Requested,
    /// Advance the clock.
    Tick(TickCommand),
    /// Report scheduler state.
    Status,
    /// Print the command reference, optionally for one command.
    Help(Option<&'a str>),
}

/// Errors raised while running a console command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(ParseError<'a>),
    /// The target names no mode in the directory.
    UnknownMode(Target<'a>),
    /// The scheduler refused the request.
    Rejected {
        command: &'static str,
        mode: ModeId,
    },
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(err) => err.fmt(f),
            CommandError::UnknownMode(target) => write!(f, "unknown mode `{target}`"),
            CommandError::Rejected { command, mode } => {
                write!(f, "{command} rejected for {mode}")
            }
        }
    }
}

impl<'a> From<ParseError<'a>> for CommandError<'a> {
    fn from(err: ParseError<'a>) -> Self {
        CommandError::Parse(err)
    }
}

/// Parses `line` and applies it to `control`.
///
/// # Errors
///
/// See [`execute`]; parse failures are reported as [`CommandError::Parse`].
pub fn run_line<'a, const N: usize>(
    line: &'a str,
    control: &mut dyn ModeControl,
    directory: &ModeDirectory<N>,
) -> Result<Action<'a>, CommandError<'a>> {
    let command = grammar::parse(line)?;
    execute(command, control, directory)
}

/// Applies a parsed command.
///
/// Control commands stage requests on `control`; the remaining commands are
/// handed back as an [`Action`] for the host to carry out.
///
/// # Errors
///
/// Returns [`CommandError::UnknownMode`] when a target cannot be resolved and
/// [`CommandError::Rejected`] when the scheduler refuses the request.
pub fn execute<'a, const N: usize>(
    command: Command<'a>,
    control: &mut dyn ModeControl,
    directory: &ModeDirectory<N>,
) -> Result<Action<'a>, CommandError<'a>> {
    match command {
        Command::Begin(target) => {
            let id = resolve(directory, control, target)?;
            require(control.begin_mode(id), "begin", id)
        }
        Command::Stop(target) => {
            let id = resolve(directory, control, target)?;
            require(control.stop_mode(id), "stop", id)
        }
        Command::Only(target) => {
            let id = resolve(directory, control, target)?;
            let accepted = control.stop_all_except(id) || control.mode_active(id);
            require(accepted, "only", id)
        }
        Command::StopAll => {
            control.stop_all();
            Ok(Action::Requested)
        }
        Command::Pause => require(control.pause(), "pause", ReservedMode::Pause.id()),
        Command::Resume => require(control.resume(), "resume", ReservedMode::Pause.id()),
        Command::Exit => require(control.exit(), "exit", ReservedMode::Exit.id()),
        Command::Reset => require(control.reset(), "reset", ReservedMode::Reset.id()),
        Command::Reboot => require(control.reboot(), "reboot", ReservedMode::Reboot.id()),
        Command::Tick(tick) => Ok(Action::Tick(tick)),
        Command::Status => Ok(Action::Status),
        Command::Help(help) => Ok(Action::Help(help.topic)),
    }
}

fn resolve<'a, const N: usize>(
    directory: &ModeDirectory<N>,
    control: &dyn ModeControl,
    target: Target<'a>,
) -> Result<ModeId, CommandError<'a>> {
    directory
        .resolve(target)
        .filter(|id| control.got_mode(*id))
        .ok_or(CommandError::UnknownMode(target))
}

fn require<'a>(
    accepted: bool,
    command: &'static str,
    mode: ModeId,
) -> Result<Action<'a>, CommandError<'a>> {
    if accepted {
        Ok(Action::Requested)
    } else {
        Err(CommandError::Rejected { command, mode })
    }
}
