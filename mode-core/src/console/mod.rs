//! Line-oriented console for driving a scheduler by hand.
//!
//! A line such as `begin recorder` or `tick 5 every 100ms` is lexed and parsed
//! by [`grammar`], then applied to any [`ModeControl`](crate::ModeControl) by
//! [`commands::execute`]. Mode names are resolved through a [`ModeDirectory`].

pub mod commands;
pub mod grammar;

pub use commands::{Action, COMMAND_HELP, CommandError, ModeDirectory, execute, help_for, run_line};
pub use grammar::{Command, ParseError, Target, TickCommand, parse};
