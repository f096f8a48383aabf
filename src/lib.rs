//! A small interactive shell that runs pipelines of external programs.
//!
//! A line of input goes through three stages: the [`lexer`] splits it into
//! tokens, the [`parser`] groups them into a [`Pipeline`] of
//! [`CommandDescriptor`]s, and the [`pipeline`] executor connects the stages
//! with OS pipes, applies file redirections, spawns one process per external
//! stage and waits for all of them. A handful of builtins (`cd`, `pwd`,
//! `echo`, `type`, `exit`) run inside the interpreter process instead.
//!
//! The main entry point is [`Interpreter`], which owns the session
//! [`Environment`] and drives lexer, parser and executor once per line.

mod builtin;
pub mod command;
pub mod env;
pub mod error;
mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;

pub use builtin::{Builtins, Dispatch};
pub use command::{CommandDescriptor, ExitCode, OutputRedirect, Pipeline, RedirectMode};
pub use env::Environment;
pub use error::{ParseError, ShellError};

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
