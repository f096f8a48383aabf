use crate::env::Environment;
use anyhow::Result;
use std::io::{Read, Write};
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// How an output redirect treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: the file is truncated before the stage writes to it.
    Truncate,
    /// `>>`: the stage's output is added after the existing contents.
    Append,
}

/// Target of a `>` or `>>` redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: PathBuf,
    pub mode: RedirectMode,
}

/// One stage of a pipeline.
///
/// `arguments[0]` names the program or builtin. A descriptor without
/// arguments is valid and does nothing when executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub arguments: Vec<String>,
    /// Path to read standard input from, taking precedence over a pipe.
    pub input_redirect: Option<PathBuf>,
    /// Path to write standard output to, taking precedence over a pipe.
    pub output_redirect: Option<OutputRedirect>,
}

impl CommandDescriptor {
    /// Name of the program or builtin, if the stage has any arguments.
    pub fn program(&self) -> Option<&str> {
        self.arguments.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

/// Ordered chain of stages parsed from one input line.
///
/// Stage `n` writes to the input of stage `n + 1`. A pipeline always holds at
/// least one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<CommandDescriptor>,
}

impl Pipeline {
    /// Build a pipeline from its stages; an empty list becomes a single
    /// no-op stage.
    pub fn new(mut stages: Vec<CommandDescriptor>) -> Self {
        if stages.is_empty() {
            stages.push(CommandDescriptor::default());
        }
        Self { stages }
    }

    pub fn stages(&self) -> &[CommandDescriptor] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Object-safe trait for a command that runs inside the interpreter process.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pipeline_gets_noop_stage() {
        let pipeline = Pipeline::new(Vec::new());
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.stages()[0].is_empty());
        assert_eq!(pipeline.stages()[0].program(), None);
    }

    #[test]
    fn test_program_is_first_argument() {
        let stage = CommandDescriptor {
            arguments: vec!["ls".to_string(), "-l".to_string()],
            ..Default::default()
        };
        assert_eq!(stage.program(), Some("ls"));
        assert!(!stage.is_empty());
    }
}
