use crate::builtin::Builtins;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use crate::{lexer, parser, pipeline};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// A minimal shell that runs pipelines of builtin and external commands.
///
/// The interpreter owns the session [`Environment`] and the [`Builtins`]
/// dispatcher. Each call to [`run_line`](Interpreter::run_line) drives one
/// line through lexer, parser and pipeline executor.
///
/// Example
/// ```
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello world");
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: Builtins,
}

impl Interpreter {
    /// Create an interpreter with a custom environment and set of builtins.
    pub fn new(env: Environment, builtins: Builtins) -> Self {
        Self { env, builtins }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// True once `exit` has run.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Parse and execute one line, returning the pipeline's exit code.
    ///
    /// Errors are reported on standard error and turned into a status; they
    /// never end the session.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        match self.try_run_line(line) {
            Ok(code) => code,
            Err(err) => {
                err.report();
                err.stage_status()
            }
        }
    }

    fn try_run_line(&mut self, line: &str) -> Result<ExitCode, ShellError> {
        let tokens = lexer::tokenize(line);
        let pipeline = parser::parse(tokens)?;
        let status = pipeline::run(&pipeline, &self.builtins, &mut self.env)?;
        tracing::debug!(stages = ?status.stages, "pipeline finished");
        Ok(status.code())
    }

    /// Read-eval loop: prompt, read a line, run it, until EOF or `exit`.
    ///
    /// Returns the status of the last line that ran. Lines are not added to
    /// any history.
    pub fn repl(&mut self, prompt: &str) -> rustyline::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;
        let mut last = 0;

        while !self.should_exit() {
            match rl.readline(prompt) {
                Ok(line) => {
                    last = self.run_line(&line);
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C drops the current line only.
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err),
            }
        }

        if self.should_exit() {
            last = 0;
        }
        Ok(last)
    }
}

impl Default for Interpreter {
    /// Create an interpreter from the process environment with the default builtins.
    fn default() -> Self {
        Self::new(Environment::new(), Builtins::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn interpreter_in(dir: &TempDir) -> Interpreter {
        let mut sh = Interpreter::default();
        sh.env_mut().current_dir = fs::canonicalize(dir.path()).unwrap();
        sh
    }

    #[test]
    fn test_malformed_redirect_runs_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut sh = interpreter_in(&tmp);
        assert_eq!(sh.run_line("echo hi > out.txt | cat >"), 2);
        assert!(!tmp.path().join("out.txt").exists());
        assert_eq!(sh.run_line("echo ok > out.txt"), 0);
        assert_eq!(fs::read_to_string(tmp.path().join("out.txt")).unwrap(), "ok\n");
    }

    #[test]
    fn test_status_is_last_stage() {
        let tmp = TempDir::new().unwrap();
        let mut sh = interpreter_in(&tmp);
        assert_eq!(sh.run_line("true | false"), 1);
        assert_eq!(sh.run_line("false | true"), 0);
        assert_eq!(sh.run_line("nope-not-here"), 127);
    }

    #[test]
    fn test_session_survives_unknown_command() {
        let tmp = TempDir::new().unwrap();
        let mut sh = interpreter_in(&tmp);
        assert_eq!(sh.run_line("nope-not-here --flag"), 127);
        assert_eq!(sh.run_line("echo alive > out.txt"), 0);
        assert_eq!(fs::read_to_string(tmp.path().join("out.txt")).unwrap(), "alive\n");
        assert!(!sh.should_exit());
    }

    #[test]
    fn test_pwd_after_cd() {
        let tmp = TempDir::new().unwrap();
        let mut sh = interpreter_in(&tmp);
        assert_eq!(sh.run_line("cd /tmp"), 0);
        let tmp_dir = fs::canonicalize("/tmp").unwrap();
        assert_eq!(sh.env().current_dir, tmp_dir);

        assert_eq!(sh.run_line("cd /definitely/not/a/dir"), 1);
        assert_eq!(sh.env().current_dir, tmp_dir);
    }

    #[test]
    fn test_exit_stops_session() {
        let tmp = TempDir::new().unwrap();
        let mut sh = interpreter_in(&tmp);
        assert_eq!(sh.run_line("exit"), 0);
        assert!(sh.should_exit());
    }
}
