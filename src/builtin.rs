use crate::command::{CommandDescriptor, CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use anyhow::{Context, Result, bail};
use argh::{EarlyExit, FromArgs};
use std::fs;
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins run directly in the interpreter process, so their effects on the
/// [`Environment`] are visible to later stages and lines.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Build the command from its arguments (without the name).
    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Executes the command using provided IO streams and environment.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    fn execute(
        self,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let result = <T as BuiltinCommand>::execute(*self, stdin, stdout, env);
        let flushed = stdout.flush();
        let result = result.and_then(|code| Ok(flushed.map(|()| code)?));
        match result {
            Ok(x) => Ok(x),
            Err(e) if is_broken_pipe(&e) => {
                tracing::debug!(builtin = T::name(), "reader closed; output dropped");
                Ok(0)
            }
            Err(e) => {
                eprintln!("{}: {:#}", T::name(), e);
                Ok(1)
            }
        }
    }
}

struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            eprintln!("{}", self.output);
            Ok(1)
        } else {
            writeln!(stdout, "{}", self.output)?;
            stdout.flush()?;
            Ok(0)
        }
    }
}

/// Factory allows creating instances of a [`BuiltinCommand`].
pub(crate) struct Factory<T> {
    _phantom: PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::parse(args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

/// Outcome of offering a stage to the builtin dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The stage named a builtin, which ran and returned this status.
    Handled(ExitCode),
    /// The stage is empty or names an external program.
    NotHandled,
}

/// Recognizes and runs interpreter-local commands.
pub struct Builtins {
    factories: Vec<Box<dyn CommandFactory>>,
}

impl Builtins {
    /// Create a dispatcher with a custom set of command factories.
    pub fn new(factories: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { factories }
    }

    /// Create the builtin for `arguments`, or `None` if `arguments[0]` is not
    /// a builtin name (or there are no arguments).
    pub fn resolve(&self, arguments: &[String]) -> Option<Box<dyn ExecutableCommand>> {
        let (name, rest) = arguments.split_first()?;
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        self.factories
            .iter()
            .find_map(|factory| factory.try_create(name, &args))
    }

    /// Run `stage` in-process if it names a builtin.
    pub fn try_builtin(
        &self,
        stage: &CommandDescriptor,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Dispatch {
        match self.resolve(&stage.arguments) {
            Some(cmd) => Dispatch::Handled(run_builtin(cmd, stdin, stdout, env)),
            None => Dispatch::NotHandled,
        }
    }
}

impl Default for Builtins {
    /// The shell's builtins: `exit`, `cd`, `pwd`, `echo` and `type`.
    fn default() -> Self {
        Self::new(vec![
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Pwd>::default()),
            Box::new(Factory::<Echo>::default()),
            Box::new(Factory::<Type>::default()),
        ])
    }
}

/// A reader that went away early is not the builtin's failure.
fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<io::Error>()
        .is_some_and(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

/// Execute an already resolved builtin, turning I/O errors into a status.
pub(crate) fn run_builtin(
    cmd: Box<dyn ExecutableCommand>,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    env: &mut Environment,
) -> ExitCode {
    match cmd.execute(stdin, stdout, env) {
        Ok(code) => code,
        Err(e) if is_broken_pipe(&e) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "builtin failed to write its output");
            1
        }
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::name()], args)
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory. Defaults to $HOME when omitted.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::name()], args)
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => match env.get_var("HOME") {
                Some(home) => PathBuf::from(home),
                None => bail!("HOME not set"),
            },
        };

        let new_dir = env.resolve(&target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("{}", target.display()))?;
        if !canonical.is_dir() {
            bail!("{}: Not a directory", target.display());
        }

        tracing::debug!(dir = %canonical.display(), "changed directory");
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0.
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::name()], args)
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        _stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        env.should_exit = true;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces and followed
/// by a newline.
///
/// Unlike the other builtins, `echo` takes no options: every argument is
/// printed as-is.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        writeln!(stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Describe a command name as a shell builtin.
pub struct Type {
    #[argh(positional, greedy)]
    /// the name to describe; only the first one is reported.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::name()], args)
    }

    fn execute(
        self,
        _stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if let Some(name) = self.names.first() {
            writeln!(stdout, "{} is a shell builtin", name)?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn test_env(dir: PathBuf) -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: dir,
            should_exit: false,
        }
    }

    fn stage(args: &[&str]) -> CommandDescriptor {
        CommandDescriptor {
            arguments: args.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Dispatch `args` through the default builtins and capture stdout.
    fn dispatch(args: &[&str], env: &mut Environment) -> (Dispatch, String) {
        let mut out = Vec::new();
        let result = Builtins::default().try_builtin(
            &stage(args),
            &mut Cursor::new(Vec::new()),
            &mut out,
            env,
        );
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_echo_joins_arguments() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, out) = dispatch(&["echo", "a", "b", "c"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(out, "a b c\n");
    }

    #[test]
    fn test_echo_alone_prints_newline() {
        let mut env = test_env(PathBuf::from("/"));
        let (_, out) = dispatch(&["echo"], &mut env);
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_echo_prints_dashes_literally() {
        let mut env = test_env(PathBuf::from("/"));
        let (_, out) = dispatch(&["echo", "-n", "--help", "x"], &mut env);
        assert_eq!(out, "-n --help x\n");
    }

    #[test]
    fn test_pwd_prints_session_dir() {
        let mut env = test_env(PathBuf::from("/some/where"));
        let (result, out) = dispatch(&["pwd"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(out, "/some/where\n");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let temp = TempDir::new().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        let mut env = test_env(PathBuf::from("/"));

        let target = canonical.to_string_lossy().to_string();
        let (result, _) = dispatch(&["cd", &target], &mut env);

        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(env.current_dir, canonical);
    }

    #[test]
    fn test_cd_relative_to_session_dir() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        let mut env = test_env(canonical.clone());

        let (result, _) = dispatch(&["cd", "sub"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(env.current_dir, canonical.join("sub"));

        let (result, _) = dispatch(&["cd", ".."], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(env.current_dir, canonical);
    }

    #[test]
    fn test_cd_to_home_when_none() {
        let temp = TempDir::new().unwrap();
        let canonical = fs::canonicalize(temp.path()).unwrap();
        let mut env = test_env(PathBuf::from("/"));
        env.set_var("HOME", canonical.to_string_lossy().to_string());

        let (result, _) = dispatch(&["cd"], &mut env);

        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(env.current_dir, canonical);
    }

    #[test]
    fn test_cd_without_home_fails() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, _) = dispatch(&["cd"], &mut env);
        assert_eq!(result, Dispatch::Handled(1));
        assert_eq!(env.current_dir, PathBuf::from("/"));
    }

    #[test]
    fn test_cd_nonexistent_path_keeps_dir() {
        let temp = TempDir::new().unwrap();
        let mut env = test_env(temp.path().to_path_buf());

        let (result, _) = dispatch(&["cd", "does_not_exist"], &mut env);

        assert_eq!(result, Dispatch::Handled(1));
        assert_eq!(env.current_dir, temp.path());
        assert!(!env.should_exit);
    }

    #[test]
    fn test_cd_to_file_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("plain"), "x").unwrap();
        let mut env = test_env(temp.path().to_path_buf());

        let (result, _) = dispatch(&["cd", "plain"], &mut env);

        assert_eq!(result, Dispatch::Handled(1));
        assert_eq!(env.current_dir, temp.path());
    }

    #[test]
    fn test_type_reports_builtin() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, out) = dispatch(&["type", "ls"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert_eq!(out, "ls is a shell builtin\n");

        let (_, out) = dispatch(&["type"], &mut env);
        assert_eq!(out, "");
    }

    #[test]
    fn test_exit_sets_flag() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, out) = dispatch(&["exit", "3"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert!(env.should_exit);
        assert_eq!(out, "");
    }

    #[test]
    fn test_help_goes_to_stdout() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, out) = dispatch(&["cd", "--help"], &mut env);
        assert_eq!(result, Dispatch::Handled(0));
        assert!(out.contains("Usage: cd"));
    }

    #[test]
    fn test_bad_arguments_fail() {
        let mut env = test_env(PathBuf::from("/"));
        let (result, out) = dispatch(&["cd", "a", "b"], &mut env);
        assert_eq!(result, Dispatch::Handled(1));
        assert_eq!(out, "");
    }

    #[test]
    fn test_unknown_and_empty_not_handled() {
        let mut env = test_env(PathBuf::from("/"));
        assert_eq!(dispatch(&["ls", "-l"], &mut env).0, Dispatch::NotHandled);
        assert_eq!(dispatch(&[], &mut env).0, Dispatch::NotHandled);
        assert_eq!(dispatch(&["Echo", "x"], &mut env).0, Dispatch::NotHandled);
    }

    /// A writer whose reader has already gone away.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_closed_reader_is_not_an_error() {
        let mut env = test_env(PathBuf::from("/"));
        let result = Builtins::default().try_builtin(
            &stage(&["echo", "nobody", "listens"]),
            &mut io::empty(),
            &mut ClosedPipe,
            &mut env,
        );
        assert_eq!(result, Dispatch::Handled(0));
    }
}
