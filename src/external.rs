use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use std::ffi::OsStr;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Spawn the external program named by `arguments[0]`.
///
/// The program is looked up with [`find_command_path`] using the session's
/// `PATH`. It runs in the session's working directory with the session's
/// variables, and keeps `arguments[0]` as its `argv[0]`.
pub(crate) fn launch(
    arguments: &[String],
    env: &Environment,
    stdin: Stdio,
    stdout: Stdio,
) -> Result<Child, ShellError> {
    let Some((name, args)) = arguments.split_first() else {
        return Err(ShellError::LaunchFailure {
            program: String::new(),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
    };

    let search_paths = env.get_var("PATH").unwrap_or_default();
    let program = find_command_path(
        OsStr::new(search_paths),
        &env.current_dir,
        Path::new(name),
    )
    .ok_or_else(|| ShellError::LaunchFailure {
        program: name.clone(),
        source: io::Error::from(io::ErrorKind::NotFound),
    })?;

    let mut cmd = Command::new(&program);
    cmd.arg0(name)
        .args(args)
        .env_clear()
        .envs(env.vars.iter())
        .current_dir(&env.current_dir)
        .stdin(stdin)
        .stdout(stdout);

    let child = cmd.spawn().map_err(|source| ShellError::LaunchFailure {
        program: name.clone(),
        source,
    })?;
    tracing::debug!(pid = child.id(), program = %program.display(), "spawned stage");
    Ok(child)
}

/// Convert a child's exit status into a shell exit code.
pub(crate) fn exit_code(status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

fn terminated_by_signal(exit_status: ExitStatus) -> ExitCode {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = exit_status.signal() {
        128 + signal
    } else if exit_status.core_dumped() {
        255
    } else {
        -1
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names an executable file.
/// - Any path containing a separator (e.g. `./foo`, `bin/sh`): resolved
///   against `cwd` and returned if it names an executable file.
/// - Single path component: search each directory in `search_paths` (PATH)
///   and return the first executable match. Empty PATH entries mean `cwd`.
/// - Empty path: returns `None`.
pub fn find_command_path(search_paths: &OsStr, cwd: &Path, path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return find_by_path(path);
    }

    let mut components = path.components();
    match (components.next(), components.next()) {
        (None, _) => None,
        (Some(x), None) => find_in_path(search_paths, cwd, x.as_os_str()),
        _ => find_by_path(&cwd.join(path)),
    }
}

fn find_in_path(search_paths: &OsStr, cwd: &Path, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| if dir.as_os_str().is_empty() { cwd.to_path_buf() } else { cwd.join(dir) })
        .find_map(|dir| find_by_path(&dir.join(cmd)))
}

fn find_by_path(path: &Path) -> Option<PathBuf> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = path.metadata().ok()?;
    if metadata.is_file() && metadata.permissions().mode() & 0o111 != 0 {
        Some(path.to_path_buf())
    } else {
        None
    }
}
