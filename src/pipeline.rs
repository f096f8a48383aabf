//! Pipeline executor.
//!
//! [`run`] connects the stages of a [`Pipeline`] with OS pipes and executes
//! them in three passes:
//!
//! 1. exactly `N - 1` pipes are created, then the stages are started strictly
//!    left to right. File redirects replace the pipe ends they override. A
//!    builtin runs in-process into a buffer, an external stage is spawned.
//!    A builtin therefore sees every earlier stage started, and its effect on
//!    the [`Environment`] (`cd`, `exit`) applies to every later stage;
//! 2. each builtin's buffered output is written to its stage's output;
//! 3. every spawned child is waited for, in stage order.
//!
//! All stages are started before any is waited for or written to, so a stage
//! blocked on a full pipe always has a running reader. Every descriptor is an
//! [`OwnedFd`] created with `O_CLOEXEC`: it is closed exactly once, either
//! when its ownership moves into a child's `Stdio` (closed in the parent right
//! after spawn) or when it is dropped, on success and error paths alike.

use crate::builtin::{Builtins, run_builtin};
use crate::command::{CommandDescriptor, ExitCode, Pipeline, RedirectMode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::external;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::process::{Child, Stdio};

/// Exit codes of a finished pipeline, one per stage in stage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub stages: Vec<ExitCode>,
}

impl PipelineStatus {
    /// Status of the pipeline as a whole: the last stage's code.
    pub fn code(&self) -> ExitCode {
        self.stages.last().copied().unwrap_or(0)
    }
}

/// Where a stage's standard input comes from.
#[derive(Debug)]
enum Input {
    /// The interpreter's own standard input.
    Inherit,
    Fd(OwnedFd),
}

/// Where a stage's standard output goes.
#[derive(Debug)]
enum Output {
    /// The interpreter's own standard output.
    Inherit,
    Fd(OwnedFd),
}

impl Input {
    fn into_stdio(self) -> Stdio {
        match self {
            Input::Inherit => Stdio::inherit(),
            Input::Fd(fd) => Stdio::from(fd),
        }
    }
}

impl Output {
    fn into_stdio(self) -> Stdio {
        match self {
            Output::Inherit => Stdio::inherit(),
            Output::Fd(fd) => Stdio::from(fd),
        }
    }
}

#[derive(Debug)]
struct Wiring {
    input: Input,
    output: Output,
}

/// Allocate the pipes joining `count` stages.
///
/// Stage `i` writes into pipe `i` and stage `i + 1` reads from it; the first
/// stage reads and the last stage writes the interpreter's own streams.
fn wire(count: usize) -> Result<Vec<Wiring>, ShellError> {
    let mut wiring = Vec::with_capacity(count);
    let mut feed_in = Input::Inherit;
    for index in 0..count {
        let (next_feed, output) = if index + 1 < count {
            let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC)?;
            tracing::trace!(index, ?read_end, ?write_end, "created pipe");
            (Input::Fd(read_end), Output::Fd(write_end))
        } else {
            (Input::Inherit, Output::Inherit)
        };
        let input = std::mem::replace(&mut feed_in, next_feed);
        wiring.push(Wiring { input, output });
    }
    Ok(wiring)
}

/// Replace piped descriptors with the stage's redirect files.
///
/// The overridden pipe end is dropped, and so closed, here.
fn apply_redirects(
    stage: &CommandDescriptor,
    wiring: &mut Wiring,
    env: &Environment,
) -> Result<(), ShellError> {
    if let Some(path) = &stage.input_redirect {
        let file = File::open(env.resolve(path)).map_err(|source| {
            ShellError::RedirectionFailure {
                path: path.clone(),
                source,
            }
        })?;
        wiring.input = Input::Fd(file.into());
    }

    if let Some(redirect) = &stage.output_redirect {
        let mut options = OpenOptions::new();
        options.write(true).create(true).mode(0o644);
        match redirect.mode {
            RedirectMode::Truncate => options.truncate(true),
            RedirectMode::Append => options.append(true),
        };
        let file = options.open(env.resolve(&redirect.path)).map_err(|source| {
            ShellError::RedirectionFailure {
                path: redirect.path.clone(),
                source,
            }
        })?;
        wiring.output = Output::Fd(file.into());
    }
    Ok(())
}

/// A stage after the ordered pass.
enum Started {
    Done(ExitCode),
    /// A builtin that has already run. Its output is held back until every
    /// stage is started.
    Builtin {
        name: String,
        code: ExitCode,
        buffered: Vec<u8>,
        output: Output,
    },
    Running(Child),
}

/// A stage after its output has been delivered.
enum Launched {
    Done(ExitCode),
    Running(Child),
}

fn start_stage(
    stage: &CommandDescriptor,
    mut wiring: Wiring,
    builtins: &Builtins,
    env: &mut Environment,
) -> Started {
    let Some(name) = stage.program() else {
        return Started::Done(0);
    };
    if let Err(err) = apply_redirects(stage, &mut wiring, env) {
        err.report();
        return Started::Done(err.stage_status());
    }

    if let Some(cmd) = builtins.resolve(&stage.arguments) {
        // Builtins never read standard input; closing it now lets an
        // upstream writer see EPIPE instead of blocking.
        drop(wiring.input);
        let mut buffered = Vec::new();
        let code = run_builtin(cmd, &mut io::empty(), &mut buffered, env);
        return Started::Builtin {
            name: name.to_string(),
            code,
            buffered,
            output: wiring.output,
        };
    }

    let stdin = wiring.input.into_stdio();
    let stdout = wiring.output.into_stdio();
    match external::launch(&stage.arguments, env, stdin, stdout) {
        Ok(child) => Started::Running(child),
        Err(err) => {
            err.report();
            Started::Done(err.stage_status())
        }
    }
}

/// Write a builtin's held-back output, closing its output end afterwards.
fn deliver(buffered: &[u8], output: Output) -> io::Result<()> {
    match output {
        Output::Inherit => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(buffered)?;
            stdout.flush()
        }
        Output::Fd(fd) => File::from(fd).write_all(buffered),
    }
}

fn finish_builtin(name: &str, code: ExitCode, buffered: &[u8], output: Output) -> ExitCode {
    match deliver(buffered, output) {
        Ok(()) => code,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            tracing::debug!(builtin = name, "reader closed; output dropped");
            code
        }
        Err(e) => {
            tracing::warn!(builtin = name, error = %e, "failed to deliver builtin output");
            eprintln!("{}: {}", name, e);
            1
        }
    }
}

fn wait_child(mut child: Child) -> ExitCode {
    let pid = child.id();
    match child.wait() {
        Ok(status) => {
            let code = external::exit_code(status);
            tracing::debug!(pid, code, "stage exited");
            code
        }
        Err(e) => {
            tracing::warn!(pid, error = %e, "failed to wait for stage");
            1
        }
    }
}

/// Execute `pipeline`, returning once every started stage has finished.
///
/// Stage-local failures (a program that cannot be launched, a redirect that
/// cannot be opened) are reported on standard error and recorded as that
/// stage's status; the other stages still run. Only a failure to create the
/// pipes themselves aborts the run, before any stage has started.
///
/// Once `exit` has run, no later stage is started and the returned status
/// only covers the stages before it and `exit` itself.
pub fn run(
    pipeline: &Pipeline,
    builtins: &Builtins,
    env: &mut Environment,
) -> Result<PipelineStatus, ShellError> {
    let wiring = wire(pipeline.len())?;
    tracing::debug!(
        stages = pipeline.len(),
        pipes = pipeline.len() - 1,
        "running pipeline"
    );

    // Anything buffered must reach the terminal before children write to it.
    if let Err(e) = io::stdout().flush() {
        tracing::warn!(error = %e, "failed to flush standard output");
    }

    let mut started = Vec::with_capacity(pipeline.len());
    for (stage, wiring) in pipeline.stages().iter().zip(wiring) {
        if env.should_exit {
            tracing::debug!(
                skipped = pipeline.len() - started.len(),
                "exit requested; remaining stages not started"
            );
            break;
        }
        started.push(start_stage(stage, wiring, builtins, env));
    }

    let launched: Vec<Launched> = started
        .into_iter()
        .map(|stage| match stage {
            Started::Done(code) => Launched::Done(code),
            Started::Builtin {
                name,
                code,
                buffered,
                output,
            } => Launched::Done(finish_builtin(&name, code, &buffered, output)),
            Started::Running(child) => Launched::Running(child),
        })
        .collect();

    let stages = launched
        .into_iter()
        .map(|stage| match stage {
            Launched::Done(code) => code,
            Launched::Running(child) => wait_child(child),
        })
        .collect();

    Ok(PipelineStatus { stages })
}
