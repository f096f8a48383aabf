use argh::FromArgs;
use pipesh::Interpreter;
use std::process::ExitCode;

#[derive(FromArgs)]
/// A small shell that runs pipelines of external programs.
struct Options {
    /// prompt printed before each line (default: "$ ")
    #[argh(option, default = "String::from(\"$ \")")]
    prompt: String,

    /// run this single line instead of reading lines interactively
    #[argh(option, short = 'c')]
    command: Option<String>,

    /// log debug events to stderr (RUST_LOG takes precedence)
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let options: Options = argh::from_env();
    setup_logging(options.verbose);

    let mut shell = Interpreter::default();
    let code = match options.command {
        Some(line) => shell.run_line(&line),
        None => shell.repl(&options.prompt)?,
    };

    if shell.should_exit() {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(ExitCode::from(code.clamp(0, 255) as u8))
}
