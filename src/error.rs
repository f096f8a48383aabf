//! Error types for parsing and running pipelines.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning tokens into a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A redirection operator was the last token on the line.
    #[error("syntax error: expected a file name after `{operator}`")]
    MalformedRedirect {
        /// The operator text, e.g. `>>`.
        operator: String,
    },
}

/// Errors raised while executing a pipeline.
///
/// `LaunchFailure` and `RedirectionFailure` only affect the stage they name;
/// the executor reports them and keeps going. `ResourceExhaustion` aborts the
/// whole run.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{program}: {}", launch_reason(.source))]
    LaunchFailure {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    RedirectionFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot set up pipeline: {0}")]
    ResourceExhaustion(#[from] nix::Error),
}

impl ShellError {
    /// Exit status a stage gets when this error stops it from running.
    pub fn stage_status(&self) -> i32 {
        match self {
            ShellError::Parse(_) => 2,
            ShellError::LaunchFailure { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                127
            }
            ShellError::LaunchFailure { .. } => 126,
            ShellError::RedirectionFailure { .. } => 1,
            ShellError::ResourceExhaustion(_) => 1,
        }
    }

    /// Print the diagnostic on the interpreter's standard error.
    pub(crate) fn report(&self) {
        tracing::debug!(error = ?self, "reporting error");
        eprintln!("pipesh: {}", self);
    }
}

fn launch_reason(source: &io::Error) -> String {
    if source.kind() == io::ErrorKind::NotFound {
        "command not found".to_string()
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_and_status() {
        let err = ShellError::LaunchFailure {
            program: "nosuchprog".to_string(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(err.to_string(), "nosuchprog: command not found");
        assert_eq!(err.stage_status(), 127);
    }

    #[test]
    fn test_permission_denied_is_126() {
        let err = ShellError::LaunchFailure {
            program: "./script".to_string(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(err.stage_status(), 126);
    }

    #[test]
    fn test_malformed_redirect_message() {
        let err = ShellError::from(ParseError::MalformedRedirect {
            operator: ">>".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "syntax error: expected a file name after `>>`"
        );
        assert_eq!(err.stage_status(), 2);
    }
}
