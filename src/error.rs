//! Error taxonomy for the workspace manifest engine, plus the CLI-facing
//! wrapper that turns any of them into an exit code.

use std::path::PathBuf;

/// The errors the core can raise, one variant per kind in the error
/// handling design. Each carries enough context (path, crate name, argv,
/// exit code, stderr tail) to be reported without the caller reconstructing
/// it.
#[derive(Debug, thiserror::Error)]
pub enum LadingError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid version `{0}`: expected MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]")]
    InvalidVersion(String),

    #[error("failed to run `cargo metadata`: {0}")]
    CargoMetadata(#[from] cargo_metadata::Error),

    #[error("failed to parse manifest at {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("workspace invariant violated: {0}")]
    WorkspaceInvariant(String),

    #[error("publish plan error: {0}")]
    PublishPlan(String),

    #[error("staging error: {0}")]
    Staging(String),

    #[error("workspace is dirty, refusing to continue:\n{0}")]
    DirtyWorkspace(String),

    #[error("pre-flight command failed: `{argv}` (exit {exit_code})\n{stderr_tail}")]
    Preflight {
        argv: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error(
        "publish step failed for `{krate}` during `{stage}` (exit {exit_code})\n{stderr_tail}"
    )]
    PublishStep {
        krate: String,
        stage: String,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("attempted to run unregistered program `{0}`")]
    UnknownProgram(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LadingError {
    pub fn manifest_parse(path: impl Into<PathBuf>, source: toml_edit::TomlError) -> Self {
        Self::ManifestParse {
            path: path.into(),
            source,
        }
    }
}

/// CLI-facing error: an optional message plus a process exit code, so that
/// "no message, just a code" (e.g. a declined confirmation prompt) is
/// expressible without allocating a dummy error value.
#[derive(Debug)]
pub struct CliError {
    error: Option<anyhow::Error>,
    code: i32,
}

impl CliError {
    pub fn silent(code: i32) -> Self {
        Self { error: None, code }
    }

    pub fn message(e: impl Into<anyhow::Error>) -> Self {
        Self {
            error: Some(e.into()),
            code: 101,
        }
    }
}

macro_rules! cli_error_from {
    ($from:ty) => {
        impl From<$from> for CliError {
            fn from(error: $from) -> Self {
                Self::message(error)
            }
        }
    };
}

cli_error_from!(anyhow::Error);
cli_error_from!(std::io::Error);
cli_error_from!(LadingError);
cli_error_from!(cargo_metadata::Error);

impl From<i32> for CliError {
    fn from(code: i32) -> Self {
        Self::silent(code)
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if let Some(error) = self.error.as_ref() {
            error.fmt(f)
        } else {
            Ok(())
        }
    }
}

/// Report any error message and exit.
pub fn exit(result: Result<(), CliError>) -> ! {
    let code = report(result);
    std::process::exit(code)
}

/// Report, delegating exiting to the caller.
pub fn report(result: Result<(), CliError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            if let Some(error) = err.error {
                // At this point, we might be exiting due to a broken pipe, just do our best and
                // move on.
                let _ = crate::ops::shell::error(error);
            }
            err.code
        }
    }
}

pub type LadingResult<T> = Result<T, LadingError>;
pub type CargoResult<T> = anyhow::Result<T>;
