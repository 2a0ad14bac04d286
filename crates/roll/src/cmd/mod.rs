//! Subcommand implementations and their shared error shape.

pub mod archive;
pub mod feed;
pub mod stream;

/// Exit code for construction failures: bad flags, missing datadir,
/// factory errors at open.
pub const SETUP_FAILURE: u8 = 2;

/// Exit code for failures once the stream is running.
pub const RUNTIME_FAILURE: u8 = 1;

/// A command failure paired with the process exit code it maps to.
#[derive(Debug)]
pub struct CmdError {
    pub code: u8,
    pub source: anyhow::Error,
}

impl CmdError {
    pub fn setup(source: impl Into<anyhow::Error>) -> Self {
        Self {
            code: SETUP_FAILURE,
            source: source.into(),
        }
    }

    pub fn runtime(source: impl Into<anyhow::Error>) -> Self {
        Self {
            code: RUNTIME_FAILURE,
            source: source.into(),
        }
    }
}

pub type CmdResult = Result<(), CmdError>;
