//! CLI error type and exit codes.

use std::path::PathBuf;
use supplysim_env::SimError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("invalid event '{0}': expected <scenario>@<tick>")]
    BadEvent(String),

    #[error("--frame-every must be at least 1")]
    BadFrameInterval,

    #[error("failed to write export to {path}: {source}")]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error. Usage errors exit with 2.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Sim(SimError::Profile(_))
            | CliError::Sim(SimError::UnknownScenario(_))
            | CliError::Sim(SimError::UnknownVolatility(_))
            | CliError::BadEvent(_)
            | CliError::BadFrameInterval => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::BadEvent("x".into()).exit_code(), 2);
        assert_eq!(CliError::Sim(SimError::profile("bad")).exit_code(), 2);
        assert_eq!(CliError::Sim(SimError::ChannelClosed).exit_code(), 1);
    }
}
