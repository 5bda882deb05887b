//! Startup stages and their exit codes

use std::fmt;

/// Phase of daemon startup; each maps to its own process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Config,
    Relays,
    Ecus,
    Channels,
}

impl StartupStage {
    pub fn exit_code(self) -> u8 {
        match self {
            StartupStage::Config => 2,
            StartupStage::Relays => 3,
            StartupStage::Ecus => 4,
            StartupStage::Channels => 5,
        }
    }
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupStage::Config => "configuration",
            StartupStage::Relays => "relay",
            StartupStage::Ecus => "ECU",
            StartupStage::Channels => "channel",
        })
    }
}

/// Startup failure tagged with the stage that failed
#[derive(Debug, thiserror::Error)]
#[error("{stage} startup failed: {reason:#}")]
pub struct StartupError {
    pub stage: StartupStage,
    pub reason: anyhow::Error,
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        self.stage.exit_code()
    }
}

/// Tag an error with the stage it happened in
pub trait StageContext<T> {
    fn stage(self, stage: StartupStage) -> Result<T, StartupError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn stage(self, stage: StartupStage) -> Result<T, StartupError> {
        self.map_err(|e| StartupError {
            stage,
            reason: e.into(),
        })
    }
}
