use thiserror::Error;

use nettvakt_capture::CaptureError;
use nettvakt_config::ConfigError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid run configuration: {0}")]
    Init(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
