use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("phase cycling is already running")]
    AlreadyRunning,
    #[error("invalid controller config: {0}")]
    InvalidConfig(String),
    #[error("failed to spawn cycling thread")]
    SpawnFailed(#[source] std::io::Error),
}
