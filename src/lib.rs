pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod phase;
pub mod storage;

pub use config::ControllerConfig;
pub use controller::{ControllerStats, PhaseController};
pub use error::ControllerError;
pub use phase::Phase;
pub use storage::{BlockingQueue, QueueConfig, QueueStats, RetrievalOrder};
