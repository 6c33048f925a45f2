pub mod blocking_queue;

pub use blocking_queue::{BlockingQueue, QueueConfig, QueueStats, RetrievalOrder};
