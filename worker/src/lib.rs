pub mod config;
pub mod error;
pub mod metrics;
pub mod trainer;
pub mod worker;

pub use config::WorkerConfig;
pub use error::{Result, WorkerErr};
pub use metrics::{SummaryRecord, SummaryWriter};
pub use trainer::Trainer;
pub use worker::{Worker, connect};
