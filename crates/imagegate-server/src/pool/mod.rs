mod manager;
mod worker;

pub use manager::{DEFAULT_STARTUP_STAGGER, WorkerPool};
pub(crate) use worker::WorkRequest;
