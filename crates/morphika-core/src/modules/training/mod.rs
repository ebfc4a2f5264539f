//! Training job submission and status tracking.

mod orchestrator;
mod poller;

pub use orchestrator::TrainingOrchestrator;
pub use poller::{SweepReport, TrainingPoller};
