//! Background Schedulers
//!
//! ## Training Poll Scheduler
//! Sweeps watched training jobs on a fixed interval. Each job carries its own
//! next-poll time, so the sweep only queries the backend for jobs that are due.

mod training_poll;

pub use training_poll::start_training_poll;
