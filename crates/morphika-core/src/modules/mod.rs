//! Studio building blocks: quota, registries, training, generation, persistence
//! and plumbing.

pub mod assets;
pub mod config;
pub mod generation;
pub mod json_store;
pub mod logger;
pub mod models;
pub mod paths;
pub mod plan_catalog;
pub mod quota;
pub mod repository;
pub mod retry;
pub mod studio;
pub mod training;
