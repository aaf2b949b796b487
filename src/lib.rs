pub mod config;
pub mod errors;
pub mod job_scheduling;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod services;
pub mod sources;
