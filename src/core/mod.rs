pub mod config;
pub mod cron;
pub mod errors;
pub mod event;
pub mod event_scheduler;
pub mod rng;
pub mod simulation_engine;
pub mod types;
