pub mod comfort;
pub mod config;
pub mod controller;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ml;
pub mod optimizer;
pub mod simulation;
pub mod telemetry;
pub mod utils;

pub use error::{Result, SchedulingError};
