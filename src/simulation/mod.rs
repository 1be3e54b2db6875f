//! Simulation
//!
//! The hour-by-hour scheduling environment the learned scheduler is trained
//! against and rolled out in.

pub mod environment;

pub use environment::*;
