//! Scheduling strategies
//!
//! - MILP: exact cost-minimizing schedule (ignores soft preferences)
//!
//! The learned strategy lives in [`crate::ml`] because it needs a trained
//! policy before it can schedule anything.

pub mod milp;

pub use milp::*;
