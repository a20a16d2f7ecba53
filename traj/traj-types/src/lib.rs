//! Shared vocabulary for the trajectory optimization stack.
//!
//! This crate holds the types that cross crate boundaries: error values,
//! solver configuration, and the status/mode enums. It deliberately contains
//! no solver logic and no linear algebra so that tooling layers (problem
//! builders, outer solve loops, diagnostics) can depend on it without
//! pulling in the numerical core.

#![warn(missing_docs)]

mod config;
mod error;
mod status;

pub use config::IlqrConfig;
pub use error::TrajError;
pub use status::{ConstraintSense, RegularizationType, SolveStatus};

/// Result type for trajectory optimization operations.
pub type Result<T> = std::result::Result<T, TrajError>;
