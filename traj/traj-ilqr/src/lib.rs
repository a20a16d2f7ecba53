//! Iterative-LQR trajectory optimization core.
//!
//! Given a discrete-time model and an additive quadratic-plus-terminal cost,
//! this crate repeatedly improves a state/control trajectory by alternating
//! a Riccati-style backward pass with a line-searched forward rollout. A
//! constraint library rides along for an augmented-Lagrangian outer loop
//! (which lives above this crate, together with step acceptance,
//! termination, and presentation).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Problem                              │
//! │  Static: model + cost oracles, constraints, knot times      │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       IlqrSolver                            │
//! │  Dynamic: trajectories, gains, expansions — one owner,      │
//! │  allocated once. backward_pass() then rollout(alpha);       │
//! │  the outer loop accepts by swapping the scratch in.         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The division of labor follows the usual Model/Data discipline: the
//! [`Problem`] is immutable after construction and every piece of mutable
//! state lives in the [`IlqrSolver`], so the hot loops run without
//! allocating.
//!
//! # Quick start
//!
//! ```
//! use nalgebra::{DMatrix, DVector};
//! use traj_ilqr::{
//!     models::DoubleIntegrator, Integrator, IlqrSolver, Problem, QuadraticCost,
//! };
//! use traj_types::IlqrConfig;
//!
//! # fn main() -> Result<(), traj_types::TrajError> {
//! let problem = Problem::with_uniform_step(
//!     Box::new(DoubleIntegrator::new(1)),
//!     Box::new(QuadraticCost::regulator(
//!         DMatrix::identity(2, 2),
//!         DMatrix::identity(1, 1),
//!         DMatrix::identity(2, 2) * 10.0,
//!     )?),
//!     Integrator::RungeKutta4,
//!     51,
//!     0.1,
//!     DVector::from_vec(vec![1.0, 0.0]),
//! )?;
//! let mut solver = IlqrSolver::new(problem, IlqrConfig::default())?;
//!
//! // Seed the live trajectory, then one improvement step.
//! solver.rollout(0.0);
//! solver.accept_rollout();
//! let dv = solver.backward_pass()?;
//! let (cost, aborted) = solver.rollout(1.0);
//! assert!(!aborted && cost < solver.cost());
//! solver.accept_rollout();
//! # let _ = dv;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,      // Many methods can't be const due to nalgebra
    clippy::suboptimal_flops,          // mul_add style changes aren't always clearer
    clippy::neg_cmp_op_on_partial_ord, // !(x <= limit) is intentional for NaN rejection
    clippy::module_name_repetitions,   // BoundConstraint et al. read better qualified
    clippy::doc_markdown,              // Not all technical terms need backticks
)]

pub mod backward;
pub mod constraint;
pub mod cost;
pub mod model;
pub mod models;
pub mod problem;
pub mod regularization;
pub mod rollout;
pub mod solver;

pub use backward::backward_pass;
pub use constraint::{
    AttachedConstraint, BoundConstraint, Constraint, ConstraintParams, ConstraintSet,
    DynamicsConstraint, GoalConstraint, NormConstraint, NormVariable,
};
pub use cost::{CostExpansion, Objective, QuadraticCost};
pub use model::{DiscreteDynamics, Integrator};
pub use problem::Problem;
pub use regularization::Regularization;
pub use rollout::rollout;
pub use solver::{IlqrSolver, SavedCostToGo};

// Re-export the shared vocabulary for convenience.
pub use traj_types::{ConstraintSense, IlqrConfig, RegularizationType, SolveStatus, TrajError};
