//! # eflex-admm: Alternating-Optimization Engine
//!
//! Schedules a fleet of electrolyzers against a demand and price signal by
//! block-coordinate alternating optimization with dual-price coordination.
//!
//! # Algorithm Overview
//!
//! Each iteration runs four blocks in fixed order against the shared
//! [`IterationStore`](eflex_core::IterationStore):
//!
//! 1. **X-update** (joint QP): continuous dispatch for all units at once
//! 2. **Y-update** (per-unit MILP): the discrete operating-mode machine
//! 3. **S-update** (per-unit QP): non-negative slacks absorbing consensus
//!    mismatch between the joint and per-unit blocks
//! 4. **U-update** (closed form): gradient-ascent step on the dual prices
//!
//! Between blocks there are hard phase barriers; across units the per-unit
//! blocks are embarrassingly parallel and run on rayon.
//!
//! # Convergence
//!
//! The [`ConvergenceController`] stops when the relative objective
//! improvement falls below threshold *and* the iteration passes the
//! tolerance-banded feasibility check, or when the iteration budget is
//! exhausted. Infeasible iterations are recorded, penalty-scaled, and the
//! run continues; only configuration errors abort a run.
//!
//! # References
//!
//! - Boyd et al., "Distributed Optimization and Statistical Learning via ADMM"

pub mod blocks;
mod config;
mod controller;
mod export;
mod feasibility;
mod objective;

pub use config::ControllerConfig;
pub use controller::{
    ConvergenceController, IterationSummary, PhaseTimes, ScheduleSolution, SolverSuite,
};
pub use export::{write_final_assignment, write_iteration_trace};
pub use feasibility::{FeasibilityChecker, FeasibilityReport, Violation, ViolationKind};
pub use objective::global_objective;
