//! Solver capability interface for the eflex update blocks.
//!
//! The update blocks never talk to a concrete optimizer. They build a
//! [`Model`] (continuous/binary variables, linear constraints, a convex
//! quadratic objective) and hand it to a [`SolverAdapter`], which returns an
//! assignment together with an explicit [`SolveStatus`]. Solver failure is a
//! status value threaded through block return paths, not an exception.
//!
//! # Backends
//!
//! | Backend | Problem class | Binaries |
//! |---------|---------------|----------|
//! | [`ClarabelAdapter`] | convex QP (interior point, pure Rust) | relaxed to `[0, 1]` |
//! | [`MicrolpAdapter`]  | MILP (simplex + branch & bound, pure Rust) | exact; binary quadratics linearized |
//!
//! The continuous blocks (dispatch, slack) use Clarabel directly. The
//! discrete mode block uses microlp; its quadratic penalties involve only
//! binary variables, which the adapter reduces exactly to linear form
//! (`y² = y`, products via McCormick envelopes).

mod adapter;
mod clarabel_backend;
mod microlp_backend;
mod model;

pub use adapter::{Solved, SolverAdapter, SolverError};
pub use clarabel_backend::ClarabelAdapter;
pub use microlp_backend::MicrolpAdapter;
pub use model::{Model, Sense, SolveStatus, VarId, VarKind};
