//! The solver capability boundary.

use thiserror::Error;

use crate::model::{Model, SolveStatus};

/// Hard failures while building or running a backend. Distinct from
/// [`SolveStatus`]: an infeasible or unbounded model is a *result*, not an
/// error.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Model shape the backend cannot express (e.g. continuous quadratics
    /// handed to a MILP backend).
    #[error("unsupported model for backend {backend}: {reason}")]
    Unsupported { backend: String, reason: String },

    /// Backend-internal failure (setup, factorization, resolution).
    #[error("backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },
}

/// Assignment returned by a backend, with its explicit status.
///
/// On a non-optimal status the values are whatever the backend last
/// reported (typically the final interior-point iterate); callers decide
/// whether to keep them.
#[derive(Debug, Clone)]
pub struct Solved {
    /// Terminal solver status.
    pub status: SolveStatus,
    /// Value per variable, indexed by [`crate::VarId::index`].
    pub values: Vec<f64>,
    /// Objective at `values`, including the model's constant offset.
    pub objective: f64,
}

/// Abstract "solve(model) -> assignment, status" capability.
///
/// One adapter instance may be shared across threads; implementations hold
/// no per-solve mutable state.
pub trait SolverAdapter: Send + Sync {
    /// Unique backend identifier (e.g. "clarabel", "microlp").
    fn id(&self) -> &str;

    /// Whether binary variables are honored exactly. Backends that return
    /// `false` relax binaries to `[0, 1]`.
    fn supports_binaries(&self) -> bool;

    /// Solve the model.
    fn solve(&self, model: &Model) -> Result<Solved, SolverError>;
}
