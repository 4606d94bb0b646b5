//! Clarabel backend: convex QP via a pure-Rust interior-point solver.
//!
//! Clarabel solves the conic program
//!
//! ```text
//!   minimize    (1/2)·x'Px + q'x
//!   subject to  Ax + s = b,  s ∈ K
//! ```
//!
//! Equality rows map to the zero cone, inequality rows and variable bounds
//! to the nonnegative cone. Binary variables are relaxed to `[0, 1]`; the
//! adapter reports that through [`SolverAdapter::supports_binaries`].

use clarabel::{
    algebra::CscMatrix,
    solver::{DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT},
};

use crate::adapter::{Solved, SolverAdapter, SolverError};
use crate::model::{Model, Sense, SolveStatus, VarKind};

/// Interior-point QP backend. Always available (pure Rust).
#[derive(Debug, Clone, Copy, Default)]
pub struct ClarabelAdapter;

impl ClarabelAdapter {
    /// Create the backend.
    pub fn new() -> Self {
        ClarabelAdapter
    }

    fn backend_error(reason: impl Into<String>) -> SolverError {
        SolverError::Backend {
            backend: "clarabel".into(),
            reason: reason.into(),
        }
    }
}

/// Convert column-wise `(row, value)` lists into CSC arrays.
fn to_csc(n_rows: usize, columns: &mut [Vec<(usize, f64)>]) -> CscMatrix<f64> {
    let n_cols = columns.len();
    let mut col_ptr = Vec::with_capacity(n_cols + 1);
    let mut row_idx = Vec::new();
    let mut values = Vec::new();
    let mut nnz = 0usize;

    for col in columns.iter_mut() {
        col_ptr.push(nnz);
        col.sort_by_key(|(r, _)| *r);
        for &(r, v) in col.iter() {
            row_idx.push(r);
            values.push(v);
            nnz += 1;
        }
    }
    col_ptr.push(nnz);

    CscMatrix::new(n_rows, n_cols, col_ptr, row_idx, values)
}

impl SolverAdapter for ClarabelAdapter {
    fn id(&self) -> &str {
        "clarabel"
    }

    fn supports_binaries(&self) -> bool {
        false
    }

    fn solve(&self, model: &Model) -> Result<Solved, SolverError> {
        let n = model.num_vars();

        // Objective: P is the upper triangle of the symmetric quadratic
        // form, with (1/2)x'Px, so diagonal entries carry twice the model
        // coefficient and off-diagonal entries carry it once.
        let mut p_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(i, j, c) in model.quadratic() {
            let coeff = if i == j { 2.0 * c } else { c };
            p_cols[j].push((i, coeff));
        }
        let q: Vec<f64> = model.linear().to_vec();

        // Constraint rows: zero cone (equalities) first, then nonnegative
        // cone (inequalities in `a'x ≤ b` form, then variable bounds).
        let m_eq = model
            .constraints()
            .iter()
            .filter(|c| c.sense == Sense::Eq)
            .count();

        let mut a_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut rhs: Vec<f64> = vec![0.0; m_eq];
        let mut next_eq = 0usize;

        for constraint in model.constraints() {
            match constraint.sense {
                Sense::Eq => {
                    for &(var, coeff) in &constraint.terms {
                        a_cols[var.index()].push((next_eq, coeff));
                    }
                    rhs[next_eq] = constraint.rhs;
                    next_eq += 1;
                }
                Sense::Le => {
                    let row = rhs.len();
                    for &(var, coeff) in &constraint.terms {
                        a_cols[var.index()].push((row, coeff));
                    }
                    rhs.push(constraint.rhs);
                }
                Sense::Ge => {
                    let row = rhs.len();
                    for &(var, coeff) in &constraint.terms {
                        a_cols[var.index()].push((row, -coeff));
                    }
                    rhs.push(-constraint.rhs);
                }
            }
        }

        for (idx, kind) in model.vars().iter().enumerate() {
            let (lb, ub) = match kind {
                VarKind::Continuous { lb, ub } => (*lb, *ub),
                VarKind::Binary => (0.0, 1.0),
            };
            if ub.is_finite() {
                let row = rhs.len();
                a_cols[idx].push((row, 1.0));
                rhs.push(ub);
            }
            if lb.is_finite() {
                let row = rhs.len();
                a_cols[idx].push((row, -1.0));
                rhs.push(-lb);
            }
        }

        let m_total = rhs.len();
        let m_ineq = m_total - m_eq;

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if m_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(m_eq));
        }
        if m_ineq > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(m_ineq));
        }

        let p_mat = to_csc(n, &mut p_cols);
        let a_mat = to_csc(m_total, &mut a_cols);

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .build()
            .map_err(|e| Self::backend_error(format!("settings error: {e:?}")))?;

        let mut solver = DefaultSolver::new(&p_mat, &q, &a_mat, &rhs, &cones, settings)
            .map_err(|e| Self::backend_error(format!("initialization failed: {e:?}")))?;

        solver.solve();
        let solution = solver.solution;

        let status = match solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => SolveStatus::Optimal,
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                SolveStatus::Infeasible
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                SolveStatus::Unbounded
            }
            SolverStatus::MaxIterations | SolverStatus::MaxTime => SolveStatus::TimedOut,
            other => {
                return Err(Self::backend_error(format!(
                    "solver returned status {other:?}"
                )))
            }
        };

        let values: Vec<f64> = solution.x.to_vec();
        let objective = model.evaluate_objective(&values);

        Ok(Solved {
            status,
            values,
            objective,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_constrained_qp() {
        // min (x - 1)^2 with x in [0, 0.5] -> x = 0.5
        let mut model = Model::new();
        let x = model.add_continuous(0.0, 0.5);
        model.add_squared_penalty(1.0, &[(x, 1.0)], -1.0);

        let solved = ClarabelAdapter::new().solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!((solved.values[x.index()] - 0.5).abs() < 1e-4);
        assert!((solved.objective - 0.25).abs() < 1e-3);
    }

    #[test]
    fn lp_with_equality() {
        // min x s.t. x + y = 1, x,y in [0,1] -> x = 0, y = 1
        let mut model = Model::new();
        let x = model.add_continuous(0.0, 1.0);
        let y = model.add_continuous(0.0, 1.0);
        model.add_linear(x, 1.0);
        model.add_constraint(vec![(x, 1.0), (y, 1.0)], Sense::Eq, 1.0);

        let solved = ClarabelAdapter::new().solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!(solved.values[x.index()].abs() < 1e-4);
        assert!((solved.values[y.index()] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn infeasible_reported_as_status() {
        // x >= 2 with x in [0, 1]
        let mut model = Model::new();
        let x = model.add_continuous(0.0, 1.0);
        model.add_linear(x, 1.0);
        model.add_constraint(vec![(x, 1.0)], Sense::Ge, 2.0);

        let solved = ClarabelAdapter::new().solve(&model).unwrap();
        assert_eq!(solved.status, SolveStatus::Infeasible);
    }

    #[test]
    fn binaries_are_relaxed() {
        // min (y - 0.3)^2 over a relaxed binary -> y = 0.3
        let mut model = Model::new();
        let y = model.add_binary();
        model.add_squared_penalty(1.0, &[(y, 1.0)], -0.3);

        let adapter = ClarabelAdapter::new();
        assert!(!adapter.supports_binaries());
        let solved = adapter.solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!((solved.values[y.index()] - 0.3).abs() < 1e-4);
    }
}
