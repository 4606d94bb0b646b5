//! Microlp backend: exact MILP via good_lp's pure-Rust microlp solver.
//!
//! The discrete mode block produces quadratic penalties over *binary*
//! variables only. Those reduce exactly to linear form:
//!
//! - diagonal terms: `y² = y` for `y ∈ {0, 1}`
//! - products `yᵢ·yⱼ`: an auxiliary `w ∈ [0, 1]` with the McCormick rows
//!   `w ≤ yᵢ`, `w ≤ yⱼ`, `w ≥ yᵢ + yⱼ − 1`, which pin `w` to the product
//!   at any binary point.
//!
//! Quadratic terms touching a continuous variable cannot be expressed and
//! are rejected with [`SolverError::Unsupported`].

use std::collections::HashMap;

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, variables, Expression, Solution, SolverModel, Variable};

use crate::adapter::{Solved, SolverAdapter, SolverError};
use crate::model::{Model, Sense, SolveStatus, VarKind};

/// Simplex + branch-and-bound MILP backend. Always available (pure Rust).
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpAdapter;

impl MicrolpAdapter {
    /// Create the backend.
    pub fn new() -> Self {
        MicrolpAdapter
    }

    fn unsupported(reason: impl Into<String>) -> SolverError {
        SolverError::Unsupported {
            backend: "microlp".into(),
            reason: reason.into(),
        }
    }
}

impl SolverAdapter for MicrolpAdapter {
    fn id(&self) -> &str {
        "microlp"
    }

    fn supports_binaries(&self) -> bool {
        true
    }

    fn solve(&self, model: &Model) -> Result<Solved, SolverError> {
        let is_binary = |idx: usize| matches!(model.vars()[idx], VarKind::Binary);

        // Reduce binary quadratics before declaring variables so the
        // auxiliary product variables can be created alongside.
        let mut linear = model.linear().to_vec();
        let mut products: Vec<(usize, usize, f64)> = Vec::new();
        for &(i, j, c) in model.quadratic() {
            if !is_binary(i) || !is_binary(j) {
                return Err(Self::unsupported(format!(
                    "quadratic term on continuous variables ({i}, {j})"
                )));
            }
            if i == j {
                linear[i] += c;
            } else {
                products.push((i, j, c));
            }
        }

        let mut vars = variables!();
        let handles: Vec<Variable> = model
            .vars()
            .iter()
            .map(|kind| match kind {
                VarKind::Continuous { lb, ub } => {
                    let mut def = variable();
                    if lb.is_finite() {
                        def = def.min(*lb);
                    }
                    if ub.is_finite() {
                        def = def.max(*ub);
                    }
                    vars.add(def)
                }
                VarKind::Binary => vars.add(variable().binary()),
            })
            .collect();

        let mut product_vars: HashMap<(usize, usize), Variable> = HashMap::new();
        for &(i, j, _) in &products {
            product_vars
                .entry((i, j))
                .or_insert_with(|| vars.add(variable().min(0.0).max(1.0)));
        }

        let mut objective = Expression::from(0.0);
        for (idx, &coeff) in linear.iter().enumerate() {
            if coeff != 0.0 {
                objective += coeff * handles[idx];
            }
        }
        for &(i, j, c) in &products {
            objective += c * product_vars[&(i, j)];
        }

        let mut problem = vars.minimise(objective).using(microlp);

        for row in model.constraints() {
            let mut lhs = Expression::from(0.0);
            for &(var, coeff) in &row.terms {
                lhs += coeff * handles[var.index()];
            }
            problem = match row.sense {
                Sense::Le => problem.with(constraint!(lhs <= row.rhs)),
                Sense::Ge => problem.with(constraint!(lhs >= row.rhs)),
                Sense::Eq => problem.with(constraint!(lhs == row.rhs)),
            };
        }

        for (&(i, j), &w) in &product_vars {
            let yi = handles[i];
            let yj = handles[j];
            problem = problem
                .with(constraint!(w <= yi))
                .with(constraint!(w <= yj))
                .with(constraint!(w >= yi + yj - 1.0));
        }

        match problem.solve() {
            Ok(solution) => {
                let values: Vec<f64> = handles.iter().map(|&v| solution.value(v)).collect();
                let objective = model.evaluate_objective(&values);
                Ok(Solved {
                    status: SolveStatus::Optimal,
                    values,
                    objective,
                })
            }
            Err(good_lp::ResolutionError::Infeasible) => Ok(Solved {
                status: SolveStatus::Infeasible,
                values: vec![0.0; model.num_vars()],
                objective: f64::NAN,
            }),
            Err(good_lp::ResolutionError::Unbounded) => Ok(Solved {
                status: SolveStatus::Unbounded,
                values: vec![0.0; model.num_vars()],
                objective: f64::NAN,
            }),
            Err(other) => Err(SolverError::Backend {
                backend: "microlp".into(),
                reason: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_milp() {
        // min -y1 - y2 s.t. y1 + y2 <= 1 -> exactly one binary set
        let mut model = Model::new();
        let y1 = model.add_binary();
        let y2 = model.add_binary();
        model.add_linear(y1, -1.0);
        model.add_linear(y2, -1.0);
        model.add_constraint(vec![(y1, 1.0), (y2, 1.0)], Sense::Le, 1.0);

        let solved = MicrolpAdapter::new().solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!((solved.objective - (-1.0)).abs() < 1e-6);
        let total = solved.values[y1.index()] + solved.values[y2.index()];
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn one_hot_penalty_over_binaries() {
        // min (y1 + y2 - 1)^2: achievable at exactly one set binary
        let mut model = Model::new();
        let y1 = model.add_binary();
        let y2 = model.add_binary();
        model.add_squared_penalty(1.0, &[(y1, 1.0), (y2, 1.0)], -1.0);

        let solved = MicrolpAdapter::new().solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!(solved.objective.abs() < 1e-6);
        let total = solved.values[y1.index()] + solved.values[y2.index()];
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn forced_product_pays_cross_term() {
        // Pinning both binaries makes the one-hot penalty cost exactly 1.
        let mut model = Model::new();
        let y1 = model.add_binary();
        let y2 = model.add_binary();
        model.add_squared_penalty(1.0, &[(y1, 1.0), (y2, 1.0)], -1.0);
        model.add_constraint(vec![(y1, 1.0)], Sense::Eq, 1.0);
        model.add_constraint(vec![(y2, 1.0)], Sense::Eq, 1.0);

        let solved = MicrolpAdapter::new().solve(&model).unwrap();
        assert!(solved.status.is_optimal());
        assert!((solved.objective - 1.0).abs() < 1e-6);
    }

    #[test]
    fn continuous_quadratic_rejected() {
        let mut model = Model::new();
        let x = model.add_continuous(0.0, 1.0);
        model.add_quadratic(x, x, 1.0);

        let err = MicrolpAdapter::new().solve(&model);
        assert!(matches!(err, Err(SolverError::Unsupported { .. })));
    }

    #[test]
    fn infeasible_milp_reported_as_status() {
        let mut model = Model::new();
        let y = model.add_binary();
        model.add_constraint(vec![(y, 1.0)], Sense::Ge, 2.0);

        let solved = MicrolpAdapter::new().solve(&model).unwrap();
        assert_eq!(solved.status, SolveStatus::Infeasible);
    }
}
