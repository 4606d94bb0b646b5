//! Backend-independent model representation.
//!
//! A [`Model`] is a convex quadratic program with optional binary variables:
//!
//! ```text
//!   min   c0 + Σ cᵢ·xᵢ + Σ qᵢⱼ·xᵢ·xⱼ
//!   s.t.  aᵀx {≤,=,≥} b        (linear constraints)
//!         lb ≤ xᵢ ≤ ub         (continuous variables)
//!         xᵢ ∈ {0, 1}          (binary variables)
//! ```
//!
//! Quadratic coefficients are stored canonically with `i ≤ j`; repeated
//! `add_quadratic` calls on the same pair accumulate.

use serde::{Deserialize, Serialize};

/// Handle to a model variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarId(usize);

impl VarId {
    /// Position of this variable in assignment vectors.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Kind and bounds of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum VarKind {
    /// Continuous variable with inclusive bounds.
    Continuous { lb: f64, ub: f64 },
    /// Binary variable in `{0, 1}`.
    Binary,
}

/// Direction of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sense {
    /// `aᵀx ≤ b`
    Le,
    /// `aᵀx = b`
    Eq,
    /// `aᵀx ≥ b`
    Ge,
}

/// One linear constraint row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearConstraint {
    /// Nonzero coefficients.
    pub terms: Vec<(VarId, f64)>,
    /// Constraint direction.
    pub sense: Sense,
    /// Right-hand side.
    pub rhs: f64,
}

/// Terminal status of a solve, threaded through block return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// Optimal solution found.
    Optimal,
    /// Problem proven infeasible.
    Infeasible,
    /// Problem proven unbounded.
    Unbounded,
    /// Iteration or time limit reached before optimality.
    TimedOut,
}

impl SolveStatus {
    /// Whether the assignment can be trusted as optimal.
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveStatus::Optimal)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveStatus::Optimal => write!(f, "optimal"),
            SolveStatus::Infeasible => write!(f, "infeasible"),
            SolveStatus::Unbounded => write!(f, "unbounded"),
            SolveStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Builder-style optimization model consumed by a [`crate::SolverAdapter`].
#[derive(Debug, Clone, Default)]
pub struct Model {
    vars: Vec<VarKind>,
    linear: Vec<f64>,
    /// Canonical `(i, j, c)` with `i ≤ j`, contributing `c·xᵢ·xⱼ`.
    quadratic: Vec<(usize, usize, f64)>,
    constant: f64,
    constraints: Vec<LinearConstraint>,
}

impl Model {
    /// Empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bounded continuous variable.
    pub fn add_continuous(&mut self, lb: f64, ub: f64) -> VarId {
        self.vars.push(VarKind::Continuous { lb, ub });
        self.linear.push(0.0);
        VarId(self.vars.len() - 1)
    }

    /// Add a binary variable.
    pub fn add_binary(&mut self) -> VarId {
        self.vars.push(VarKind::Binary);
        self.linear.push(0.0);
        VarId(self.vars.len() - 1)
    }

    /// Add `coeff · x` to the objective.
    pub fn add_linear(&mut self, var: VarId, coeff: f64) {
        self.linear[var.0] += coeff;
    }

    /// Add `coeff · xᵢ · xⱼ` to the objective.
    pub fn add_quadratic(&mut self, vi: VarId, vj: VarId, coeff: f64) {
        if coeff == 0.0 {
            return;
        }
        let (i, j) = if vi.0 <= vj.0 { (vi.0, vj.0) } else { (vj.0, vi.0) };
        if let Some(entry) = self
            .quadratic
            .iter_mut()
            .find(|(a, b, _)| *a == i && *b == j)
        {
            entry.2 += coeff;
        } else {
            self.quadratic.push((i, j, coeff));
        }
    }

    /// Add a constant offset to the objective.
    pub fn add_constant(&mut self, value: f64) {
        self.constant += value;
    }

    /// Add `weight · (Σ aᵢ·xᵢ + c)²` to the objective, expanded into
    /// quadratic, linear, and constant parts.
    ///
    /// This is the shape of every consensus-residual penalty, so the blocks
    /// call this instead of expanding squares by hand.
    pub fn add_squared_penalty(&mut self, weight: f64, terms: &[(VarId, f64)], constant: f64) {
        if weight == 0.0 {
            return;
        }
        for (idx, &(vi, ai)) in terms.iter().enumerate() {
            self.add_quadratic(vi, vi, weight * ai * ai);
            for &(vj, aj) in &terms[idx + 1..] {
                self.add_quadratic(vi, vj, 2.0 * weight * ai * aj);
            }
            self.add_linear(vi, 2.0 * weight * ai * constant);
        }
        self.add_constant(weight * constant * constant);
    }

    /// Add a linear constraint row.
    pub fn add_constraint(&mut self, terms: Vec<(VarId, f64)>, sense: Sense, rhs: f64) {
        self.constraints.push(LinearConstraint { terms, sense, rhs });
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Number of binary variables.
    pub fn num_binaries(&self) -> usize {
        self.vars.iter().filter(|v| matches!(v, VarKind::Binary)).count()
    }

    /// Variable kinds, by index.
    pub fn vars(&self) -> &[VarKind] {
        &self.vars
    }

    /// Linear objective coefficients, by variable index.
    pub fn linear(&self) -> &[f64] {
        &self.linear
    }

    /// Canonical quadratic objective triplets `(i, j, c)` with `i ≤ j`.
    pub fn quadratic(&self) -> &[(usize, usize, f64)] {
        &self.quadratic
    }

    /// Constant objective offset.
    pub fn constant(&self) -> f64 {
        self.constant
    }

    /// Constraint rows.
    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    /// Whether the objective carries quadratic terms.
    pub fn has_quadratic(&self) -> bool {
        !self.quadratic.is_empty()
    }

    /// Evaluate the objective at an assignment.
    pub fn evaluate_objective(&self, values: &[f64]) -> f64 {
        let mut total = self.constant;
        for (i, &c) in self.linear.iter().enumerate() {
            total += c * values[i];
        }
        for &(i, j, c) in &self.quadratic {
            total += c * values[i] * values[j];
        }
        total
    }
}
