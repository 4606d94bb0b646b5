//! Controller configuration parameters.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the convergence controller and the update blocks.
///
/// The ramp-penalty scale and price damping are observed magnitudes without
/// a derivation; they are kept configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Maximum number of iterations before the run stops regardless of
    /// convergence.
    pub max_iterations: usize,

    /// Relative objective-improvement threshold for termination.
    ///
    /// The run stops once `|prev - curr| / |prev|` falls below this and the
    /// iteration is feasible.
    pub improvement_threshold: f64,

    /// Relative feasibility tolerance, applied against nonzero bounds.
    pub eps_rel: f64,

    /// Absolute feasibility tolerance, applied against zero bounds.
    pub eps_abs: f64,

    /// Weight on the dispatch block's ramp-excess penalty.
    pub ramp_penalty_scale: f64,

    /// Damping factor on the ramp-residual price update.
    pub price_damping: f64,

    /// Multiplier applied to the recorded objective of infeasible
    /// iterations so they never compare as improving against feasible ones.
    pub infeasible_penalty_multiplier: f64,
}

impl ControllerConfig {
    /// Objective value recorded for an infeasible iteration.
    ///
    /// Scaling must make the value strictly worse (larger), whatever the
    /// sign of the raw objective; negative electricity prices can make
    /// schedule costs negative, and a plain multiply would then make the
    /// infeasible iteration look like an improvement.
    pub fn penalized(&self, objective: f64) -> f64 {
        if objective >= 0.0 {
            objective * self.infeasible_penalty_multiplier
        } else {
            objective / self.infeasible_penalty_multiplier
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            improvement_threshold: 1e-3,
            eps_rel: 1e-4,
            eps_abs: 1e-6,
            ramp_penalty_scale: 1e3,
            price_damping: 0.5,
            infeasible_penalty_multiplier: 10.0,
        }
    }
}
