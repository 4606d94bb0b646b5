//! Hard feasibility predicates evaluated per iteration.
//!
//! During iteration the one-hot, coupling, and ramp relations are soft
//! penalties; before an iteration can terminate the run they are re-checked
//! here as hard predicates with tolerance bands. Relative tolerance applies
//! against nonzero bounds, absolute tolerance against zero bounds. Checking
//! is read-only, so re-running it on a sealed iteration always reproduces
//! the same verdict.

use eflex_core::{IterationStore, OperatingMode, Parameters, UnitId, NUM_MODES};
use serde::Serialize;
use tracing::debug;

use crate::config::ControllerConfig;

/// What a feasibility violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Mode indicators do not sum to one.
    OneHot,
    /// Dispatch fraction outside `[0, 1]`.
    DispatchBounds,
    /// Dispatch below the minimum output while producing.
    MinOutput,
    /// Dispatch above the maximum output while producing.
    MaxOutput,
    /// Illegal mode transition between consecutive periods.
    Transition,
    /// Dispatch change between consecutive periods exceeds the ramp rate.
    Ramp,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ViolationKind::OneHot => "one_hot",
            ViolationKind::DispatchBounds => "dispatch_bounds",
            ViolationKind::MinOutput => "min_output",
            ViolationKind::MaxOutput => "max_output",
            ViolationKind::Transition => "transition",
            ViolationKind::Ramp => "ramp",
        };
        f.write_str(label)
    }
}

/// One violated predicate, located by unit and period.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub unit: UnitId,
    /// 1-based period.
    pub period: usize,
    pub kind: ViolationKind,
    /// How far past the tolerated bound the value landed.
    pub amount: f64,
}

/// Outcome of checking one iteration.
#[derive(Debug, Clone, Serialize)]
pub struct FeasibilityReport {
    pub iteration: usize,
    pub violations: Vec<Violation>,
}

impl FeasibilityReport {
    /// Whether the iteration satisfied every predicate.
    pub fn is_feasible(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Tolerance-banded predicate evaluation over one iteration's primal values.
pub struct FeasibilityChecker<'a> {
    params: &'a Parameters,
    eps_rel: f64,
    eps_abs: f64,
}

impl<'a> FeasibilityChecker<'a> {
    pub fn new(params: &'a Parameters, config: &ControllerConfig) -> Self {
        FeasibilityChecker {
            params,
            eps_rel: config.eps_rel,
            eps_abs: config.eps_abs,
        }
    }

    /// Tolerance for comparisons against `bound`.
    fn tolerance(&self, bound: f64) -> f64 {
        if bound == 0.0 {
            self.eps_abs
        } else {
            self.eps_rel * bound.abs()
        }
    }

    /// Evaluate every predicate for iteration `k` and collect violations.
    pub fn check(&self, store: &IterationStore, k: usize) -> FeasibilityReport {
        let num_periods = self.params.num_periods();
        let prod = OperatingMode::Production.index();
        let mut violations = Vec::new();

        for unit in self.params.units() {
            let x = store.x_for_unit_or_default(k, unit.id, num_periods);
            let y = store.y_for_unit_or_default(k, unit.id, num_periods);

            let modes: Vec<Option<OperatingMode>> = y.iter().map(|row| rounded_mode(row)).collect();

            for t in 1..=num_periods {
                let i = t - 1;

                let mode_sum: f64 = y[i].iter().sum();
                if (mode_sum - 1.0).abs() > self.tolerance(1.0) {
                    violations.push(Violation {
                        unit: unit.id,
                        period: t,
                        kind: ViolationKind::OneHot,
                        amount: (mode_sum - 1.0).abs(),
                    });
                }

                if x[i] < -self.tolerance(0.0) || x[i] > 1.0 + self.tolerance(1.0) {
                    violations.push(Violation {
                        unit: unit.id,
                        period: t,
                        kind: ViolationKind::DispatchBounds,
                        amount: if x[i] < 0.0 { -x[i] } else { x[i] - 1.0 },
                    });
                }

                if modes[i] == Some(OperatingMode::Production) {
                    if x[i] < unit.min_output - self.tolerance(unit.min_output) {
                        violations.push(Violation {
                            unit: unit.id,
                            period: t,
                            kind: ViolationKind::MinOutput,
                            amount: unit.min_output - x[i],
                        });
                    }
                    if x[i] > unit.max_output + self.tolerance(unit.max_output) {
                        violations.push(Violation {
                            unit: unit.id,
                            period: t,
                            kind: ViolationKind::MaxOutput,
                            amount: x[i] - unit.max_output,
                        });
                    }
                }

                if t > 1 {
                    if let (Some(prev), Some(curr)) = (modes[i - 1], modes[i]) {
                        if !transition_allowed(unit, &modes, i) {
                            violations.push(Violation {
                                unit: unit.id,
                                period: t,
                                kind: ViolationKind::Transition,
                                amount: 1.0,
                            });
                            debug!(%unit.id, period = t, from = %prev, to = %curr, "illegal transition");
                        }
                    }

                    if y[i][prod] >= 0.5 {
                        let step = (x[i] - x[i - 1]).abs();
                        if step > unit.ramp_rate + self.tolerance(unit.ramp_rate) {
                            violations.push(Violation {
                                unit: unit.id,
                                period: t,
                                kind: ViolationKind::Ramp,
                                amount: step - unit.ramp_rate,
                            });
                        }
                    }
                }
            }
        }

        FeasibilityReport {
            iteration: k,
            violations,
        }
    }
}

/// Round a mode indicator row to its single active mode, if it has one.
fn rounded_mode(row: &[f64; NUM_MODES]) -> Option<OperatingMode> {
    let mut active = None;
    for (m, &v) in row.iter().enumerate() {
        if v >= 0.5 {
            if active.is_some() {
                return None;
            }
            active = OperatingMode::from_index(m);
        }
    }
    active
}

/// Whether the rounded mode at index `i` is reachable from index `i - 1`.
fn transition_allowed(unit: &eflex_core::Unit, modes: &[Option<OperatingMode>], i: usize) -> bool {
    let (Some(prev), Some(curr)) = (modes[i - 1], modes[i]) else {
        return true;
    };
    match curr {
        OperatingMode::Idle => matches!(
            prev,
            OperatingMode::Idle | OperatingMode::Production | OperatingMode::Standby
        ),
        OperatingMode::Starting => {
            matches!(prev, OperatingMode::Idle | OperatingMode::Starting)
        }
        OperatingMode::Production => {
            if matches!(prev, OperatingMode::Production | OperatingMode::Standby) {
                return true;
            }
            // Entry from a completed startup: the unit must have been
            // Starting when the startup dwell began.
            let dwell = unit.min_dwell_for(OperatingMode::Starting).max(1);
            i >= dwell && modes[i - dwell] == Some(OperatingMode::Starting)
        }
        OperatingMode::Standby => {
            matches!(prev, OperatingMode::Production | OperatingMode::Standby)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eflex_core::{GlobalParameters, Unit, NUM_PRICES, NUM_SLACKS};

    fn params() -> Parameters {
        let globals = GlobalParameters {
            interval_length: 1.0,
            demand: vec![5.0; 4],
            electricity_price: vec![1.0; 4],
            demand_deviation_cost: 100.0,
            rho: 1.0,
        };
        let unit = Unit::new(UnitId::new(0), "u")
            .with_output_range(0.2, 0.9)
            .with_ramp_rate(0.6);
        Parameters::new(vec![unit], globals).unwrap()
    }

    fn store_with(x: &[f64], modes: &[OperatingMode]) -> IterationStore {
        let mut store = IterationStore::new();
        store.init(0, 1, x.len()).unwrap();
        let mut y = vec![[0.0; NUM_MODES]; x.len()];
        for (row, mode) in y.iter_mut().zip(modes) {
            row[mode.index()] = 1.0;
        }
        store
            .save_x_for_unit(0, UnitId::new(0), x, &vec![0.0; x.len()])
            .unwrap();
        store.save_y_for_unit(0, UnitId::new(0), &y).unwrap();
        store
            .save_s_for_unit(0, UnitId::new(0), &vec![[0.0; NUM_SLACKS]; x.len()])
            .unwrap();
        store
            .save_u_for_unit(0, UnitId::new(0), &vec![[0.0; NUM_PRICES]; x.len()])
            .unwrap();
        store
    }

    #[test]
    fn clean_schedule_is_feasible() {
        use OperatingMode::*;
        let params = params();
        let store = store_with(&[0.0, 0.0, 0.5, 0.5], &[Idle, Starting, Production, Production]);
        let config = ControllerConfig::default();
        let report = FeasibilityChecker::new(&params, &config).check(&store, 0);
        assert!(report.is_feasible(), "{:?}", report.violations);
    }

    #[test]
    fn ramp_violation_is_detected() {
        use OperatingMode::*;
        let params = params();
        let store = store_with(&[0.0, 0.0, 0.0, 1.0], &[Idle, Starting, Production, Production]);
        let config = ControllerConfig::default();
        let report = FeasibilityChecker::new(&params, &config).check(&store, 0);
        let ramp: Vec<_> = report
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::Ramp)
            .collect();
        assert_eq!(ramp.len(), 1);
        assert_eq!(ramp[0].period, 4);
        assert!((ramp[0].amount - 0.4).abs() < 1e-12);
    }

    #[test]
    fn illegal_transition_is_detected() {
        use OperatingMode::*;
        let params = params();
        // Idle -> Production skips the startup.
        let store = store_with(&[0.0, 0.5, 0.5, 0.5], &[Idle, Production, Production, Production]);
        let config = ControllerConfig::default();
        let report = FeasibilityChecker::new(&params, &config).check(&store, 0);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ViolationKind::Transition && v.period == 2));
    }

    #[test]
    fn min_output_violation_only_while_producing() {
        use OperatingMode::*;
        let params = params();
        let store = store_with(&[0.1, 0.1, 0.1, 0.1], &[Idle, Idle, Starting, Production]);
        let config = ControllerConfig::default();
        let report = FeasibilityChecker::new(&params, &config).check(&store, 0);
        let min_out: Vec<_> = report
            .violations
            .iter()
            .filter(|v| v.kind == ViolationKind::MinOutput)
            .collect();
        assert_eq!(min_out.len(), 1);
        assert_eq!(min_out[0].period, 4);
    }

    #[test]
    fn check_is_idempotent_on_sealed_iteration() {
        use OperatingMode::*;
        let params = params();
        let mut store = store_with(&[0.0, 0.0, 0.0, 1.0], &[Idle, Starting, Production, Production]);
        let config = ControllerConfig::default();
        let checker = FeasibilityChecker::new(&params, &config);

        let first = checker.check(&store, 0);
        store.save_objective(0, 1.0).unwrap();
        store.save_feasibility(0, first.is_feasible()).unwrap();
        store.seal(0).unwrap();
        let second = checker.check(&store, 0);

        assert_eq!(first.is_feasible(), second.is_feasible());
        assert_eq!(first.violations.len(), second.violations.len());
    }
}
