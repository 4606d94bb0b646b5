//! Iteration driver: runs the four blocks in fixed phase order, evaluates
//! each iteration, and decides termination.
//!
//! Phase order within one iteration is a hard contract: the joint dispatch
//! solve publishes before any mode solve starts, all mode solves before
//! any slack solve, all slack solves before any price update. Across units
//! the per-unit phases have no data dependency and run on the rayon pool;
//! the controller is the only writer of the store, so the parallel phases
//! return their slices and the controller commits them at the barrier.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use eflex_core::{
    EflexError, EflexResult, IterationStore, Parameters, UnitId, NUM_MODES, NUM_PRICES,
    NUM_SLACKS,
};
use eflex_solver::{ClarabelAdapter, MicrolpAdapter, SolverAdapter};

use crate::blocks::{dispatch_update, mode_update, price_update, slack_update};
use crate::config::ControllerConfig;
use crate::feasibility::FeasibilityChecker;
use crate::objective::global_objective;

/// The two solver backends an iteration needs: a convex QP backend for the
/// continuous blocks and a MILP-capable backend for the mode block.
pub struct SolverSuite {
    pub continuous: Box<dyn SolverAdapter>,
    pub discrete: Box<dyn SolverAdapter>,
}

impl Default for SolverSuite {
    fn default() -> Self {
        SolverSuite {
            continuous: Box::new(ClarabelAdapter::new()),
            discrete: Box::new(MicrolpAdapter::new()),
        }
    }
}

/// Wall-clock spent in each phase of one iteration.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct PhaseTimes {
    pub dispatch_ms: u128,
    pub mode_ms: u128,
    pub slack_ms: u128,
    pub price_ms: u128,
    pub evaluate_ms: u128,
}

/// Per-iteration trace entry.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IterationSummary {
    pub iteration: usize,
    /// Recorded objective; scaled by the infeasibility multiplier when the
    /// iteration violated a hard predicate.
    pub objective: f64,
    pub feasible: bool,
    pub violations: usize,
    pub phase_times: PhaseTimes,
}

/// Result of a full run: the trace, the terminal iteration, and the store
/// holding every sealed iteration for reporting.
pub struct ScheduleSolution {
    pub iterations: Vec<IterationSummary>,
    pub converged: bool,
    pub final_iteration: usize,
    pub store: IterationStore,
}

/// Drives ADMM iterations to convergence or the iteration cap.
pub struct ConvergenceController<'a> {
    params: &'a Parameters,
    config: ControllerConfig,
    suite: SolverSuite,
}

impl<'a> ConvergenceController<'a> {
    pub fn new(params: &'a Parameters, config: ControllerConfig, suite: SolverSuite) -> Self {
        ConvergenceController {
            params,
            config,
            suite,
        }
    }

    /// Run iterations until the relative objective improvement falls below
    /// the threshold on a feasible iteration, or the cap is reached.
    pub fn run(&self) -> EflexResult<ScheduleSolution> {
        let num_units = self.params.num_units();
        let num_periods = self.params.num_periods();
        let unit_ids: Vec<UnitId> = self.params.units().iter().map(|u| u.id).collect();
        let all_periods: Vec<usize> = (1..=num_periods).collect();
        let checker = FeasibilityChecker::new(self.params, &self.config);

        let mut store = IterationStore::with_capacity(self.config.max_iterations + 1);
        self.seed_initial_iteration(&mut store, &checker)?;

        let mut iterations = Vec::with_capacity(self.config.max_iterations);
        let mut converged = false;
        let mut final_iteration = 0;

        for i in 1..=self.config.max_iterations {
            let k = i - 1;
            store.init(i, num_units, num_periods)?;
            let mut times = PhaseTimes::default();

            // Phase 1: joint dispatch solve, all units at once. A hard
            // solver failure is caught here, not propagated: the iteration
            // keeps the previous dispatch and gets classified infeasible.
            let started = Instant::now();
            let (x_next, hydrogen_next) = match dispatch_update(
                self.params,
                &self.config,
                &store,
                k,
                self.suite.continuous.as_ref(),
            ) {
                Ok(dispatch) => (dispatch.x, dispatch.hydrogen),
                Err(EflexError::Solver(reason)) => {
                    warn!(
                        iteration = k,
                        reason = %reason,
                        "dispatch solve failed, keeping previous dispatch"
                    );
                    self.previous_dispatch(&store, k)
                }
                Err(other) => return Err(other),
            };
            for &unit in &unit_ids {
                store.save_x_for_unit(
                    i,
                    unit,
                    &x_next[unit.value()],
                    &hydrogen_next[unit.value()],
                )?;
            }
            times.dispatch_ms = started.elapsed().as_millis();

            // Phase 2: per-unit mode solves.
            let started = Instant::now();
            let modes: Vec<Vec<[f64; NUM_MODES]>> = unit_ids
                .par_iter()
                .map(|&unit| {
                    match mode_update(self.params, &store, k, unit, self.suite.discrete.as_ref())
                    {
                        Err(EflexError::Solver(reason)) => {
                            warn!(
                                iteration = k,
                                %unit,
                                reason = %reason,
                                "mode solve failed, keeping previous modes"
                            );
                            Ok(store.y_for_unit_or_default(k, unit, num_periods))
                        }
                        other => other,
                    }
                })
                .collect::<EflexResult<_>>()?;
            for (&unit, y) in unit_ids.iter().zip(&modes) {
                store.save_y_for_unit(i, unit, y)?;
            }
            times.mode_ms = started.elapsed().as_millis();

            // Phase 3: per-unit slack solves.
            let started = Instant::now();
            let slacks: Vec<Vec<[f64; NUM_SLACKS]>> = unit_ids
                .par_iter()
                .map(|&unit| {
                    match slack_update(
                        self.params,
                        &store,
                        k,
                        unit,
                        &all_periods,
                        self.suite.continuous.as_ref(),
                    ) {
                        Err(EflexError::Solver(reason)) => {
                            warn!(
                                iteration = k,
                                %unit,
                                reason = %reason,
                                "slack solve failed, keeping previous slacks"
                            );
                            Ok(store.s_for_unit_or_default(k, unit, num_periods))
                        }
                        other => other,
                    }
                })
                .collect::<EflexResult<_>>()?;
            for (&unit, s) in unit_ids.iter().zip(&slacks) {
                store.save_s_for_unit(i, unit, s)?;
            }
            times.slack_ms = started.elapsed().as_millis();

            // Phase 4: closed-form price updates.
            let started = Instant::now();
            let prices: Vec<Vec<[f64; NUM_PRICES]>> = unit_ids
                .par_iter()
                .map(|&unit| {
                    price_update(
                        self.params,
                        &store,
                        k,
                        unit,
                        &all_periods,
                        self.config.price_damping,
                    )
                })
                .collect::<EflexResult<_>>()?;
            for (&unit, u) in unit_ids.iter().zip(&prices) {
                store.save_u_for_unit(i, unit, u)?;
            }
            times.price_ms = started.elapsed().as_millis();

            // Evaluate and seal.
            let started = Instant::now();
            let report = checker.check(&store, i);
            let feasible = report.is_feasible();
            let raw_objective = global_objective(self.params, &store, i);
            let recorded = if feasible {
                raw_objective
            } else {
                self.config.penalized(raw_objective)
            };
            store.save_objective(i, recorded)?;
            store.save_feasibility(i, feasible)?;
            store.seal(i)?;
            times.evaluate_ms = started.elapsed().as_millis();

            if !feasible {
                debug!(
                    iteration = i,
                    violations = report.violations.len(),
                    "iteration infeasible"
                );
            }
            info!(
                iteration = i,
                objective = recorded,
                feasible,
                "iteration sealed"
            );

            iterations.push(IterationSummary {
                iteration: i,
                objective: recorded,
                feasible,
                violations: report.violations.len(),
                phase_times: times,
            });
            final_iteration = i;

            if feasible {
                if let Some(previous) = store.objective(i - 1) {
                    let improvement = if previous.abs() > 0.0 {
                        (previous - recorded).abs() / previous.abs()
                    } else {
                        (previous - recorded).abs()
                    };
                    if improvement < self.config.improvement_threshold {
                        info!(iteration = i, improvement, "converged");
                        converged = true;
                        break;
                    }
                }
            }
        }

        if !converged {
            warn!(
                iterations = final_iteration,
                "iteration cap reached before convergence"
            );
        }

        Ok(ScheduleSolution {
            iterations,
            converged,
            final_iteration,
            store,
        })
    }

    /// Seal iteration zero as an all-zero starting point so the first real
    /// iteration has defined values to read.
    fn seed_initial_iteration(
        &self,
        store: &mut IterationStore,
        checker: &FeasibilityChecker<'_>,
    ) -> EflexResult<()> {
        let num_periods = self.params.num_periods();
        store.init(0, self.params.num_units(), num_periods)?;

        let zeros = vec![0.0; num_periods];
        let y0 = vec![[0.0; NUM_MODES]; num_periods];
        let s0 = vec![[0.0; NUM_SLACKS]; num_periods];
        let u0 = vec![[0.0; NUM_PRICES]; num_periods];
        for unit in self.params.units() {
            store.save_x_for_unit(0, unit.id, &zeros, &zeros)?;
            store.save_y_for_unit(0, unit.id, &y0)?;
            store.save_s_for_unit(0, unit.id, &s0)?;
            store.save_u_for_unit(0, unit.id, &u0)?;
        }

        let feasible = checker.check(store, 0).is_feasible();
        let objective = global_objective(self.params, store, 0);
        let recorded = if feasible {
            objective
        } else {
            self.config.penalized(objective)
        };
        store.save_objective(0, recorded)?;
        store.save_feasibility(0, feasible)?;
        store.seal(0)?;
        Ok(())
    }

    /// Dispatch values carried over from the latest sealed iteration when
    /// the joint solve fails outright.
    fn previous_dispatch(&self, store: &IterationStore, k: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        let num_periods = self.params.num_periods();
        let mut x = Vec::with_capacity(self.params.num_units());
        let mut hydrogen = Vec::with_capacity(self.params.num_units());
        for unit in self.params.units() {
            x.push(store.x_for_unit_or_default(k, unit.id, num_periods));
            hydrogen.push(
                store
                    .get_hydrogen_for_unit(k, unit.id)
                    .map(<[f64]>::to_vec)
                    .unwrap_or_else(|| vec![0.0; num_periods]),
            );
        }
        (x, hydrogen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eflex_core::{GlobalParameters, Unit};

    #[test]
    fn controller_seeds_a_sealed_zero_iteration() {
        let globals = GlobalParameters {
            interval_length: 1.0,
            demand: vec![0.0, 0.0],
            electricity_price: vec![1.0, 1.0],
            demand_deviation_cost: 10.0,
            rho: 1.0,
        };
        let params =
            Parameters::new(vec![Unit::new(UnitId::new(0), "u")], globals).unwrap();
        let controller = ConvergenceController::new(
            &params,
            ControllerConfig::default(),
            SolverSuite::default(),
        );
        let checker = FeasibilityChecker::new(&params, &ControllerConfig::default());
        let mut store = IterationStore::new();
        controller
            .seed_initial_iteration(&mut store, &checker)
            .unwrap();

        assert!(store.is_sealed(0));
        // All-zero modes violate one-hot, so the zero point is infeasible.
        assert_eq!(store.feasibility(0), Some(false));
        assert_eq!(store.objective(0), Some(0.0));
    }

    struct FailingAdapter;

    impl SolverAdapter for FailingAdapter {
        fn id(&self) -> &str {
            "failing"
        }

        fn supports_binaries(&self) -> bool {
            true
        }

        fn solve(
            &self,
            _model: &eflex_solver::Model,
        ) -> Result<eflex_solver::Solved, eflex_solver::SolverError> {
            Err(eflex_solver::SolverError::Backend {
                backend: "failing".to_string(),
                reason: "factorization failed".to_string(),
            })
        }
    }

    #[test]
    fn backend_failure_degrades_to_infeasible_iterations() {
        // A dead backend must not abort the run: each block keeps the
        // previous iteration's values and the iteration seals infeasible.
        let globals = GlobalParameters {
            interval_length: 1.0,
            demand: vec![1.0, 1.0],
            electricity_price: vec![1.0, 1.0],
            demand_deviation_cost: 10.0,
            rho: 1.0,
        };
        let params =
            Parameters::new(vec![Unit::new(UnitId::new(0), "u")], globals).unwrap();
        let suite = SolverSuite {
            continuous: Box::new(FailingAdapter),
            discrete: Box::new(FailingAdapter),
        };
        let config = ControllerConfig {
            max_iterations: 2,
            ..ControllerConfig::default()
        };
        let controller = ConvergenceController::new(&params, config, suite);

        let solution = controller.run().unwrap();
        assert!(!solution.converged);
        assert_eq!(solution.final_iteration, 2);
        assert!(solution.iterations.iter().all(|s| !s.feasible));
        assert!(solution.store.is_sealed(2));
    }
}
