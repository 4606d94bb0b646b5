//! Distributed iteration execution.
//!
//! [`CoordinatedRun`] is the driver: it owns the joint dispatch solve and
//! the iteration evaluation, and announces the per-unit phases on a
//! [`PhaseBus`]. Each [`UnitExecutor`] runs the mode, slack, and price
//! blocks for its assigned units, reading and writing the shared store.
//! Each executor is the sole writer of its own unit slices, so writes
//! never race; the barriers order them against the phase reads.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use tracing::{debug, info, warn};

use eflex_admm::blocks::{dispatch_update, mode_update, price_update, slack_update};
use eflex_admm::{
    global_objective, ControllerConfig, FeasibilityChecker, IterationSummary, PhaseTimes,
};
use eflex_core::{
    EflexError, EflexResult, IterationStore, Parameters, UnitId, NUM_MODES, NUM_PRICES,
    NUM_SLACKS,
};
use eflex_solver::{ClarabelAdapter, MicrolpAdapter, SolverAdapter};

use crate::phase::{Phase, PhaseBus, PhaseListener};
use crate::worker::WorkerConfig;

/// Access to the iteration store shared between driver and executors.
///
/// The local deployment wraps an in-process lock; a remote deployment
/// would put its transport behind the same surface.
pub trait SharedStore: Send + Sync {
    fn read(&self) -> RwLockReadGuard<'_, IterationStore>;
    fn write(&self) -> RwLockWriteGuard<'_, IterationStore>;
}

/// In-process shared store.
#[derive(Clone, Default)]
pub struct LocalStore {
    inner: Arc<RwLock<IterationStore>>,
}

impl LocalStore {
    pub fn new(store: IterationStore) -> Self {
        LocalStore {
            inner: Arc::new(RwLock::new(store)),
        }
    }
}

impl SharedStore for LocalStore {
    fn read(&self) -> RwLockReadGuard<'_, IterationStore> {
        self.inner.read().expect("iteration store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, IterationStore> {
        self.inner.write().expect("iteration store lock poisoned")
    }
}

/// Executes the per-unit blocks for an assigned set of units and periods.
pub struct UnitExecutor<S: SharedStore> {
    params: Arc<Parameters>,
    config: ControllerConfig,
    store: S,
    units: Vec<UnitId>,
    periods: Vec<usize>,
    listener: PhaseListener,
    discrete: Box<dyn SolverAdapter>,
    continuous: Box<dyn SolverAdapter>,
}

impl<S: SharedStore> UnitExecutor<S> {
    pub fn new(
        params: Arc<Parameters>,
        config: ControllerConfig,
        store: S,
        units: Vec<UnitId>,
        periods: Vec<usize>,
        listener: PhaseListener,
    ) -> Self {
        UnitExecutor {
            params,
            config,
            store,
            units,
            periods,
            listener,
            discrete: Box::new(MicrolpAdapter::new()),
            continuous: Box::new(ClarabelAdapter::new()),
        }
    }

    /// React to announced phases until shutdown.
    ///
    /// A failing block never skips the rendezvous: the driver is counting
    /// this executor in the phase barrier, so an early return would leave
    /// it waiting forever. Per-unit failures are logged and the previous
    /// iteration's slice is carried instead.
    pub async fn run(mut self) -> EflexResult<()> {
        loop {
            match self.listener.next_phase().await {
                Phase::Idle => continue,
                Phase::Mode(k) => {
                    self.run_mode(k);
                    self.listener.complete().await;
                }
                Phase::Slack(k) => {
                    self.run_slack(k);
                    self.listener.complete().await;
                }
                Phase::Price(k) => {
                    self.run_price(k);
                    self.listener.complete().await;
                }
                Phase::Done => return Ok(()),
            }
        }
    }

    fn run_mode(&self, k: usize) {
        let num_periods = self.params.num_periods();
        for &unit in &self.units {
            let y = {
                let store = self.store.read();
                match mode_update(&self.params, &store, k, unit, self.discrete.as_ref()) {
                    Ok(y) => y,
                    Err(err) => {
                        warn!(
                            iteration = k,
                            %unit,
                            error = %err,
                            "mode solve failed, keeping previous modes"
                        );
                        store.y_for_unit_or_default(k, unit, num_periods)
                    }
                }
            };
            if let Err(err) = self.store.write().save_y_for_unit(k + 1, unit, &y) {
                warn!(iteration = k, %unit, error = %err, "cannot record modes");
            }
        }
        debug!(iteration = k, units = self.units.len(), "mode phase done");
    }

    fn run_slack(&self, k: usize) {
        let num_periods = self.params.num_periods();
        for &unit in &self.units {
            let full = {
                let store = self.store.read();
                match slack_update(
                    &self.params,
                    &store,
                    k,
                    unit,
                    &self.periods,
                    self.continuous.as_ref(),
                ) {
                    Ok(subset) => {
                        let mut full = vec![[0.0; NUM_SLACKS]; num_periods];
                        for (&t, values) in self.periods.iter().zip(&subset) {
                            full[t - 1] = *values;
                        }
                        full
                    }
                    Err(err) => {
                        warn!(
                            iteration = k,
                            %unit,
                            error = %err,
                            "slack solve failed, keeping previous slacks"
                        );
                        store.s_for_unit_or_default(k, unit, num_periods)
                    }
                }
            };
            if let Err(err) = self.store.write().save_s_for_unit(k + 1, unit, &full) {
                warn!(iteration = k, %unit, error = %err, "cannot record slacks");
            }
        }
    }

    fn run_price(&self, k: usize) {
        let num_periods = self.params.num_periods();
        for &unit in &self.units {
            let full = {
                let store = self.store.read();
                match price_update(
                    &self.params,
                    &store,
                    k,
                    unit,
                    &self.periods,
                    self.config.price_damping,
                ) {
                    Ok(subset) => {
                        let mut full = vec![[0.0; NUM_PRICES]; num_periods];
                        for (&t, values) in self.periods.iter().zip(&subset) {
                            full[t - 1] = *values;
                        }
                        full
                    }
                    Err(err) => {
                        warn!(
                            iteration = k,
                            %unit,
                            error = %err,
                            "price update failed, keeping previous prices"
                        );
                        store.u_for_unit_or_default(k, unit, num_periods)
                    }
                }
            };
            if let Err(err) = self.store.write().save_u_for_unit(k + 1, unit, &full) {
                warn!(iteration = k, %unit, error = %err, "cannot record prices");
            }
        }
    }
}

/// Outcome of a coordinated run.
pub struct CoordinatedOutcome {
    pub iterations: Vec<IterationSummary>,
    pub converged: bool,
    pub final_iteration: usize,
}

/// Driver for a distributed run: joint dispatch and evaluation stay here,
/// the per-unit phases are announced to the executors.
pub struct CoordinatedRun {
    params: Arc<Parameters>,
    config: ControllerConfig,
    store: LocalStore,
    bus: PhaseBus,
    continuous: Box<dyn SolverAdapter>,
}

impl CoordinatedRun {
    pub fn new(
        params: Arc<Parameters>,
        config: ControllerConfig,
        store: LocalStore,
        bus: PhaseBus,
    ) -> Self {
        CoordinatedRun {
            params,
            config,
            store,
            bus,
            continuous: Box::new(ClarabelAdapter::new()),
        }
    }

    /// Run iterations to convergence or the cap, then shut the executors
    /// down.
    pub async fn run(self) -> EflexResult<CoordinatedOutcome> {
        let num_units = self.params.num_units();
        let num_periods = self.params.num_periods();
        let unit_ids: Vec<UnitId> = self.params.units().iter().map(|u| u.id).collect();
        let checker = FeasibilityChecker::new(&self.params, &self.config);

        self.seed_iteration_zero(&checker)?;

        let mut iterations = Vec::new();
        let mut converged = false;
        let mut final_iteration = 0;

        for i in 1..=self.config.max_iterations {
            let k = i - 1;
            let mut times = PhaseTimes::default();

            let started = Instant::now();
            self.store.write().init(i, num_units, num_periods)?;
            let (x_next, hydrogen_next) = {
                let store = self.store.read();
                match dispatch_update(
                    &self.params,
                    &self.config,
                    &store,
                    k,
                    self.continuous.as_ref(),
                ) {
                    Ok(dispatch) => (dispatch.x, dispatch.hydrogen),
                    Err(EflexError::Solver(reason)) => {
                        warn!(
                            iteration = k,
                            reason = %reason,
                            "dispatch solve failed, keeping previous dispatch"
                        );
                        let mut x = Vec::with_capacity(num_units);
                        let mut hydrogen = Vec::with_capacity(num_units);
                        for &unit in &unit_ids {
                            x.push(store.x_for_unit_or_default(k, unit, num_periods));
                            hydrogen.push(
                                store
                                    .get_hydrogen_for_unit(k, unit)
                                    .map(<[f64]>::to_vec)
                                    .unwrap_or_else(|| vec![0.0; num_periods]),
                            );
                        }
                        (x, hydrogen)
                    }
                    Err(other) => return Err(other),
                }
            };
            {
                let mut store = self.store.write();
                for &unit in &unit_ids {
                    store.save_x_for_unit(
                        i,
                        unit,
                        &x_next[unit.value()],
                        &hydrogen_next[unit.value()],
                    )?;
                }
            }
            times.dispatch_ms = started.elapsed().as_millis();

            let started = Instant::now();
            self.bus.announce(Phase::Mode(k)).await;
            times.mode_ms = started.elapsed().as_millis();

            let started = Instant::now();
            self.bus.announce(Phase::Slack(k)).await;
            times.slack_ms = started.elapsed().as_millis();

            let started = Instant::now();
            self.bus.announce(Phase::Price(k)).await;
            times.price_ms = started.elapsed().as_millis();

            let started = Instant::now();
            let (recorded, feasible, violations) = {
                let mut store = self.store.write();
                let report = checker.check(&store, i);
                let feasible = report.is_feasible();
                let raw = global_objective(&self.params, &store, i);
                let recorded = if feasible {
                    raw
                } else {
                    self.config.penalized(raw)
                };
                store.save_objective(i, recorded)?;
                store.save_feasibility(i, feasible)?;
                store.seal(i)?;
                (recorded, feasible, report.violations.len())
            };
            times.evaluate_ms = started.elapsed().as_millis();

            info!(iteration = i, objective = recorded, feasible, "iteration sealed");
            iterations.push(IterationSummary {
                iteration: i,
                objective: recorded,
                feasible,
                violations,
                phase_times: times,
            });
            final_iteration = i;

            if feasible {
                let previous = self.store.read().objective(i - 1);
                if let Some(previous) = previous {
                    let improvement = if previous.abs() > 0.0 {
                        (previous - recorded).abs() / previous.abs()
                    } else {
                        (previous - recorded).abs()
                    };
                    if improvement < self.config.improvement_threshold {
                        converged = true;
                        break;
                    }
                }
            }
        }

        self.bus.finish();
        Ok(CoordinatedOutcome {
            iterations,
            converged,
            final_iteration,
        })
    }

    fn seed_iteration_zero(&self, checker: &FeasibilityChecker<'_>) -> EflexResult<()> {
        let num_periods = self.params.num_periods();
        let mut store = self.store.write();
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

        let feasible = checker.check(&store, 0).is_feasible();
        let raw = global_objective(&self.params, &store, 0);
        let recorded = if feasible {
            raw
        } else {
            self.config.penalized(raw)
        };
        store.save_objective(0, recorded)?;
        store.save_feasibility(0, feasible)?;
        store.seal(0)?;
        Ok(())
    }
}

/// Run the schedule with one in-process executor scoped to a worker's
/// assignment.
///
/// This is what a worker does after the handshake in a co-located
/// deployment: the driver and the executor share a [`LocalStore`]. A
/// remote deployment would hand the executor a transport-backed
/// [`SharedStore`] instead and keep the same shape.
pub async fn run_assignment(
    params: Arc<Parameters>,
    config: ControllerConfig,
    assignment: &WorkerConfig,
) -> EflexResult<CoordinatedOutcome> {
    let store = LocalStore::new(IterationStore::new());
    let (bus, listener) = PhaseBus::new(1);

    let executor = UnitExecutor::new(
        Arc::clone(&params),
        config.clone(),
        store.clone(),
        assignment.units.clone(),
        assignment.periods.clone(),
        listener,
    );
    let task = tokio::spawn(executor.run());

    let driver = CoordinatedRun::new(params, config, store, bus);
    let outcome = driver.run().await?;
    task.await
        .map_err(|err| EflexError::Coordination(format!("executor task failed: {err}")))??;
    Ok(outcome)
}
