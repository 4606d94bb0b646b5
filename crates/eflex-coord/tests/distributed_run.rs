//! Phase-barrier run with one executor per unit.

use std::sync::Arc;

use eflex_admm::ControllerConfig;
use eflex_core::{GlobalParameters, IterationStore, Parameters, Unit, UnitId};

use eflex_coord::{
    run_assignment, CoordinatedRun, LocalStore, PhaseBus, SharedStore, UnitExecutor, WorkerConfig,
};

fn two_unit_problem() -> Parameters {
    let globals = GlobalParameters {
        interval_length: 1.0,
        demand: vec![0.0, 0.0, 2.4, 2.4],
        electricity_price: vec![0.1; 4],
        demand_deviation_cost: 100.0,
        rho: 1.0,
    };
    let units = (0..2)
        .map(|i| {
            Unit::new(UnitId::new(i), format!("ely-{i}"))
                .with_power_rating(1.0)
                .with_output_range(0.1, 1.0)
                .with_production_curve(2.0, 0.0)
        })
        .collect();
    Parameters::new(units, globals).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coordinated_run_matches_local_semantics() {
    let params = Arc::new(two_unit_problem());
    let config = ControllerConfig {
        max_iterations: 20,
        ..ControllerConfig::default()
    };
    let store = LocalStore::new(IterationStore::new());
    let (bus, listener) = PhaseBus::new(2);
    let all_periods: Vec<usize> = (1..=4).collect();

    let mut executors = Vec::new();
    for unit in 0..2 {
        let executor = UnitExecutor::new(
            Arc::clone(&params),
            config.clone(),
            store.clone(),
            vec![UnitId::new(unit)],
            all_periods.clone(),
            listener.clone(),
        );
        executors.push(tokio::spawn(executor.run()));
    }
    drop(listener);

    let driver = CoordinatedRun::new(Arc::clone(&params), config, store.clone(), bus);
    let outcome = driver.run().await.unwrap();

    for task in executors {
        task.await.unwrap().unwrap();
    }

    assert!(outcome.converged, "no convergence within 20 iterations");
    let last = outcome.iterations.last().unwrap();
    assert!(last.feasible);

    // Every iteration the driver reported is sealed in the shared store.
    let store = store.read();
    for summary in &outcome.iterations {
        assert!(store.is_sealed(summary.iteration));
        assert_eq!(store.objective(summary.iteration), Some(summary.objective));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misconfigured_executor_does_not_stall_the_run() {
    // An executor scoped to a unit the problem does not have can never
    // produce a valid slice, but it must still meet every phase barrier;
    // otherwise the driver waits on the rendezvous forever.
    let globals = GlobalParameters {
        interval_length: 1.0,
        demand: vec![1.2; 4],
        electricity_price: vec![0.1; 4],
        demand_deviation_cost: 100.0,
        rho: 1.0,
    };
    let unit = Unit::new(UnitId::new(0), "ely-0")
        .with_power_rating(1.0)
        .with_output_range(0.1, 1.0)
        .with_production_curve(2.0, 0.0);
    let params = Arc::new(Parameters::new(vec![unit], globals).unwrap());

    let config = ControllerConfig {
        max_iterations: 3,
        ..ControllerConfig::default()
    };
    let store = LocalStore::new(IterationStore::new());
    let (bus, listener) = PhaseBus::new(1);

    let executor = UnitExecutor::new(
        Arc::clone(&params),
        config.clone(),
        store.clone(),
        vec![UnitId::new(5)],
        (1..=4).collect(),
        listener,
    );
    let task = tokio::spawn(executor.run());

    let driver = CoordinatedRun::new(params, config, store, bus);
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), driver.run())
        .await
        .expect("driver stalled on a phase barrier")
        .unwrap();
    task.await.unwrap().unwrap();

    // Nothing ever writes unit 0's modes, so no iteration can be feasible.
    assert!(!outcome.converged);
    assert_eq!(outcome.final_iteration, 3);
    assert!(outcome.iterations.iter().all(|s| !s.feasible));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn assignment_run_solves_a_full_scope_worker() {
    // What the worker subcommand does after the handshake: one executor
    // covering every unit and period, driven to termination in-process.
    let params = Arc::new(two_unit_problem());
    let assignment = WorkerConfig {
        registry_addr: "127.0.0.1:0".to_string(),
        name: "solo".to_string(),
        units: vec![UnitId::new(0), UnitId::new(1)],
        periods: (1..=4).collect(),
        phone_book_wait: std::time::Duration::from_secs(1),
    };
    let config = ControllerConfig {
        max_iterations: 20,
        ..ControllerConfig::default()
    };

    let outcome = run_assignment(params, config, &assignment).await.unwrap();
    assert!(outcome.converged, "no convergence within 20 iterations");
    assert!(outcome.iterations.last().unwrap().feasible);
}
