//! Y-update: the discrete operating-mode block, one MILP per unit.
//!
//! Decision variables are one binary per period per mode. The state machine
//! is hard-constrained (transition legality, minimum dwell, the period-1
//! pin and the period-2 boundary); tracking the dispatch block happens
//! through the same quadratic coupling penalties as the X-update, now with
//! the production flag as a decision variable, plus a one-hot penalty on
//! `(Σ_m y − 1)²`.

use eflex_core::{
    EflexResult, IterationStore, OperatingMode, Parameters, UnitId, NUM_MODES,
};
use eflex_solver::{Model, Sense, SolverAdapter, VarId};
use tracing::warn;

/// Solve one unit's mode program for iteration `k + 1`.
///
/// Reads the just-published dispatch of iteration `k + 1` and the slacks
/// and prices of iteration `k`. Returns the boolean mode matrix; on a
/// non-optimal solve the previous iteration's modes are kept.
pub fn mode_update(
    params: &Parameters,
    store: &IterationStore,
    k: usize,
    unit_id: UnitId,
    adapter: &dyn SolverAdapter,
) -> EflexResult<Vec<[f64; NUM_MODES]>> {
    let unit = params
        .unit(unit_id)
        .ok_or_else(|| eflex_core::EflexError::Validation(format!("unknown unit {unit_id}")))?;
    let num_periods = params.num_periods();
    let dt = params.globals().interval_length;
    let rho = params.globals().rho;

    let x = store.x_for_unit_or_default(k + 1, unit_id, num_periods);
    let s = store.s_for_unit_or_default(k, unit_id, num_periods);
    let u = store.u_for_unit_or_default(k, unit_id, num_periods);

    let mut model = Model::new();

    // y[mode][t - 1]
    let y: Vec<Vec<VarId>> = (0..NUM_MODES)
        .map(|_| (0..num_periods).map(|_| model.add_binary()).collect())
        .collect();

    let idle = OperatingMode::Idle.index();
    let starting = OperatingMode::Starting.index();
    let production = OperatingMode::Production.index();
    let standby = OperatingMode::Standby.index();

    // Period 1 is the known initial state.
    for m in 0..NUM_MODES {
        let pinned = if m == unit.initial_mode.index() { 1.0 } else { 0.0 };
        model.add_constraint(vec![(y[m][0], 1.0)], Sense::Eq, pinned);
    }

    // Period 2 is reachable only as Starting or Idle.
    if num_periods >= 2 {
        model.add_constraint(vec![(y[production][1], 1.0)], Sense::Eq, 0.0);
        model.add_constraint(vec![(y[standby][1], 1.0)], Sense::Eq, 0.0);
    }

    // Transition legality.
    let startup_dwell = unit.min_dwell_for(OperatingMode::Starting).max(1);
    for t in 2..=num_periods {
        let i = t - 1;
        let p = t - 2;

        model.add_constraint(
            vec![(y[starting][i], 1.0), (y[idle][p], -1.0), (y[starting][p], -1.0)],
            Sense::Le,
            0.0,
        );

        let mut prod_terms = vec![
            (y[production][i], 1.0),
            (y[standby][p], -1.0),
            (y[production][p], -1.0),
        ];
        // Production is reachable from a startup only once the startup
        // dwell has elapsed.
        if t > startup_dwell {
            prod_terms.push((y[starting][t - startup_dwell - 1], -1.0));
        }
        model.add_constraint(prod_terms, Sense::Le, 0.0);

        model.add_constraint(
            vec![(y[standby][i], 1.0), (y[production][p], -1.0), (y[standby][p], -1.0)],
            Sense::Le,
            0.0,
        );
        model.add_constraint(
            vec![
                (y[idle][i], 1.0),
                (y[idle][p], -1.0),
                (y[production][p], -1.0),
                (y[standby][p], -1.0),
            ],
            Sense::Le,
            0.0,
        );
    }

    // Minimum dwell: a mode entered at t must still be held at t+1..t+d-1.
    for m in 0..NUM_MODES {
        let dwell = unit.min_dwell[m];
        if dwell < 2 {
            continue;
        }
        for t in 2..=num_periods {
            for tau in 1..dwell {
                if t + tau > num_periods {
                    break;
                }
                model.add_constraint(
                    vec![
                        (y[m][t - 1], 1.0),
                        (y[m][t - 2], -1.0),
                        (y[m][t + tau - 1], -1.0),
                    ],
                    Sense::Le,
                    0.0,
                );
            }
        }
    }

    // Objective: mode costs plus the coupling and one-hot penalties.
    for t in 1..=num_periods {
        let i = t - 1;
        model.add_linear(y[starting][i], unit.startup_cost * dt);
        model.add_linear(y[standby][i], unit.standby_cost * dt);

        let [s1, s2] = s[i];
        let [u1, u2, _, _] = u[i];

        // r1 = -x + minOut*prod + s1 + u1 (prod now a variable)
        model.add_squared_penalty(
            rho / 2.0,
            &[(y[production][i], unit.min_output)],
            -x[i] + s1 + u1,
        );
        // r2 = x - maxOut*prod + s2 + u2
        model.add_squared_penalty(
            rho / 2.0,
            &[(y[production][i], -unit.max_output)],
            x[i] + s2 + u2,
        );
        // One-hot: (Σ_m y - 1)^2
        let one_hot: Vec<(VarId, f64)> = (0..NUM_MODES).map(|m| (y[m][i], 1.0)).collect();
        model.add_squared_penalty(rho / 2.0, &one_hot, -1.0);
    }

    let solved = adapter
        .solve(&model)
        .map_err(|e| eflex_core::EflexError::Solver(e.to_string()))?;

    if !solved.status.is_optimal() {
        warn!(
            iteration = k,
            %unit_id,
            status = %solved.status,
            "mode solve non-optimal, keeping previous modes"
        );
        return Ok(store.y_for_unit_or_default(k, unit_id, num_periods));
    }

    let mut modes = vec![[0.0; NUM_MODES]; num_periods];
    for (m, row) in y.iter().enumerate() {
        for (i, var) in row.iter().enumerate() {
            modes[i][m] = if solved.values[var.index()] >= 0.5 { 1.0 } else { 0.0 };
        }
    }
    Ok(modes)
}
