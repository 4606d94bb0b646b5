//! S-update: per-unit slack quadratic program.
//!
//! Slacks absorb what the dispatch and mode blocks could not agree on in
//! this iteration: `s1` covers the minimum-output residual, `s2` the
//! maximum-output residual. Both are non-negative, so the block is a pair
//! of independent one-variable QPs per period and always feasible.

use eflex_core::{EflexResult, IterationStore, Parameters, UnitId, NUM_SLACKS};
use eflex_solver::{Model, SolverAdapter};
use tracing::warn;

/// Solve one unit's slack program for iteration `k + 1` over `periods`
/// (1-based, typically the full horizon).
///
/// Reads the iteration `k + 1` dispatch and modes and the iteration `k`
/// prices. Returns `[s1, s2]` per requested period, in period order.
pub fn slack_update(
    params: &Parameters,
    store: &IterationStore,
    k: usize,
    unit_id: UnitId,
    periods: &[usize],
    adapter: &dyn SolverAdapter,
) -> EflexResult<Vec<[f64; NUM_SLACKS]>> {
    let unit = params
        .unit(unit_id)
        .ok_or_else(|| eflex_core::EflexError::Validation(format!("unknown unit {unit_id}")))?;
    let num_periods = params.num_periods();
    let rho = params.globals().rho;

    let x = store.x_for_unit_or_default(k + 1, unit_id, num_periods);
    let y = store.y_for_unit_or_default(k + 1, unit_id, num_periods);
    let u = store.u_for_unit_or_default(k, unit_id, num_periods);

    let mut model = Model::new();
    let mut slack_vars = Vec::with_capacity(periods.len());

    for &t in periods {
        let i = t - 1;
        let prod = y[i][eflex_core::OperatingMode::Production.index()];
        let [u1, u2, _, _] = u[i];

        let s1 = model.add_continuous(0.0, f64::INFINITY);
        let s2 = model.add_continuous(0.0, f64::INFINITY);

        // r1 = -x + minOut*prod + s1 + u1
        model.add_squared_penalty(
            rho / 2.0,
            &[(s1, 1.0)],
            -x[i] + unit.min_output * prod + u1,
        );
        // r2 = x - maxOut*prod + s2 + u2
        model.add_squared_penalty(
            rho / 2.0,
            &[(s2, 1.0)],
            x[i] - unit.max_output * prod + u2,
        );

        slack_vars.push((s1, s2));
    }

    let solved = adapter
        .solve(&model)
        .map_err(|e| eflex_core::EflexError::Solver(e.to_string()))?;

    if !solved.status.is_optimal() {
        warn!(
            iteration = k,
            %unit_id,
            status = %solved.status,
            "slack solve non-optimal, keeping previous slacks"
        );
        let previous = store.s_for_unit_or_default(k, unit_id, num_periods);
        return Ok(periods.iter().map(|&t| previous[t - 1]).collect());
    }

    Ok(slack_vars
        .iter()
        .map(|&(s1, s2)| {
            [
                solved.values[s1.index()].max(0.0),
                solved.values[s2.index()].max(0.0),
            ]
        })
        .collect())
}
