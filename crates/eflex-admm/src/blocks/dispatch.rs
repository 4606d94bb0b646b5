//! X-update: the joint continuous dispatch block.
//!
//! One quadratic program across all units and periods:
//!
//! ```text
//!   min  Σ powerRating·price·Δt·x                    (operating cost)
//!      + Σ deviationCost·(posDev + negDev)           (demand tracking)
//!      + Σ (ρ/2)·(r₁² + r₂²)                         (coupling residuals)
//!      + Σ rampScale·excess²                         (ramp excess, producing)
//! ```
//!
//! with `r₁ = −x + minOut·prod + s₁ + u₁` and
//! `r₂ = x − maxOut·prod + s₂ + u₂`, where the production flag, slacks and
//! prices are constants taken from the previous iteration.

use eflex_core::{EflexResult, IterationStore, Parameters};
use eflex_solver::{Model, Sense, SolveStatus, SolverAdapter};
use tracing::{debug, warn};

use crate::config::ControllerConfig;

/// Output of one dispatch solve, to be written to iteration `k + 1`.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Solver status; non-optimal results are kept and later classified
    /// infeasible by the controller.
    pub status: SolveStatus,
    /// Dispatch fraction per unit-period, `[unit][t - 1]`.
    pub x: Vec<Vec<f64>>,
    /// Derived hydrogen production per unit-period.
    pub hydrogen: Vec<Vec<f64>>,
}

/// Solve the joint dispatch program against iteration `k`'s modes, slacks
/// and prices.
pub fn dispatch_update(
    params: &Parameters,
    config: &ControllerConfig,
    store: &IterationStore,
    k: usize,
    adapter: &dyn SolverAdapter,
) -> EflexResult<DispatchResult> {
    let num_units = params.num_units();
    let num_periods = params.num_periods();
    let globals = params.globals();
    let dt = globals.interval_length;
    let rho = globals.rho;

    let mut model = Model::new();

    // Previous-iteration constants per unit.
    let mut prod_flags: Vec<Vec<f64>> = Vec::with_capacity(num_units);
    let mut slacks = Vec::with_capacity(num_units);
    let mut prices = Vec::with_capacity(num_units);
    for unit in params.units() {
        let y = store.y_for_unit_or_default(k, unit.id, num_periods);
        prod_flags.push(
            y.iter()
                .map(|modes| modes[eflex_core::OperatingMode::Production.index()])
                .collect(),
        );
        slacks.push(store.s_for_unit_or_default(k, unit.id, num_periods));
        prices.push(store.u_for_unit_or_default(k, unit.id, num_periods));
    }

    // Dispatch variables with operating cost and coupling penalties.
    let mut x_vars = vec![Vec::with_capacity(num_periods); num_units];
    for (a, unit) in params.units().iter().enumerate() {
        for t in 1..=num_periods {
            let x = model.add_continuous(0.0, 1.0);
            model.add_linear(x, unit.power_rating * params.price(t) * dt);

            let prod = prod_flags[a][t - 1];
            let [s1, s2] = slacks[a][t - 1];
            let [u1, u2, _, _] = prices[a][t - 1];

            // r1 = -x + minOut*prod + s1 + u1
            model.add_squared_penalty(
                rho / 2.0,
                &[(x, -1.0)],
                unit.min_output * prod + s1 + u1,
            );
            // r2 = x - maxOut*prod + s2 + u2
            model.add_squared_penalty(rho / 2.0, &[(x, 1.0)], -unit.max_output * prod + s2 + u2);

            x_vars[a].push(x);
        }
    }

    // Demand deviation: posDev/negDev bound the signed gap between
    // aggregate linearized production and demand.
    for t in 1..=num_periods {
        let pos = model.add_continuous(0.0, f64::INFINITY);
        let neg = model.add_continuous(0.0, f64::INFINITY);
        model.add_linear(pos, globals.demand_deviation_cost);
        model.add_linear(neg, globals.demand_deviation_cost);

        let mut fixed_production = 0.0;
        let mut terms: Vec<(eflex_solver::VarId, f64)> = Vec::with_capacity(num_units + 1);
        for (a, unit) in params.units().iter().enumerate() {
            terms.push((x_vars[a][t - 1], dt * unit.slope * unit.power_rating));
            fixed_production += dt * unit.intercept * prod_flags[a][t - 1];
        }

        // production - demand <= posDev
        let mut upper = terms.clone();
        upper.push((pos, -1.0));
        model.add_constraint(upper, Sense::Le, params.demand(t) - fixed_production);

        // demand - production <= negDev
        let mut lower: Vec<_> = terms.iter().map(|&(v, c)| (v, -c)).collect();
        lower.push((neg, -1.0));
        model.add_constraint(lower, Sense::Le, fixed_production - params.demand(t));
    }

    // Ramp excess while producing, against the previous-iteration flag.
    for (a, unit) in params.units().iter().enumerate() {
        for t in 2..=num_periods {
            if prod_flags[a][t - 1] < 0.5 {
                continue;
            }
            let excess = model.add_continuous(0.0, f64::INFINITY);
            model.add_quadratic(excess, excess, config.ramp_penalty_scale);
            let curr = x_vars[a][t - 1];
            let prev = x_vars[a][t - 2];
            // excess >= x_t - x_{t-1} - rampRate and the mirrored form.
            model.add_constraint(
                vec![(excess, -1.0), (curr, 1.0), (prev, -1.0)],
                Sense::Le,
                unit.ramp_rate,
            );
            model.add_constraint(
                vec![(excess, -1.0), (curr, -1.0), (prev, 1.0)],
                Sense::Le,
                unit.ramp_rate,
            );
        }
    }

    let solved = adapter
        .solve(&model)
        .map_err(|e| eflex_core::EflexError::Solver(e.to_string()))?;

    if !solved.status.is_optimal() {
        warn!(
            iteration = k,
            status = %solved.status,
            "dispatch solve non-optimal, keeping last reported values"
        );
    } else {
        debug!(iteration = k, objective = solved.objective, "dispatch solved");
    }

    let mut x = vec![vec![0.0; num_periods]; num_units];
    let mut hydrogen = vec![vec![0.0; num_periods]; num_units];
    for (a, unit) in params.units().iter().enumerate() {
        for t in 1..=num_periods {
            let value = solved.values[x_vars[a][t - 1].index()].clamp(0.0, 1.0);
            x[a][t - 1] = value;
            hydrogen[a][t - 1] = unit.hydrogen(dt, value, prod_flags[a][t - 1]);
        }
    }

    Ok(DispatchResult {
        status: solved.status,
        x,
        hydrogen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use eflex_core::{GlobalParameters, Unit, UnitId};
    use eflex_solver::ClarabelAdapter;

    fn two_unit_params() -> Parameters {
        let units = vec![
            Unit::new(UnitId::new(0), "a")
                .with_power_rating(1.0)
                .with_output_range(0.2, 1.0)
                .with_production_curve(10.0, 0.0),
            Unit::new(UnitId::new(1), "b")
                .with_power_rating(1.0)
                .with_output_range(0.2, 1.0)
                .with_production_curve(10.0, 0.0),
        ];
        let globals = GlobalParameters {
            interval_length: 1.0,
            demand: vec![10.0; 3],
            electricity_price: vec![1.0; 3],
            demand_deviation_cost: 1000.0,
            rho: 1.0,
        };
        Parameters::new(units, globals).unwrap()
    }

    #[test]
    fn dispatch_tracks_demand() {
        let params = two_unit_params();
        let mut store = IterationStore::new();
        store.init(0, 2, 3).unwrap();
        // Both units producing at iteration 0.
        let y = vec![[0.0, 0.0, 1.0, 0.0]; 3];
        store.save_y_for_unit(0, UnitId::new(0), &y).unwrap();
        store.save_y_for_unit(0, UnitId::new(1), &y).unwrap();

        let result = dispatch_update(
            &params,
            &ControllerConfig::default(),
            &store,
            0,
            &ClarabelAdapter::new(),
        )
        .unwrap();

        assert!(result.status.is_optimal());
        // Demand 10 with two units of 10 kg at full dispatch: aggregate
        // production should come close to demand.
        for t in 0..3 {
            let produced = result.hydrogen[0][t] + result.hydrogen[1][t];
            assert!((produced - 10.0).abs() < 0.5, "t={t} produced {produced}");
        }
    }

    #[test]
    fn dispatch_stays_in_bounds() {
        let params = two_unit_params();
        let mut store = IterationStore::new();
        store.init(0, 2, 3).unwrap();

        let result = dispatch_update(
            &params,
            &ControllerConfig::default(),
            &store,
            0,
            &ClarabelAdapter::new(),
        )
        .unwrap();

        for unit in &result.x {
            for &x in unit {
                assert!((0.0..=1.0).contains(&x));
            }
        }
    }
}
