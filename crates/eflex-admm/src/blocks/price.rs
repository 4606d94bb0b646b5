//! U-update: closed-form dual-price ascent, one pass per unit.
//!
//! No solver call is involved. Each multiplier accumulates its residual
//! evaluated at the iteration's fresh primal values:
//!
//! * `u1` and `u2` track the min/max coupling residuals,
//! * `u3` drifts with the mode-indicator sum (one-hot pressure),
//! * `u4` is a damped ramp-excess multiplier, defined only for `t > 1`
//!   and carried over unchanged in the first period.

use eflex_core::{
    EflexResult, IterationStore, OperatingMode, Parameters, UnitId, NUM_PRICES,
};

/// Compute one unit's updated prices for iteration `k + 1` over `periods`
/// (1-based). Pure arithmetic over iteration `k + 1` primal values and the
/// iteration `k` prices; identical inputs always yield identical outputs.
pub fn price_update(
    params: &Parameters,
    store: &IterationStore,
    k: usize,
    unit_id: UnitId,
    periods: &[usize],
    damping: f64,
) -> EflexResult<Vec<[f64; NUM_PRICES]>> {
    let unit = params
        .unit(unit_id)
        .ok_or_else(|| eflex_core::EflexError::Validation(format!("unknown unit {unit_id}")))?;
    let num_periods = params.num_periods();

    let x = store.x_for_unit_or_default(k + 1, unit_id, num_periods);
    let y = store.y_for_unit_or_default(k + 1, unit_id, num_periods);
    let s = store.s_for_unit_or_default(k + 1, unit_id, num_periods);
    let u = store.u_for_unit_or_default(k, unit_id, num_periods);

    let prod_index = OperatingMode::Production.index();
    let mut prices = Vec::with_capacity(periods.len());

    for &t in periods {
        let i = t - 1;
        let prod = y[i][prod_index];
        let [s1, s2] = s[i];
        let [u1, u2, u3, u4] = u[i];

        let u1_next = -x[i] + unit.min_output * prod + s1 + u1;
        let u2_next = x[i] - unit.max_output * prod + s2 + u2;
        let mode_sum: f64 = y[i].iter().sum();
        let u3_next = mode_sum + u3;
        let u4_next = if t > 1 {
            damping * ((x[i] - x[i - 1]).abs() - unit.ramp_rate * prod + u4)
        } else {
            u4
        };

        prices.push([u1_next, u2_next, u3_next, u4_next]);
    }

    Ok(prices)
}
