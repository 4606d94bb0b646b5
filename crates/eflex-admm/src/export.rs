//! Tabular result export.
//!
//! Two reports: a per-iteration trace (objective, feasibility, phase
//! timings) and the terminal assignment, one row per unit and period with
//! the full primal and dual state.

use std::io::Write;

use eflex_core::{EflexResult, IterationStore, OperatingMode, Parameters, NUM_MODES};
use serde::Serialize;

use crate::controller::{IterationSummary, ScheduleSolution};

#[derive(Serialize)]
struct TraceRow {
    iteration: usize,
    objective: f64,
    feasible: bool,
    violations: usize,
    dispatch_ms: u128,
    mode_ms: u128,
    slack_ms: u128,
    price_ms: u128,
    evaluate_ms: u128,
}

impl From<&IterationSummary> for TraceRow {
    fn from(summary: &IterationSummary) -> Self {
        TraceRow {
            iteration: summary.iteration,
            objective: summary.objective,
            feasible: summary.feasible,
            violations: summary.violations,
            dispatch_ms: summary.phase_times.dispatch_ms,
            mode_ms: summary.phase_times.mode_ms,
            slack_ms: summary.phase_times.slack_ms,
            price_ms: summary.phase_times.price_ms,
            evaluate_ms: summary.phase_times.evaluate_ms,
        }
    }
}

/// Write the per-iteration trace as CSV.
pub fn write_iteration_trace<W: Write>(writer: W, solution: &ScheduleSolution) -> EflexResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for summary in &solution.iterations {
        csv.serialize(TraceRow::from(summary))
            .map_err(|e| eflex_core::EflexError::Other(e.to_string()))?;
    }
    csv.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct AssignmentRow<'a> {
    unit: usize,
    name: &'a str,
    period: usize,
    dispatch: f64,
    mode: &'static str,
    s1: f64,
    s2: f64,
    u1: f64,
    u2: f64,
    u3: f64,
    u4: f64,
    hydrogen: f64,
}

/// Write the terminal iteration's full assignment as CSV, one row per
/// unit and period.
pub fn write_final_assignment<W: Write>(
    writer: W,
    params: &Parameters,
    store: &IterationStore,
    k: usize,
) -> EflexResult<()> {
    let num_periods = params.num_periods();
    let mut csv = csv::Writer::from_writer(writer);

    for unit in params.units() {
        let x = store.x_for_unit_or_default(k, unit.id, num_periods);
        let y = store.y_for_unit_or_default(k, unit.id, num_periods);
        let s = store.s_for_unit_or_default(k, unit.id, num_periods);
        let u = store.u_for_unit_or_default(k, unit.id, num_periods);
        let hydrogen = store
            .get_hydrogen_for_unit(k, unit.id)
            .map(<[f64]>::to_vec)
            .unwrap_or_else(|| vec![0.0; num_periods]);

        for t in 1..=num_periods {
            let i = t - 1;
            csv.serialize(AssignmentRow {
                unit: unit.id.value(),
                name: &unit.name,
                period: t,
                dispatch: x[i],
                mode: active_mode_label(&y[i]),
                s1: s[i][0],
                s2: s[i][1],
                u1: u[i][0],
                u2: u[i][1],
                u3: u[i][2],
                u4: u[i][3],
                hydrogen: hydrogen[i],
            })
            .map_err(|e| eflex_core::EflexError::Other(e.to_string()))?;
        }
    }
    csv.flush()?;
    Ok(())
}

fn active_mode_label(row: &[f64; NUM_MODES]) -> &'static str {
    OperatingMode::MODES
        .iter()
        .find(|m| row[m.index()] >= 0.5)
        .map(OperatingMode::label)
        .unwrap_or("none")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::PhaseTimes;
    use eflex_core::{GlobalParameters, Unit, UnitId, NUM_PRICES, NUM_SLACKS};

    fn small_params() -> Parameters {
        let globals = GlobalParameters {
            interval_length: 1.0,
            demand: vec![1.0, 1.0],
            electricity_price: vec![1.0, 1.0],
            demand_deviation_cost: 1.0,
            rho: 1.0,
        };
        Parameters::new(vec![Unit::new(UnitId::new(0), "ely-1")], globals).unwrap()
    }

    #[test]
    fn trace_csv_has_header_and_rows() {
        let solution = ScheduleSolution {
            iterations: vec![IterationSummary {
                iteration: 1,
                objective: 12.5,
                feasible: true,
                violations: 0,
                phase_times: PhaseTimes::default(),
            }],
            converged: true,
            final_iteration: 1,
            store: IterationStore::new(),
        };

        let mut buffer = Vec::new();
        write_iteration_trace(&mut buffer, &solution).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("iteration,objective,feasible"));
        assert!(text.contains("1,12.5,true,0"));
    }

    #[test]
    fn assignment_csv_labels_modes() {
        let params = small_params();
        let mut store = IterationStore::new();
        store.init(0, 1, 2).unwrap();
        let mut y = vec![[0.0; NUM_MODES]; 2];
        y[0][OperatingMode::Idle.index()] = 1.0;
        y[1][OperatingMode::Production.index()] = 1.0;
        store
            .save_x_for_unit(0, UnitId::new(0), &[0.0, 0.7], &[0.0, 0.7])
            .unwrap();
        store.save_y_for_unit(0, UnitId::new(0), &y).unwrap();
        store
            .save_s_for_unit(0, UnitId::new(0), &[[0.0; NUM_SLACKS]; 2])
            .unwrap();
        store
            .save_u_for_unit(0, UnitId::new(0), &[[0.0; NUM_PRICES]; 2])
            .unwrap();

        let mut buffer = Vec::new();
        write_final_assignment(&mut buffer, &params, &store, 0).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("idle"));
        assert!(text.contains("production"));
        assert!(text.contains("ely-1"));
    }
}
