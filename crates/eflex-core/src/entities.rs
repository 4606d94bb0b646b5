//! Problem entities: units, operating modes, and run-wide parameters.
//!
//! Everything here is immutable once a run starts. Periods are dense
//! `1..=T` and carried as plain `usize` indices; units get a newtype id
//! so unit and period indices cannot be confused at call sites.

use serde::{Deserialize, Serialize};

use crate::error::{EflexError, EflexResult};

/// Number of operating modes in the state machine.
pub const NUM_MODES: usize = 4;

/// Type-safe unit identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(usize);

impl UnitId {
    /// Create a new unit id from a zero-based index.
    pub fn new(value: usize) -> Self {
        UnitId(value)
    }

    /// The underlying zero-based index.
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

/// Discrete operating state of a unit in one period.
///
/// Exactly one mode should be active per unit per period; during iteration
/// this is a soft (penalized) condition, the feasibility checker enforces it
/// within tolerance before a terminal solution is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Shut down, no consumption.
    Idle,
    /// Warming up towards production; must be held for the startup dwell.
    Starting,
    /// Producing hydrogen between min and max output.
    Production,
    /// Hot standby, ready to resume production without a restart.
    Standby,
}

impl OperatingMode {
    /// All modes in their stable index order.
    pub const MODES: [OperatingMode; NUM_MODES] = [
        OperatingMode::Idle,
        OperatingMode::Starting,
        OperatingMode::Production,
        OperatingMode::Standby,
    ];

    /// Stable index of this mode into per-mode arrays.
    pub fn index(&self) -> usize {
        match self {
            OperatingMode::Idle => 0,
            OperatingMode::Starting => 1,
            OperatingMode::Production => 2,
            OperatingMode::Standby => 3,
        }
    }

    /// Mode for a stable index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::MODES.get(index).copied()
    }

    /// Short lowercase label used in exports and log lines.
    pub fn label(&self) -> &'static str {
        match self {
            OperatingMode::Idle => "idle",
            OperatingMode::Starting => "starting",
            OperatingMode::Production => "production",
            OperatingMode::Standby => "standby",
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Static description of one flexible production unit (electrolyzer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Unit identifier (zero-based, dense).
    pub id: UnitId,
    /// Human-readable name used in exports.
    pub name: String,
    /// Rated electrical power (MW).
    pub power_rating: f64,
    /// Minimum dispatch fraction while in production.
    pub min_output: f64,
    /// Maximum dispatch fraction while in production.
    pub max_output: f64,
    /// Slope of the production-from-dispatch linearization (kg/MWh).
    pub slope: f64,
    /// Intercept of the production linearization (kg/h while producing).
    pub intercept: f64,
    /// Cost per interval spent in Starting.
    pub startup_cost: f64,
    /// Cost per interval spent in Standby.
    pub standby_cost: f64,
    /// Maximum dispatch-fraction change between consecutive periods while producing.
    pub ramp_rate: f64,
    /// Minimum dwell periods per mode, indexed by [`OperatingMode::index`].
    pub min_dwell: [usize; NUM_MODES],
    /// Mode the unit occupies in period 1.
    pub initial_mode: OperatingMode,
}

impl Unit {
    /// Create a unit with neutral parameters; refine with the builder methods.
    pub fn new(id: UnitId, name: impl Into<String>) -> Self {
        Unit {
            id,
            name: name.into(),
            power_rating: 1.0,
            min_output: 0.0,
            max_output: 1.0,
            slope: 1.0,
            intercept: 0.0,
            startup_cost: 0.0,
            standby_cost: 0.0,
            ramp_rate: 1.0,
            min_dwell: [1; NUM_MODES],
            initial_mode: OperatingMode::Idle,
        }
    }

    /// Set the rated power (MW).
    pub fn with_power_rating(mut self, mw: f64) -> Self {
        self.power_rating = mw;
        self
    }

    /// Set the min/max dispatch fraction while producing.
    pub fn with_output_range(mut self, min: f64, max: f64) -> Self {
        self.min_output = min;
        self.max_output = max;
        self
    }

    /// Set the production linearization `h = slope * P + intercept`.
    pub fn with_production_curve(mut self, slope: f64, intercept: f64) -> Self {
        self.slope = slope;
        self.intercept = intercept;
        self
    }

    /// Set startup and standby costs per interval.
    pub fn with_mode_costs(mut self, startup: f64, standby: f64) -> Self {
        self.startup_cost = startup;
        self.standby_cost = standby;
        self
    }

    /// Set the ramp-rate limit (dispatch fraction per period).
    pub fn with_ramp_rate(mut self, rate: f64) -> Self {
        self.ramp_rate = rate;
        self
    }

    /// Set the minimum dwell for one mode.
    pub fn with_min_dwell(mut self, mode: OperatingMode, periods: usize) -> Self {
        self.min_dwell[mode.index()] = periods;
        self
    }

    /// Set the mode occupied in period 1.
    pub fn with_initial_mode(mut self, mode: OperatingMode) -> Self {
        self.initial_mode = mode;
        self
    }

    /// Minimum dwell configured for a mode.
    pub fn min_dwell_for(&self, mode: OperatingMode) -> usize {
        self.min_dwell[mode.index()]
    }

    /// Hydrogen produced over one interval at dispatch fraction `x`.
    pub fn hydrogen(&self, interval_length: f64, x: f64, producing: f64) -> f64 {
        interval_length * (self.slope * self.power_rating * x + self.intercept * producing)
    }
}

/// Run-wide scalars and per-period signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalParameters {
    /// Length of one period in hours.
    pub interval_length: f64,
    /// Hydrogen demand per period (kg), indexed by `t - 1`.
    pub demand: Vec<f64>,
    /// Electricity price per period (currency/MWh), indexed by `t - 1`.
    pub electricity_price: Vec<f64>,
    /// Cost per unit of absolute deviation between production and demand.
    pub demand_deviation_cost: f64,
    /// Consensus penalty weight.
    pub rho: f64,
}

/// The complete, immutable scheduling problem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameters {
    units: Vec<Unit>,
    globals: GlobalParameters,
}

impl Parameters {
    /// Assemble and validate a problem description.
    pub fn new(units: Vec<Unit>, globals: GlobalParameters) -> EflexResult<Self> {
        let params = Parameters { units, globals };
        params.validate()?;
        Ok(params)
    }

    /// Re-check the structural invariants, for callers that obtained the
    /// value through deserialization rather than [`Parameters::new`].
    pub fn validate(&self) -> EflexResult<()> {
        if self.units.is_empty() {
            return Err(EflexError::Validation("no units in problem".into()));
        }
        if self.globals.demand.is_empty() {
            return Err(EflexError::Validation("no periods in problem".into()));
        }
        if self.globals.demand.len() != self.globals.electricity_price.len() {
            return Err(EflexError::Validation(format!(
                "demand has {} periods but electricity price has {}",
                self.globals.demand.len(),
                self.globals.electricity_price.len()
            )));
        }
        if self.globals.interval_length <= 0.0 {
            return Err(EflexError::Validation(
                "interval length must be positive".into(),
            ));
        }
        if self.globals.rho <= 0.0 {
            return Err(EflexError::Validation("rho must be positive".into()));
        }
        for (i, unit) in self.units.iter().enumerate() {
            if unit.id.value() != i {
                return Err(EflexError::Validation(format!(
                    "unit ids must be dense and zero-based, found {} at position {}",
                    unit.id, i
                )));
            }
            if unit.power_rating <= 0.0 {
                return Err(EflexError::Validation(format!(
                    "{} has non-positive power rating",
                    unit.id
                )));
            }
            if !(0.0..=1.0).contains(&unit.min_output)
                || !(0.0..=1.0).contains(&unit.max_output)
                || unit.min_output > unit.max_output
            {
                return Err(EflexError::Validation(format!(
                    "{} has invalid output range [{}, {}]",
                    unit.id, unit.min_output, unit.max_output
                )));
            }
            if unit.ramp_rate <= 0.0 {
                return Err(EflexError::Validation(format!(
                    "{} has non-positive ramp rate",
                    unit.id
                )));
            }
        }
        Ok(())
    }

    /// All units, ordered by id.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Unit by id, if in range.
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.units.get(id.value())
    }

    /// Run-wide scalars and signals.
    pub fn globals(&self) -> &GlobalParameters {
        &self.globals
    }

    /// Number of units.
    pub fn num_units(&self) -> usize {
        self.units.len()
    }

    /// Number of periods `T`; periods are `1..=T`.
    pub fn num_periods(&self) -> usize {
        self.globals.demand.len()
    }

    /// Demand in period `t` (1-based).
    pub fn demand(&self, t: usize) -> f64 {
        self.globals.demand[t - 1]
    }

    /// Electricity price in period `t` (1-based).
    pub fn price(&self, t: usize) -> f64 {
        self.globals.electricity_price[t - 1]
    }
}
