//! # eflex-core: Fleet Scheduling Core
//!
//! Provides the immutable problem description (units, periods, global
//! parameters) and the versioned iteration store shared by all update blocks
//! of the alternating-optimization engine.
//!
//! ## Design Philosophy
//!
//! A scheduling run is described once, up front, by [`Parameters`] and never
//! mutated afterwards. All iteration state lives in the [`IterationStore`],
//! an arena of append-only [`IterationRecord`]s indexed by iteration number:
//! - Each update block is the sole writer of its own (iteration, unit) slice
//! - A record becomes immutable once sealed
//! - Reads of not-yet-written slices fall back to a zero-filled default
//!
//! ## Quick Start
//!
//! ```rust
//! use eflex_core::*;
//!
//! let unit = Unit::new(UnitId::new(0), "ely-1")
//!     .with_power_rating(6.0)
//!     .with_output_range(0.15, 1.0)
//!     .with_production_curve(18.0, -2.0)
//!     .with_ramp_rate(0.5);
//!
//! let globals = GlobalParameters {
//!     interval_length: 0.25,
//!     demand: vec![50.0; 4],
//!     electricity_price: vec![35.0; 4],
//!     demand_deviation_cost: 500.0,
//!     rho: 1.0,
//! };
//!
//! let params = Parameters::new(vec![unit], globals).unwrap();
//! let mut store = IterationStore::new();
//! store.init(0, params.num_units(), params.num_periods()).unwrap();
//! ```

mod entities;
mod error;
mod store;

pub use entities::{
    GlobalParameters, OperatingMode, Parameters, Unit, UnitId, NUM_MODES,
};
pub use error::{EflexError, EflexResult};
pub use store::{IterationRecord, IterationStore, StoreError, NUM_PRICES, NUM_SLACKS};
