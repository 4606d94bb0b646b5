//! # eflex-coord: Distributed Execution Protocol
//!
//! Lets the per-unit blocks of an iteration run in independent worker
//! processes while staying synchronized in lock-step phases.
//!
//! Two layers:
//!
//! * **Handshake**: a registry service collects `register` messages from a
//!   known number of workers over TCP, then broadcasts one `phoneBook`
//!   message listing every participant. Workers block (without busy-waiting)
//!   until the phone book arrives.
//! * **Phase barriers**: a [`PhaseBus`] publishes the current phase of the
//!   iteration; unit executors run their assigned block when their phase is
//!   announced and rendezvous on a barrier before the driver advances.
//!
//! The joint dispatch solve and the iteration evaluation stay on the
//! driver; only the embarrassingly parallel per-unit phases are farmed out.

mod error;
mod executor;
mod messages;
mod phase;
mod registry;
mod worker;

pub use error::CoordError;
pub use executor::{
    run_assignment, CoordinatedOutcome, CoordinatedRun, LocalStore, SharedStore, UnitExecutor,
};
pub use messages::{Message, PhoneBookEntry};
pub use phase::{Phase, PhaseBus, PhaseListener};
pub use registry::Registry;
pub use worker::{Worker, WorkerConfig, WorkerState};
