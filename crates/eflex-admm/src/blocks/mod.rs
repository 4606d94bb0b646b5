//! The four alternating update blocks.
//!
//! Blocks are pure: they read the iteration store and return the next
//! iteration's slice; the controller owns all writes, which is what makes
//! the per-unit blocks trivially parallel across units.

mod dispatch;
mod mode;
mod price;
mod slack;

pub use dispatch::{dispatch_update, DispatchResult};
pub use mode::mode_update;
pub use price::price_update;
pub use slack::slack_update;
