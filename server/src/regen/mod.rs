//! Tick-based health regeneration.
//!
//! `RegenerationScheduler` owns the in-flight copy of every wounded player's
//! health and advances it once per tick. Reaching full health, or being marked
//! as playing, hands the value back to the character repository.

pub mod scheduler;
pub mod ticker;

pub use scheduler::{regen_duration_secs, RegenerationRecord, RegenerationScheduler};
pub use ticker::spawn_regeneration_ticker;
