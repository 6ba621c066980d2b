//! Per-player activity flags.
//!
//! Tracks whether a player is in combat (`playing`) or busy with a timed
//! background job. Consulted by matchmaking before a search and by the
//! regeneration scheduler on every tick.

pub mod tracker;

pub use tracker::{ActivityRecord, ActivityTracker, ICON_IDLE, ICON_PLAYING, ICON_WORKING};
