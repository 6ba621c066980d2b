//! Arena server library: matchmaking, activity tracking and health regeneration.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod activity;
pub mod config;
pub mod db;
pub mod error;
pub mod game;
pub mod notify;
pub mod regen;
pub mod routes;
pub mod state;
pub mod store;
pub mod ws;
