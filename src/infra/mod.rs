//! Infrastructure adapters and runtime bootstrap.

pub mod access;
pub mod db;
pub mod error;
pub mod events;
pub mod generator;
pub mod memory;
pub mod telemetry;
