//! LiFePO Island bridge firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod netconfig;
pub mod scheduler;
pub mod telemetry;
pub mod web;

// Adapters and drivers carry their own cfg-gated simulation paths so
// the library builds on the host.
pub mod adapters;
pub mod drivers;
