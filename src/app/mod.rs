//! Application core — pure domain logic, zero I/O.
//!
//! Snapshot cache, change-triggered publishing, link supervision and
//! operator commands for the LiFePO Island bridge.  All interaction with
//! the RS485 devices and the network happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable on the host.

pub mod cache;
pub mod commands;
pub mod connectivity;
pub mod events;
pub mod load_panel;
pub mod ports;
pub mod publisher;
pub mod service;
