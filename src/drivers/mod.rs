//! Peripheral drivers.

pub mod button;
pub mod health_led;
