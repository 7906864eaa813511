//! ESP32 time adapter.
//!
//! Implements [`ClockPort`]: monotonic uptime for the scheduler and the
//! SNTP-synchronised wall clock.
//!
//! - **`target_os = "espidf"`** — `esp_timer_get_time()` for uptime and
//!   `gettimeofday()` for wall time (set by `EspSntp`).
//! - **`not(target_os = "espidf")`** — `std::time` for host simulation.

use crate::app::ports::{ClockPort, WallClock};

/// Clock adapter for the ESP32 platform.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_os = "espidf")]
    fn epoch_secs() -> Option<u64> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` is a valid out-pointer, the timezone argument may be null.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        u64::try_from(tv.tv_sec).ok()
    }

    #[cfg(not(target_os = "espidf"))]
    fn epoch_secs() -> Option<u64> {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .ok()
            .map(|d| d.as_secs())
    }
}

impl ClockPort for SystemClock {
    /// Milliseconds since boot, wrapping after ~49.7 days.
    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u32 {
        // SAFETY: plain read of the high-resolution timer.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        (us / 1_000) as u32
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn wall_clock(&self) -> Option<WallClock> {
        Self::epoch_secs().and_then(WallClock::from_epoch)
    }
}
