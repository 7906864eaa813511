//! Fuzz target: MQTT command topic and HTTP form input
//!
//! Payloads on the command topic and form bodies are attacker-controlled.
//! Neither the command parser nor the form decoder may panic.
//!
//! cargo fuzz run fuzz_bus_command

#![no_main]

use libfuzzer_sys::fuzz_target;
use lifepo_island::app::commands::BusCommand;
use lifepo_island::web::{self, HttpRequest, Method};

fuzz_target!(|data: &[u8]| {
    if BusCommand::parse(data).is_some() {
        assert!(data.len() == 7 || data.len() == 8, "only the exact words parse");
    }

    if let Ok(form) = core::str::from_utf8(data) {
        let _ = web::form_value::<32>(form, "ip");
        let _ = web::route(&HttpRequest::new(Method::Post, "/mosfets", form));
        let _ = web::route(&HttpRequest::new(Method::Get, form, ""));
    }
});
