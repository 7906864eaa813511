//! Fuzz target: `NetworkIdentity::decode`
//!
//! The record comes straight from flash, so any byte string must decode
//! without panicking, and anything that decodes must encode back to the
//! same bytes.
//!
//! cargo fuzz run fuzz_identity_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use lifepo_island::netconfig::NetworkIdentity;

fuzz_target!(|data: &[u8]| {
    if let Some(id) = NetworkIdentity::decode(data) {
        assert!(!id.is_unset(), "sentinel must load as absent");
        assert_eq!(&id.encode()[..], data, "decoded record must re-encode identically");
    }
});
