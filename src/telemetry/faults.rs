//! Fault word decoding for the charger and the BMS.

use core::fmt::Write;

use serde::Serializer;

/// Bit width of the charger fault word.
pub const CHARGER_FAULT_BITS: u8 = 10;

/// Bit width of the BMS protection word.
pub const BMS_FAULT_BITS: u8 = 13;

/// Charger fault texts, bit 0 first.
pub const CHARGER_FAULTS: [&str; CHARGER_FAULT_BITS as usize] = [
    "Battery over voltage",
    "PV over voltage",
    "Charge over current",
    "Discharge over current",
    "Battery temperature alarm",
    "Internal temperature alarm",
    "PV low voltage",
    "Battery low voltage",
    "Trip zero protection trigger",
    "In the control of manual switchgear",
];

/// BMS protection texts, bit 0 first.
pub const BMS_FAULTS: [&str; BMS_FAULT_BITS as usize] = [
    "Cell block over voltage",
    "Cell block under voltage",
    "Battery over voltage",
    "Battery under voltage",
    "Charging over temperature",
    "Charging low temperature",
    "Discharging over temperature",
    "Discharging low temperature",
    "Charging over current",
    "Discharging over current",
    "Short circuit",
    "Frontend IC error",
    "MOS software lockout",
];

const ELLIPSIS: &str = " ...";

/// Renders the lowest `width` bits of `value`, most significant first.
/// Widths above 16 yield an empty string.
pub fn bits(value: u16, width: u8) -> heapless::String<16> {
    let mut s = heapless::String::new();
    if width > 16 {
        return s;
    }
    for bit in (0..width).rev() {
        let _ = s.push(if value & (1 << bit) != 0 { '1' } else { '0' });
    }
    s
}

pub(crate) fn serialize_charger_bits<S: Serializer>(value: &u16, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(bits(*value, CHARGER_FAULT_BITS).as_str())
}

/// Appends one `"<tag>: <text>"` line per set bit of both words.
///
/// When `out` runs full the message ends in `" ..."`.  Returns whether
/// the output was cut.
pub fn describe<const N: usize>(
    charger_fault: u16,
    bms_fault: u16,
    out: &mut heapless::String<N>,
) -> bool {
    let lines = set_bits(charger_fault, &CHARGER_FAULTS)
        .map(|t| ("CHG", t))
        .chain(set_bits(bms_fault, &BMS_FAULTS).map(|t| ("BMS", t)));

    for (tag, text) in lines {
        if writeln!(out, "{tag}: {text}").is_err() {
            // Replace the tail with the ellipsis, on a char boundary.
            let mut keep = N.saturating_sub(ELLIPSIS.len()).min(out.len());
            while !out.is_char_boundary(keep) {
                keep -= 1;
            }
            out.truncate(keep);
            let _ = out.push_str(ELLIPSIS);
            return true;
        }
    }
    false
}

fn set_bits<'a>(word: u16, texts: &'a [&'static str]) -> impl Iterator<Item = &'static str> + 'a {
    texts
        .iter()
        .enumerate()
        .filter(move |(bit, _)| word & (1 << bit) != 0)
        .map(|(_, t)| *t)
}
