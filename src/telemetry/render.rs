//! Pure renderers from [`Record`]s into sink representations.
//!
//! Both renderers write into a fixed-capacity [`RenderBuf`].  Output that
//! does not fit is cut and flagged; rendering never fails.

use core::fmt::{self, Display, Write};

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::faults::{self, CHARGER_FAULT_BITS};
use super::records::mac_string;
use super::{DataCategory, Record};

/// Capacity of every rendered message.
pub const RENDER_CAPACITY: usize = 512;

/// Bounded text buffer whose `fmt::Write` impl truncates instead of
/// failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderBuf<const N: usize> {
    text: heapless::String<N>,
    truncated: bool,
}

/// A rendered message of the standard capacity.
pub type Rendered = RenderBuf<RENDER_CAPACITY>;

impl<const N: usize> RenderBuf<N> {
    pub const fn new() -> Self {
        Self {
            text: heapless::String::new(),
            truncated: false,
        }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Whether anything was dropped for lack of space.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.truncated = false;
    }
}

impl<const N: usize> Write for RenderBuf<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        if self.text.push_str(s).is_err() {
            for ch in s.chars() {
                if self.text.push(ch).is_err() {
                    break;
                }
            }
            self.truncated = true;
        }
        Ok(())
    }
}

impl<const N: usize> Display for RenderBuf<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ambient values every rendering needs besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub version: &'a str,
    pub hostname: &'a str,
    /// Serial of the charger, empty while unknown.
    pub serial: &'a str,
    /// Id of the BMS, empty while unknown.
    pub bms_id: &'a str,
    /// Number of cells reported by the latest BMS status.
    pub cell_count: usize,
}

// ───────────────────────────────────────────────────────────────
// JSON
// ───────────────────────────────────────────────────────────────

struct Envelope<'a> {
    record: &'a Record,
    ctx: &'a RenderContext<'a>,
}

impl Serialize for Envelope<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let ctx = self.ctx;
        let name = self.record.category().name();
        let mut map = s.serialize_map(None)?;
        map.serialize_entry("Version", ctx.version)?;
        match self.record {
            Record::Information(r) => {
                map.serialize_entry("Serial", r.serial.as_str())?;
                map.serialize_entry(name, r)?;
            }
            Record::ChgSts(r) => charger_body(&mut map, ctx, name, r)?,
            Record::BatParam(r) => charger_body(&mut map, ctx, name, r)?,
            Record::Log(r) => charger_body(&mut map, ctx, name, r)?,
            Record::Parameters(r) => charger_body(&mut map, ctx, name, r)?,
            Record::LoadParam(r) => charger_body(&mut map, ctx, name, r)?,
            Record::ProParam(r) => charger_body(&mut map, ctx, name, r)?,
            Record::Hardware(r) => map.serialize_entry("Id", r.id.as_str())?,
            Record::Status(r) => {
                map.serialize_entry("Id", ctx.bms_id)?;
                map.serialize_entry(name, r)?;
            }
            Record::Cells(r) => {
                map.serialize_entry("Id", ctx.bms_id)?;
                map.serialize_entry(name, r.first(ctx.cell_count))?;
            }
            Record::Wifi(r) => {
                map.serialize_entry("Hostname", ctx.hostname)?;
                map.serialize_entry(name, r)?;
            }
        }
        map.end()
    }
}

fn charger_body<M: SerializeMap, T: Serialize>(
    map: &mut M,
    ctx: &RenderContext<'_>,
    name: &'static str,
    body: &T,
) -> Result<(), M::Error> {
    map.serialize_entry("Serial", ctx.serial)?;
    map.serialize_entry(name, body)
}

/// Renders the JSON document published on the bus, logged and served
/// at `/json/<Category>`.
pub fn render_json(record: &Record, ctx: &RenderContext<'_>) -> Rendered {
    let mut out = Rendered::new();
    match serde_json::to_vec(&Envelope { record, ctx }) {
        Ok(bytes) => {
            // serde_json only emits UTF-8
            if let Ok(text) = core::str::from_utf8(&bytes) {
                let _ = out.write_str(text);
            }
        }
        Err(e) => {
            log::error!("Render: {} json failed: {}", record.category(), e);
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Line protocol
// ───────────────────────────────────────────────────────────────

/// Field writer for one line-protocol record.
struct Line<'b, const N: usize> {
    buf: &'b mut RenderBuf<N>,
    first: bool,
}

impl<'b, const N: usize> Line<'b, N> {
    /// Starts `<measurement>,<tag_key>=<tag>,Version=<v> `.
    fn start(buf: &'b mut RenderBuf<N>, measurement: &str, tag_key: &str, tag: &str, version: &str) -> Self {
        let _ = buf.write_str(measurement);
        let _ = write!(buf, ",{tag_key}=");
        escape_tag(buf, tag);
        let _ = buf.write_str(",Version=");
        escape_tag(buf, version);
        let _ = buf.write_char(' ');
        Self { buf, first: true }
    }

    fn sep(&mut self) {
        if !self.first {
            let _ = self.buf.write_char(',');
        }
        self.first = false;
    }

    fn int(&mut self, key: impl Display, value: impl Display) -> &mut Self {
        self.sep();
        let _ = write!(self.buf, "{key}={value}");
        self
    }

    fn text(&mut self, key: impl Display, value: impl Display) -> &mut Self {
        self.sep();
        let _ = write!(self.buf, "{key}=\"");
        let _ = write!(Escaped(&mut *self.buf), "{value}");
        let _ = self.buf.write_char('"');
        self
    }
}

fn escape_tag<const N: usize>(buf: &mut RenderBuf<N>, tag: &str) {
    for ch in tag.chars() {
        if matches!(ch, ' ' | ',' | '=') {
            let _ = buf.write_char('\\');
        }
        let _ = buf.write_char(ch);
    }
}

/// Escapes `"` and `\` inside string field values.
struct Escaped<'b, const N: usize>(&'b mut RenderBuf<N>);

impl<const N: usize> Write for Escaped<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if matches!(ch, '"' | '\\') {
                self.0.write_char('\\')?;
            }
            self.0.write_char(ch)?;
        }
        Ok(())
    }
}

/// Renders the time-series line for a record.
pub fn render_line(record: &Record, ctx: &RenderContext<'_>) -> Rendered {
    let mut out = Rendered::new();
    let name = record.category().name();
    let v = ctx.version;

    if let Record::Wifi(r) = record {
        let mut line = Line::start(&mut out, name, "Host", ctx.hostname, v);
        line.text("BSSID", mac_string(&r.bssid)).text("IP", r.address).int("RSSI", r.rssi);
        return out;
    }

    let mut line = match record {
        Record::Information(r) => Line::start(&mut out, name, "Serial", &r.serial, v),
        Record::Hardware(r) => Line::start(&mut out, name, "Id", &r.id, v),
        r if r.category().is_bms() => Line::start(&mut out, name, "Id", ctx.bms_id, v),
        _ => Line::start(&mut out, name, "Serial", ctx.serial, v),
    };
    line.text("Host", ctx.hostname);

    match record {
        Record::Information(r) => {
            line.text("Model", &r.model).text("Date", &r.date).text("FirmWare", &r.firmware);
        }
        Record::ChgSts(r) => {
            line.int("ChgMode", r.chg_mode)
                .int("PvVolt", r.pv_volt)
                .int("BatVolt", r.bat_volt)
                .int("ChgCurr", r.chg_curr)
                .int("OutVolt", r.out_volt)
                .int("LoadVolt", r.load_volt)
                .int("LoadCurr", r.load_curr)
                .int("ChgPower", r.chg_power)
                .int("LoadPower", r.load_power)
                .int("BatTemp", r.bat_temp)
                .int("InnerTemp", r.inner_temp)
                .int("BatCap", r.bat_cap)
                .int("CO2", r.co2)
                .text("Fault", faults::bits(r.fault, CHARGER_FAULT_BITS))
                .int("SystemReminder", r.system_reminder);
        }
        Record::BatParam(r) => {
            line.int("BatType", r.bat_type)
                .int("BatSysType", r.bat_sys_type)
                .int("BulkVolt", r.bulk_volt)
                .int("FloatVolt", r.float_volt)
                .int("MaxChgCurr", r.max_chg_curr)
                .int("MaxDisChgCurr", r.max_dis_chg_curr)
                .int("EqualizeChgVolt", r.equalize_chg_volt)
                .int("EqualizeChgTime", r.equalize_chg_time)
                .int("LoadUseSel", r.load_use_sel);
        }
        Record::Log(r) => {
            line.int("RunTime", r.run_time)
                .int("StartCnt", r.start_cnt)
                .int("LastFaultInfo", r.last_fault_info)
                .int("FaultCnt", r.fault_cnt)
                .int("TodayEng", r.today_eng)
                .text("TodayEngDate", r.today_eng_date)
                .int("MonthEng", r.month_eng)
                .text("MonthEngDate", r.month_eng_date)
                .int("TotalEng", r.total_eng)
                .int("LoadTodayEng", r.load_today_eng)
                .int("LoadMonthEng", r.load_month_eng)
                .int("LoadTotalEng", r.load_total_eng)
                .int("BacklightTime", r.backlight_time)
                .int("SwitchEnable", r.switch_enable);
        }
        Record::Parameters(r) => {
            line.int("PvVoltRatio", r.pv_volt_ratio)
                .int("PvVoltOffset", r.pv_volt_offset)
                .int("BatVoltRatio", r.bat_volt_ratio)
                .int("BatVoltOffset", r.bat_volt_offset)
                .int("ChgCurrRatio", r.chg_curr_ratio)
                .int("ChgCurrOffset", r.chg_curr_offset)
                .int("LoadCurrRatio", r.load_curr_ratio)
                .int("LoadCurrOffset", r.load_curr_offset)
                .int("LoadVoltRatio", r.load_volt_ratio)
                .int("LoadVoltOffset", r.load_volt_offset)
                .int("OutVoltRatio", r.out_volt_ratio)
                .int("OutVoltOffset", r.out_volt_offset);
        }
        Record::LoadParam(r) => {
            line.int("LoadModuleSelect1", r.load_module_select1)
                .int("LoadModuleSelect2", r.load_module_select2)
                .int("LoadOnPvVolt", r.load_on_pv_volt)
                .int("LoadOffPvVolt", r.load_off_pv_volt)
                .int("PvContrlTurnOnDelay", r.pv_contrl_turn_on_delay)
                .int("PvContrlTurnOffDelay", r.pv_contrl_turn_off_delay)
                .text("AftLoadOnTime", r.aft_load_on_time)
                .text("AftLoadOffTime", r.aft_load_off_time)
                .text("MonLoadOnTime", r.mon_load_on_time)
                .text("MonLoadOffTime", r.mon_load_off_time)
                .int("LoadSts", r.load_sts)
                .int("Time2Enable", r.time2_enable);
        }
        Record::ProParam(r) => {
            line.int("LoadOvp", r.load_ovp)
                .int("LoadUvp", r.load_uvp)
                .int("BatOvp", r.bat_ovp)
                .int("BatOvB", r.bat_ov_b)
                .int("BatUvp", r.bat_uvp)
                .int("BatUvB", r.bat_uv_b);
        }
        Record::Status(r) => {
            line.int("voltage", r.voltage)
                .int("current", r.current)
                .int("remainingCapacity", r.remaining_capacity)
                .int("nominalCapacity", r.nominal_capacity)
                .int("cycles", r.cycles)
                .text("productionDate", r.production_date_string())
                .text("balance", r.balance_string())
                .int("fault", r.fault)
                .int("version", r.version)
                .int("currentCapacity", r.current_capacity)
                .int("mosfetStatus", r.mosfet_status)
                .int("cells", r.cells)
                .int("ntcs", r.ntcs);
            for (i, t) in r.temperatures_deci_celsius().enumerate() {
                line.int(format_args!("temperature{}", i + 1), t);
            }
        }
        Record::Cells(r) => {
            for (i, mv) in r.first(ctx.cell_count).iter().enumerate() {
                line.int(format_args!("voltage{}", i + 1), mv);
            }
        }
        Record::Hardware(_) | Record::Wifi(_) => {}
    }
    out
}

/// Payload of a narrow status topic, e.g. `status/Charger`.
pub fn narrow_status(category: DataCategory, fault: u16) -> heapless::String<16> {
    match category {
        DataCategory::ChgSts => faults::bits(fault, faults::CHARGER_FAULT_BITS),
        DataCategory::Status => faults::bits(fault, faults::BMS_FAULT_BITS),
        _ => heapless::String::new(),
    }
}
