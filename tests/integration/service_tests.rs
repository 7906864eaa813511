//! Integration tests for the poll → cache → publish pipeline and the
//! operator commands of the AppService.

use core::net::Ipv4Addr;

use lifepo_island::app::commands::AppCommand;
use lifepo_island::app::events::SinkKind;
use lifepo_island::app::ports::WallClock;
use lifepo_island::app::service::{BREATHE_ERR_MS, BREATHE_OK_MS, FollowUp, HealthIndicator};
use lifepo_island::config::SystemConfig;
use lifepo_island::error::{SinkError, TransportError};
use lifepo_island::scheduler::POLL_TABLE;
use lifepo_island::telemetry::records::MosfetMode;
use lifepo_island::telemetry::{DataCategory, Record};

use crate::mock_ports::{Logged, Rig, SYNCED_EPOCH};

fn json_topic(category: DataCategory) -> String {
    format!("lifepo/json/{}", category)
}

// ── Cold start ────────────────────────────────────────────────

#[test]
fn cold_start_publishes_every_polled_category_once() {
    let mut rig = Rig::new();
    rig.run(0, 600);

    for category in POLL_TABLE.iter().map(|s| s.category) {
        assert_eq!(rig.bus.count(&json_topic(category)), 1, "{} on the bus", category);
        assert_eq!(rig.log.snapshots(category), 1, "{} in the log", category);
        assert_eq!(rig.db.lines_for(category.name()).len(), 1, "{} in the db", category);
    }
    assert_eq!(rig.bus.last("lifepo/status/DBResponse").unwrap().payload, "204");
}

#[test]
fn identity_precedes_dependents_in_sink_order() {
    let mut rig = Rig::new();
    rig.run(0, 600);

    let order: Vec<&str> = rig
        .db
        .lines
        .iter()
        .map(|l| l.split(',').next().unwrap())
        .collect();
    let pos = |name: &str| order.iter().position(|m| *m == name).unwrap();
    assert!(pos("Information") < pos("ChgSts"));
    assert!(pos("Hardware") < pos("Status"));
    assert!(pos("Status") < pos("Cells"));
}

// ── Change filter ─────────────────────────────────────────────

#[test]
fn unchanged_reads_publish_nothing() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    let published = rig.bus.published.len();
    let lines = rig.db.lines.len();
    let reads = rig.charger.requests;

    rig.run(605, 30_000);

    assert!(rig.charger.requests > reads + 50, "polling continued");
    assert_eq!(rig.bus.published.len(), published);
    assert_eq!(rig.db.lines.len(), lines);
}

#[test]
fn run_time_only_log_change_is_suppressed() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    rig.charger.event_log.run_time += 3600;
    rig.run(605, 10_150);
    assert_eq!(rig.bus.count(&json_topic(DataCategory::Log)), 1);

    rig.charger.event_log.start_cnt += 1;
    rig.run(10_155, 20_150);
    assert_eq!(rig.bus.count(&json_topic(DataCategory::Log)), 2);
}

#[test]
fn fault_only_charge_status_change_reaches_every_sink() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    assert_eq!(rig.bus.count("lifepo/status/Charger"), 0);

    // bit 2: charge over current
    rig.charger.charge_status.fault = 0b100;
    rig.run(605, 1_050);

    assert_eq!(rig.bus.count(&json_topic(DataCategory::ChgSts)), 2);
    let json = rig.bus.last(&json_topic(DataCategory::ChgSts)).unwrap();
    assert!(json.payload.contains(r#""Fault":"0000000100""#), "{}", json.payload);
    assert_eq!(rig.bus.last("lifepo/status/Charger").unwrap().payload, "0000000100");

    let lines = rig.db.lines_for("ChgSts");
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains(r#"Fault="0000000100""#), "{}", lines[1]);
    assert_eq!(rig.log.snapshots(DataCategory::ChgSts), 2);

    assert!(rig.sync_time());
    assert_eq!(
        rig.service.health(),
        HealthIndicator::Breathe {
            period_ms: BREATHE_ERR_MS
        }
    );
    let page = rig.service.index_page(None, rig.identity.address, 1_050);
    assert!(page.as_str().contains("CHG: Charge over current"), "{}", page);

    // Clearing the fault announces the all-zero word.
    rig.charger.charge_status.fault = 0;
    rig.run(1_055, 1_550);
    assert_eq!(rig.bus.last("lifepo/status/Charger").unwrap().payload, "0000000000");
    assert_eq!(rig.bus.count("lifepo/status/Charger"), 2);
}

#[test]
fn bms_fault_publishes_narrow_bms_topic() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    rig.bms.status.fault = 1 << 10;
    rig.run(605, 6_350);
    assert_eq!(rig.bus.last("lifepo/status/BMS").unwrap().payload, "0010000000000");
}

// ── Failures ──────────────────────────────────────────────────

#[test]
fn read_failure_keeps_cached_value() {
    let mut rig = Rig::new();
    rig.run(0, 600);

    rig.charger.fail = Some(TransportError::Timeout);
    rig.charger.charge_status.bat_volt = 270;
    rig.run(605, 1_050);

    assert!(rig.log.events.contains(&Logged::ReadFailed(DataCategory::ChgSts)));
    assert_eq!(rig.bus.count(&json_topic(DataCategory::ChgSts)), 1);
    let Some(Record::ChgSts(cached)) = rig.service.cached(DataCategory::ChgSts) else {
        panic!("charge status missing");
    };
    assert_eq!(cached.bat_volt, 266);
}

#[test]
fn dependents_wait_for_identity() {
    let mut rig = Rig::new();
    rig.charger.fail = Some(TransportError::Checksum);
    rig.run(0, 600);

    assert!(!rig.service.known(DataCategory::Information));
    assert!(rig.log.events.contains(&Logged::ReadFailed(DataCategory::Information)));
    assert!(!rig.log.events.contains(&Logged::ReadFailed(DataCategory::ChgSts)));
    assert_eq!(rig.bus.count(&json_topic(DataCategory::ChgSts)), 0);
    // the BMS side is independent
    assert!(rig.service.known(DataCategory::Status));
}

#[test]
fn bus_failure_does_not_stop_database() {
    let mut rig = Rig::new();
    rig.bus.fail = Some(SinkError::Io);
    rig.run(0, 600);

    assert_eq!(rig.db.lines.len(), POLL_TABLE.len());
    assert!(rig
        .log
        .events
        .contains(&Logged::SinkFailed(SinkKind::Bus, DataCategory::ChgSts)));
}

#[test]
fn offline_bus_is_skipped_silently() {
    let mut rig = Rig::new();
    rig.bus.connected = false;
    rig.run(0, 600);
    assert!(rig.bus.published.is_empty());
    assert_eq!(rig.db.lines.len(), POLL_TABLE.len());
    assert!(!rig.log.events.iter().any(|e| matches!(e, Logged::SinkFailed(..))));
}

#[test]
fn unreachable_database_reports_minus_one() {
    let mut rig = Rig::new();
    rig.db.status = Err(SinkError::Unreachable);
    rig.run(0, 600);
    assert_eq!(rig.bus.last("lifepo/status/DBResponse").unwrap().payload, "-1");
    assert_eq!(rig.bus.count("lifepo/status/DBResponse"), 1);
}

// ── Health indicator ──────────────────────────────────────────

#[test]
fn health_steady_until_identities_and_time_known() {
    let mut rig = Rig::new();
    assert_eq!(rig.service.health(), HealthIndicator::Steady);
    rig.run(0, 600);
    assert_eq!(rig.service.health(), HealthIndicator::Steady);
    rig.sync_time();
    assert_eq!(
        rig.service.health(),
        HealthIndicator::Breathe {
            period_ms: BREATHE_OK_MS
        }
    );

    rig.command(AppCommand::ToggleBreathe);
    assert_eq!(rig.service.health(), HealthIndicator::Steady);
    assert_eq!(rig.service.message(), "breathing disabled");
}

#[test]
fn database_rejection_speeds_up_breathing() {
    let mut rig = Rig::new();
    rig.db.status = Ok(400);
    rig.run(0, 600);
    rig.sync_time();

    assert!(rig.log.events.contains(&Logged::DbRejected(400)));
    assert_eq!(rig.bus.count("lifepo/status/DBResponse"), 1);
    assert_eq!(
        rig.service.health(),
        HealthIndicator::Breathe {
            period_ms: BREATHE_ERR_MS
        }
    );
}

// ── Time and bus announcements ────────────────────────────────

#[test]
fn new_session_announces_status_topics() {
    let mut rig = Rig::new();
    rig.service.service_bus(&mut rig.bus);

    let lwt = rig.bus.last("lifepo/status/LWT").unwrap();
    assert_eq!(lwt.payload, "Online");
    assert!(lwt.retain);
    let status = |rig: &Rig, name: &str| rig.bus.last(&format!("lifepo/status/{}", name)).unwrap().payload.clone();
    assert_eq!(status(&rig, "Hostname"), "island");
    assert_eq!(status(&rig, "DBServer"), "influx");
    assert_eq!(status(&rig, "DBPort"), "8086");
    assert_eq!(status(&rig, "DBName"), "lifepo");
    assert_eq!(status(&rig, "Version"), env!("CARGO_PKG_VERSION"));
    assert_eq!(rig.bus.count("lifepo/status/StartTime"), 0);

    let published = rig.bus.published.len();
    rig.service.service_bus(&mut rig.bus);
    assert_eq!(rig.bus.published.len(), published, "same session");
}

#[test]
fn start_time_published_once_and_on_reconnect() {
    let mut rig = Rig::new();
    assert!(!rig.service.check_time(None, &mut rig.charger, &mut rig.bus));
    assert!(!rig.service.time_valid());

    assert!(rig.sync_time());
    assert!(rig.sync_time());
    assert_eq!(rig.bus.count("lifepo/status/StartTime"), 1);
    assert_eq!(
        rig.bus.last("lifepo/status/StartTime").unwrap().payload,
        "2024-02-29T12:34:56"
    );

    rig.bus.new_session = true;
    rig.service.service_bus(&mut rig.bus);
    assert_eq!(rig.bus.count("lifepo/status/StartTime"), 2);
}

#[test]
fn charger_clock_set_once_after_identity() {
    let mut rig = Rig::new();
    rig.sync_time();
    assert!(rig.charger.clock.is_none(), "charger not identified yet");

    rig.run(0, 10);
    rig.sync_time();
    assert_eq!(rig.charger.clock, WallClock::from_epoch(SYNCED_EPOCH));

    rig.charger.clock = None;
    rig.sync_time();
    assert!(rig.charger.clock.is_none());
}

#[test]
fn load_command_on_command_topic() {
    let mut rig = Rig::new();
    rig.service
        .handle_bus_message("lifepo/cmd", b"LOAD ON", &mut rig.charger, &mut rig.log);
    assert!(rig.charger.load_on);
    assert!(rig.log.texts().contains(&"Load on"));

    rig.service
        .handle_bus_message("lifepo/cmd", b"load off", &mut rig.charger, &mut rig.log);
    assert!(!rig.charger.load_on);
}

#[test]
fn other_topics_and_payloads_are_ignored() {
    let mut rig = Rig::new();
    rig.service
        .handle_bus_message("lifepo/other", b"load on", &mut rig.charger, &mut rig.log);
    rig.service
        .handle_bus_message("lifepo/cmd", b"load", &mut rig.charger, &mut rig.log);

    assert!(!rig.charger.load_on);
    let texts = rig.log.texts();
    assert!(texts.contains(&"Ignore mqtt lifepo/other: 'load on'"));
    assert!(texts.contains(&"Ignore mqtt lifepo/cmd: 'load'"));
}

// ── Operator commands ─────────────────────────────────────────

#[test]
fn set_load_skips_write_when_state_matches() {
    let mut rig = Rig::new();
    let before = rig.charger.requests;
    assert_eq!(rig.command(AppCommand::SetLoad(false)), FollowUp::None);
    assert_eq!(rig.charger.requests, before + 1, "read only");
    assert_eq!(rig.service.message(), "Load off");

    rig.command(AppCommand::SetLoad(true));
    assert!(rig.charger.load_on);
    assert_eq!(rig.service.message(), "Load on");
}

#[test]
fn set_load_writes_when_state_unknown() {
    let mut rig = Rig::new();
    rig.charger.fail = Some(TransportError::Timeout);
    rig.command(AppCommand::SetLoad(true));
    assert_eq!(rig.service.message(), "Load unknown");
}

#[test]
fn toggle_load_inverts_current_state() {
    let mut rig = Rig::new();
    rig.command(AppCommand::ToggleLoad);
    assert!(rig.charger.load_on);
    rig.command(AppCommand::ToggleLoad);
    assert!(!rig.charger.load_on);
    assert_eq!(rig.service.message(), "Load off");
}

#[test]
fn mosfets_write_only_on_change() {
    let mut rig = Rig::new();
    rig.run(0, 600);

    let before = rig.bms.requests;
    rig.command(AppCommand::SetMosfets(MosfetMode::Both));
    assert_eq!(rig.bms.requests, before);
    assert_eq!(rig.service.message(), "Mosfet status unchanged");

    rig.command(AppCommand::SetMosfets(MosfetMode::Charge));
    assert_eq!(rig.bms.status.mosfets(), MosfetMode::Charge);
    assert_eq!(rig.service.message(), "Charge ON and discharge OFF");
    let Some(Record::Status(cached)) = rig.service.cached(DataCategory::Status) else {
        panic!("status missing");
    };
    assert_eq!(cached.mosfets(), MosfetMode::Charge);
}

#[test]
fn reset_requests_restart() {
    let mut rig = Rig::new();
    assert_eq!(rig.service.restart_requested(), None);
    assert_eq!(rig.command(AppCommand::Reset), FollowUp::Restart);
    assert!(rig.service.restart_requested().is_some());
    assert!(rig.log.texts().contains(&"RESET"));
}

#[test]
fn battery_profile_programs_charger() {
    let config = SystemConfig::default();
    let mut rig = Rig::with_config(&config);
    rig.service.apply_battery_profile(&mut rig.charger).unwrap();
    assert_eq!(rig.charger.battery_params, config.battery.battery_params());
    assert_eq!(rig.charger.protection_params, config.battery.protection_params());

    rig.charger.fail = Some(TransportError::Rejected);
    assert_eq!(
        rig.service.apply_battery_profile(&mut rig.charger),
        Err(TransportError::Rejected)
    );
}

#[test]
fn index_page_shows_message_once() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    rig.command(AppCommand::SetLoad(true));

    let page = rig.service.index_page(None, Ipv4Addr::new(192, 168, 1, 100), 600);
    let text = page.as_str();
    assert!(text.contains("Charger eSmart3-40A serial SN1234"), "{}", text);
    assert!(text.contains("BMS JBD-SP04S034 charge on discharge on"), "{}", text);
    assert!(text.contains("Load on"));
    assert!(text.contains("IP                 192.168.1.100"));

    let again = rig.service.index_page(None, Ipv4Addr::new(192, 168, 1, 100), 600);
    assert!(!again.as_str().contains("Load on"));
}
