//! Link supervision through the service, driven by the simulated
//! station adapter.

use core::net::Ipv4Addr;

use lifepo_island::adapters::nvs::NvsAdapter;
use lifepo_island::adapters::wifi::WifiAdapter;
use lifepo_island::app::commands::AppCommand;
use lifepo_island::app::connectivity::LinkState;
use lifepo_island::app::ports::LinkPort;
use lifepo_island::app::service::FollowUp;
use lifepo_island::netconfig::{self, NetworkIdentity};
use lifepo_island::telemetry::DataCategory;
use lifepo_island::web::Method;

use crate::mock_ports::{MockStorage, Rig};

fn station() -> WifiAdapter {
    WifiAdapter::start("IslandNet", "password123", None).unwrap()
}

// ── Reconnect escalation ──────────────────────────────────────

#[test]
fn restart_fires_once_after_ceiling() {
    let mut rig = Rig::new();
    let mut wifi = station();
    wifi.simulate_reconnect_failures(true);
    wifi.simulate_drop();

    // ceiling 3, retry 1 s: attempts at 0, 1078, 2156, the 4th trips it
    let mut restarts = Vec::new();
    for now in (0..=10_000).step_by(77) {
        if rig.supervise(now, &mut wifi).restart {
            restarts.push(now);
        }
    }

    assert_eq!(restarts.len(), 1, "restart at {:?}", restarts);
    assert!(restarts[0] > 3_000 && restarts[0] < 3_400, "{:?}", restarts);
    assert_eq!(wifi.reconnects(), 4);
    assert_eq!(rig.service.link_state(), LinkState::Restarting);
    assert_eq!(rig.service.restart_requested(), Some("link lost"));
}

#[test]
fn reconnect_attempts_are_paced() {
    let mut rig = Rig::new();
    let mut wifi = station();
    wifi.simulate_reconnect_failures(true);
    wifi.simulate_drop();

    rig.supervise(0, &mut wifi);
    rig.supervise(500, &mut wifi);
    rig.supervise(1_000, &mut wifi);
    assert_eq!(wifi.reconnects(), 1);
    rig.supervise(1_001, &mut wifi);
    assert_eq!(wifi.reconnects(), 2);
}

#[test]
fn link_up_resets_attempt_counter() {
    let mut rig = Rig::new();
    let mut wifi = station();
    rig.supervise(0, &mut wifi);
    assert_eq!(rig.service.link_state(), LinkState::Connected);

    wifi.simulate_reconnect_failures(true);
    wifi.simulate_drop();
    rig.supervise(100, &mut wifi);
    rig.supervise(1_200, &mut wifi);
    assert!(matches!(
        rig.service.link_state(),
        LinkState::Disconnected { attempts: 2, .. }
    ));

    // the third attempt succeeds
    wifi.simulate_reconnect_failures(false);
    rig.supervise(2_300, &mut wifi);
    rig.supervise(2_305, &mut wifi);
    assert_eq!(rig.service.link_state(), LinkState::Connected);

    // a fresh outage starts counting from zero again
    wifi.simulate_reconnect_failures(true);
    wifi.simulate_drop();
    let mut restarted = false;
    for now in (2_400..5_000).step_by(100) {
        restarted |= rig.supervise(now, &mut wifi).restart;
    }
    assert!(!restarted);
    assert!(matches!(
        rig.service.link_state(),
        LinkState::Disconnected { attempts: 3, .. }
    ));
}

// ── Link reports ──────────────────────────────────────────────

#[test]
fn first_connect_caches_and_publishes_wifi_report() {
    let mut rig = Rig::new();
    let mut wifi = station();
    assert!(rig.service.json_for(DataCategory::Wifi).is_none());

    rig.supervise(0, &mut wifi);

    let json = rig.service.json_for(DataCategory::Wifi).unwrap();
    assert!(json.as_str().contains(r#""IP":"192.168.1.100""#), "{}", json);
    assert!(json.as_str().contains(r#""RSSI":-60"#), "{}", json);
    assert_eq!(rig.bus.count("lifepo/json/Wifi"), 1);
    assert_eq!(rig.db.lines_for("Wifi").len(), 1);

    rig.supervise(100, &mut wifi);
    assert_eq!(rig.bus.count("lifepo/json/Wifi"), 1);
}

#[test]
fn bssid_change_is_reported_immediately() {
    let mut rig = Rig::new();
    let mut wifi = station();
    rig.supervise(0, &mut wifi);

    wifi.simulate_signal([0x02, 0, 0, 0, 0, 0x02], -60);
    rig.supervise(100, &mut wifi);

    assert_eq!(rig.bus.count("lifepo/json/Wifi"), 2);
    let json = rig.service.json_for(DataCategory::Wifi).unwrap();
    assert!(json.as_str().contains("02:00:00:00:00:02"), "{}", json);
}

#[test]
fn recovery_reports_outage_against_old_ap() {
    let mut rig = Rig::new();
    let mut wifi = station();
    rig.supervise(0, &mut wifi);

    wifi.simulate_drop();
    rig.supervise(100, &mut wifi); // reconnect succeeds
    rig.supervise(200, &mut wifi);

    let lines = rig.db.lines_for("Wifi");
    assert_eq!(lines.len(), 3, "{:?}", lines);
    assert!(lines[1].ends_with("RSSI=0"), "{}", lines[1]);
    assert!(lines[2].ends_with("RSSI=-60"), "{}", lines[2]);
}

// ── Address changes ───────────────────────────────────────────

#[test]
fn static_change_is_applied_after_index_and_persisted() {
    let mut rig = Rig::new();
    let mut wifi = station();
    let mut storage = MockStorage::new();

    let (resp, follow) = rig.request(Method::Post, "/ip", "ip=192.168.1.42");
    assert_eq!(resp.status, 302);
    assert_eq!(follow, FollowUp::None);
    assert!(rig.service.ip_change_pending());
    assert!(rig.log.texts().contains(&"Change IP to '192.168.1.42'"));

    let (page, follow) = rig.request(Method::Get, "/", "");
    assert!(page.body.as_str().contains("Change IP to '192.168.1.42'"));
    assert_eq!(follow, FollowUp::CommitIp);

    let applied = rig
        .service
        .commit_pending_ip(&mut wifi, &mut storage)
        .unwrap()
        .unwrap();
    assert_eq!(applied.address, Ipv4Addr::new(192, 168, 1, 42));
    assert_eq!(applied.gateway, Ipv4Addr::new(192, 168, 1, 1));
    assert_eq!(wifi.identity().address, Ipv4Addr::new(192, 168, 1, 42));
    assert_eq!(netconfig::load(&storage), Some(applied));
    assert!(!rig.service.ip_change_pending());

    // nothing left to commit
    assert!(rig.service.commit_pending_ip(&mut wifi, &mut storage).is_none());
    assert_eq!(storage.writes, 1);
}

#[test]
fn dynamic_change_clears_stored_record() {
    let mut rig = Rig::new();
    let stored = NetworkIdentity {
        address: Ipv4Addr::new(192, 168, 1, 100),
        gateway: Ipv4Addr::new(192, 168, 1, 1),
        subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
        ..Default::default()
    };
    let mut storage = NvsAdapter::new().unwrap();
    netconfig::save(&mut storage, &stored).unwrap();
    let mut wifi = WifiAdapter::start("IslandNet", "password123", Some(&stored)).unwrap();

    rig.command(AppCommand::ChangeIp("0.0.0.0".try_into().unwrap()));
    assert_eq!(rig.service.message(), "Change IP to '0.0.0.0'");
    rig.service.commit_pending_ip(&mut wifi, &mut storage).unwrap().unwrap();

    assert_eq!(netconfig::load(&storage), None);
}

#[test]
fn rejected_static_change_is_not_persisted() {
    let mut rig = Rig::new();
    let mut storage = MockStorage::new();
    let mut wifi = station();

    rig.command(AppCommand::ChangeIp("192.168.1.100".try_into().unwrap()));
    assert_eq!(rig.service.message(), "No IP change for '192.168.1.100'");
    assert!(!rig.service.ip_change_pending());
    assert!(rig.service.commit_pending_ip(&mut wifi, &mut storage).is_none());
    assert_eq!(storage.writes, 0);
}
