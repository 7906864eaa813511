//! Persisted network identity: record layout, store semantics and the
//! validation of requested address changes.

use core::net::Ipv4Addr;

use lifepo_island::adapters::nvs::NvsAdapter;
use lifepo_island::app::commands::AppCommand;
use lifepo_island::app::ports::StoragePort;
use lifepo_island::netconfig::{self, NetworkIdentity, KEY, NAMESPACE, RECORD_LEN, TAG};

use crate::mock_ports::{Logged, MockStorage, Rig};

fn office() -> NetworkIdentity {
    NetworkIdentity {
        address: Ipv4Addr::new(10, 1, 2, 3),
        gateway: Ipv4Addr::new(10, 1, 2, 1),
        subnet_mask: Ipv4Addr::new(255, 255, 0, 0),
        dns0: Ipv4Addr::new(10, 1, 2, 1),
        dns1: Ipv4Addr::new(9, 9, 9, 9),
    }
}

#[test]
fn saved_record_is_tagged_and_loads_back() {
    let mut storage = MockStorage::new();
    netconfig::save(&mut storage, &office()).unwrap();

    let raw = storage.raw(NAMESPACE, KEY).unwrap();
    assert_eq!(raw.len(), RECORD_LEN);
    assert_eq!(raw[20..], TAG.to_le_bytes());
    assert_eq!(netconfig::load(&storage), Some(office()));
}

#[test]
fn nvs_backend_round_trip() {
    let mut nvs = NvsAdapter::new().unwrap();
    assert_eq!(netconfig::load(&nvs), None);
    netconfig::save(&mut nvs, &office()).unwrap();
    assert!(nvs.exists(NAMESPACE, KEY));
    assert_eq!(netconfig::load(&nvs), Some(office()));
}

#[test]
fn clear_writes_sentinel_and_loads_as_absent() {
    let mut storage = MockStorage::new();
    netconfig::save(&mut storage, &office()).unwrap();
    netconfig::clear(&mut storage).unwrap();

    let raw = storage.raw(NAMESPACE, KEY).unwrap();
    assert_eq!(raw, NetworkIdentity::unset().encode());
    assert_eq!(raw[..4], [0xff; 4]);
    assert_eq!(netconfig::load(&storage), None);
}

#[test]
fn corrupted_tag_loads_as_absent() {
    let mut storage = MockStorage::new();
    let mut bytes = office().encode();
    bytes[23] ^= 0x01;
    storage.write(NAMESPACE, KEY, &bytes).unwrap();
    assert_eq!(netconfig::load(&storage), None);
}

#[test]
fn short_record_loads_as_absent() {
    let mut storage = MockStorage::new();
    storage.write(NAMESPACE, KEY, &office().encode()[..20]).unwrap();
    assert_eq!(netconfig::load(&storage), None);
}

#[test]
fn oversized_record_loads_as_absent() {
    let mut storage = MockStorage::new();
    storage.write(NAMESPACE, KEY, &[0u8; RECORD_LEN + 8]).unwrap();
    assert_eq!(netconfig::load(&storage), None);
}

#[test]
fn only_host_bits_of_the_request_count() {
    let mut rig = Rig::new();
    rig.command(AppCommand::ChangeIp("10.0.0.77".try_into().unwrap()));
    assert_eq!(rig.service.message(), "Change IP to '192.168.1.77'");
    assert!(rig.service.ip_change_pending());
}

#[test]
fn broadcast_request_is_refused_without_side_effects() {
    let mut rig = Rig::new();
    let mut storage = MockStorage::new();

    rig.command(AppCommand::ChangeIp("192.168.1.255".try_into().unwrap()));

    let text = "Broadcast address '192.168.1.255' not possible";
    assert_eq!(rig.service.message(), text);
    assert!(rig.log.events.contains(&Logged::Alert(text.to_owned())));
    assert!(!rig.service.ip_change_pending());
    assert_eq!(storage.writes, 0);
    assert_eq!(netconfig::load(&storage), None);

    let mut wifi = lifepo_island::adapters::wifi::WifiAdapter::start("IslandNet", "password123", None).unwrap();
    assert!(rig.service.commit_pending_ip(&mut wifi, &mut storage).is_none());
    assert!(storage.data.is_empty());
}

#[test]
fn garbage_request_is_refused() {
    let mut rig = Rig::new();
    rig.command(AppCommand::ChangeIp("not-an-ip".try_into().unwrap()));
    assert_eq!(rig.service.message(), "Invalid ip 'not-an-ip'");
    assert!(rig.log.events.contains(&Logged::Alert("Invalid ip 'not-an-ip'".to_owned())));
    assert!(!rig.service.ip_change_pending());
}

#[test]
fn unchanged_request_is_a_warning() {
    let mut rig = Rig::new();
    rig.command(AppCommand::ChangeIp("0.0.0.100".try_into().unwrap()));
    let text = "No IP change for '0.0.0.100'";
    assert!(rig.log.events.contains(&Logged::Warning(text.to_owned())));
}
