//! HTTP surface: routing, status codes, redirects and follow-ups.

use std::sync::mpsc;
use std::thread;

use lifepo_island::adapters::wifi::WifiAdapter;
use lifepo_island::app::service::FollowUp;
use lifepo_island::telemetry::records::MosfetMode;
use lifepo_island::web::bridge::{self, Deferred};
use lifepo_island::web::{HttpRequest, Method, HTML, JSON, TEXT};

use crate::mock_ports::{Logged, MockStorage, Rig};

#[test]
fn json_is_unavailable_until_first_read() {
    let mut rig = Rig::new();
    let (resp, _) = rig.request(Method::Get, "/json/ChgSts", "");
    assert_eq!(resp.status, 503);
    assert_eq!(resp.content_type, TEXT);

    rig.run(0, 600);
    let (resp, follow) = rig.request(Method::Get, "/json/ChgSts", "");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.content_type, JSON);
    assert!(resp.body.as_str().contains(r#""BatVolt":266"#), "{}", resp.body);
    assert_eq!(follow, FollowUp::None);
}

#[test]
fn unknown_category_is_not_found() {
    let mut rig = Rig::new();
    let (resp, _) = rig.request(Method::Get, "/json/Bogus", "");
    assert_eq!(resp.status, 404);
}

#[test]
fn index_page_lists_devices() {
    let mut rig = Rig::new();
    rig.run(0, 600);
    let (resp, follow) = rig.request(Method::Get, "/", "");
    assert_eq!(resp.status, 200);
    assert_eq!(follow, FollowUp::None);
    let body = resp.body.as_str();
    assert!(body.contains("Charger eSmart3-40A serial SN1234"), "{}", body);
    assert!(body.contains("Influx status      204"), "{}", body);
    assert!(body.contains("Last web update    2024-02-29T12:34:56"), "{}", body);
}

#[test]
fn unknown_path_shows_index_with_404() {
    let mut rig = Rig::new();
    let (resp, _) = rig.request(Method::Get, "/nope", "");
    assert_eq!(resp.status, 404);
    assert!(resp.body.as_str().contains("page not found"));
    assert!(resp.body.as_str().contains("LiFePO Island v"));

    // commands are POST only
    let (resp, _) = rig.request(Method::Get, "/on", "");
    assert_eq!(resp.status, 404);
    assert!(!rig.charger.load_on);
}

#[test]
fn load_commands_redirect_to_index() {
    let mut rig = Rig::new();
    let (resp, follow) = rig.request(Method::Post, "/on", "");
    assert_eq!(resp.status, 302);
    assert_eq!(resp.location, Some("/"));
    assert_eq!(follow, FollowUp::None);
    assert!(rig.charger.load_on);

    rig.request(Method::Post, "/toggle", "");
    assert!(!rig.charger.load_on);

    let (page, _) = rig.request(Method::Get, "/", "");
    assert!(page.body.as_str().contains("Load off"));
}

#[test]
fn switch_page_offers_the_opposite_action() {
    let mut rig = Rig::new();
    let (resp, _) = rig.request(Method::Get, "/switch", "");
    assert_eq!(resp.content_type, HTML);
    assert!(resp.body.as_str().contains(r#"action="switchon""#));

    let (resp, _) = rig.request(Method::Post, "/switchon", "switch=On");
    assert_eq!(resp.location, Some("/switch"));
    assert!(rig.charger.load_on);

    let (resp, _) = rig.request(Method::Get, "/switch", "");
    assert!(resp.body.as_str().contains(r#"action="switchoff""#));
}

#[test]
fn mosfet_form_sets_requested_mode() {
    let mut rig = Rig::new();
    rig.run(0, 600);

    let (resp, _) = rig.request(Method::Post, "/mosfets", "discharge=Discharge");
    assert_eq!(resp.status, 302);
    assert_eq!(rig.bms.status.mosfets(), MosfetMode::Discharge);
    assert!(rig.log.texts().contains(&"Charge OFF and discharge ON"));

    rig.request(Method::Post, "/mosfets", "");
    assert_eq!(rig.bms.status.mosfets(), MosfetMode::None);
}

#[test]
fn ip_form_stages_change_for_next_index() {
    let mut rig = Rig::new();
    let (_, follow) = rig.request(Method::Post, "/ip", "ip=192.168.1.50");
    assert_eq!(follow, FollowUp::None);

    let (_, follow) = rig.request(Method::Get, "/", "");
    assert_eq!(follow, FollowUp::CommitIp);
}

/// Waits for the next request the server thread posts.
fn next_request() -> HttpRequest {
    loop {
        if let Some(req) = bridge::poll_request() {
            return req;
        }
        thread::yield_now();
    }
}

#[test]
fn address_commit_waits_for_index_flush() {
    let mut rig = Rig::new();
    let mut wifi = WifiAdapter::start("IslandNet", "password123", None).unwrap();
    let mut storage = MockStorage::new();
    let mut deferred = Deferred::new();
    let (release, gate) = mpsc::channel::<()>();

    // Browser: submit the form, follow the redirect, and hold the page's
    // flush until released.
    let browser = thread::spawn(move || {
        let (ticket, resp) = bridge::exchange(HttpRequest::new(Method::Post, "/ip", "ip=192.168.1.60"));
        assert_eq!(resp.status, 302);
        bridge::acknowledge_flush(ticket);

        let (ticket, resp) = bridge::exchange(HttpRequest::new(Method::Get, "/", ""));
        assert_eq!(resp.status, 200);
        gate.recv().unwrap();
        bridge::acknowledge_flush(ticket);
    });

    let req = next_request();
    let (resp, follow) = rig.request(req.method, &req.path, &req.form);
    deferred.arm(bridge::respond(resp), follow);
    assert!(!deferred.is_armed());

    // The redirect's ack is still queued when the index request arrives.
    let req = next_request();
    assert_eq!(req.path.as_str(), "/");
    let (resp, follow) = rig.request(req.method, &req.path, &req.form);
    assert_eq!(follow, FollowUp::CommitIp);
    deferred.arm(bridge::respond(resp), follow);

    assert_eq!(deferred.poll(), FollowUp::None);
    assert!(deferred.is_armed());
    assert!(rig.service.ip_change_pending());
    assert_eq!(storage.writes, 0);

    release.send(()).unwrap();
    let due = loop {
        match deferred.poll() {
            FollowUp::None => thread::yield_now(),
            due => break due,
        }
    };
    browser.join().unwrap();

    assert_eq!(due, FollowUp::CommitIp);
    rig.service.commit_pending_ip(&mut wifi, &mut storage).unwrap().unwrap();
    assert!(!rig.service.ip_change_pending());
    assert_eq!(storage.writes, 1);
}

#[test]
fn reset_answers_before_restarting() {
    let mut rig = Rig::new();
    let (resp, follow) = rig.request(Method::Post, "/reset", "");
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body.as_str(), "Resetting...");
    assert_eq!(follow, FollowUp::Restart);
    assert!(rig.log.events.contains(&Logged::Notice("RESET".to_owned())));
}

#[test]
fn breathe_toggle_and_show() {
    let mut rig = Rig::new();
    rig.request(Method::Post, "/breathe", "");
    assert!(!rig.service.breathing());

    let (resp, _) = rig.request(Method::Get, "/breathe", "");
    assert_eq!(resp.location, Some("/"));
    assert_eq!(rig.service.message(), "breathing disabled");
}
