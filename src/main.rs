//! LiFePO Island Firmware — Main Entry Point
//!
//! Single-threaded cooperative main loop around the hexagonal core.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SimCharger/SimBms  LogEventSink   NvsAdapter    SystemClock   │
//! │  (Charger+BmsPort)  (+SyslogSink)  (Config+NVS)  (ClockPort)   │
//! │  WifiAdapter        MqttBus        InfluxSink    http_server   │
//! │  (LinkPort)         (BusPort)      (TimeSeries)  (web bridge)  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Cache · Publisher · Connectivity                      │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  PollScheduler (delegate-driven) · HealthLed · LoadPanel       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use anyhow::{Result, anyhow};
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{PinDriver, Pull};
use esp_idf_svc::hal::ledc::{LedcDriver, LedcTimerDriver, config::TimerConfig};
use esp_idf_svc::hal::prelude::*;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sntp::EspSntp;

use lifepo_island::adapters::devices::{SimBms, SimCharger};
use lifepo_island::adapters::influx::InfluxSink;
use lifepo_island::adapters::log_sink::LogEventSink;
use lifepo_island::adapters::mdns::MdnsAdapter;
use lifepo_island::adapters::mqtt::{self, MqttBus};
use lifepo_island::adapters::nvs::NvsAdapter;
use lifepo_island::adapters::syslog::SyslogSink;
use lifepo_island::adapters::time::SystemClock;
use lifepo_island::adapters::wifi::WifiAdapter;
use lifepo_island::adapters::{device_id, http_server};
use lifepo_island::app::load_panel::LoadPanel;
use lifepo_island::app::ports::{ClockPort, ConfigPort, LinkPort};
use lifepo_island::app::publisher::Sinks;
use lifepo_island::app::service::{AppService, Devices, FollowUp};
use lifepo_island::config::SystemConfig;
use lifepo_island::drivers::button::{ButtonDriver, ButtonEvent};
use lifepo_island::drivers::health_led::HealthLed;
use lifepo_island::netconfig;
use lifepo_island::scheduler::PollScheduler;
use lifepo_island::web::bridge::{self, Deferred};
use lifepo_island::web::{self, PageContext};

/// The dev board LED lights on a high level.
const HEALTH_LED_INVERTED: bool = false;
/// The load LED (GPIO33) lights on a low level.
const LOAD_LED_ACTIVE_HIGH: bool = false;

fn restart() -> ! {
    // SAFETY: esp_restart never returns.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

/// Blink the failure pattern, then restart.
fn fail_and_restart(led: &mut HealthLed<LedcDriver<'_>>, reason: &str) -> ! {
    error!("{}, about to reset", reason);
    if let Err(e) = led.blink_failure(&mut FreeRtos) {
        warn!("LED: {}", e);
    }
    restart()
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  LiFePO Island v{}                   ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let partition = EspDefaultNvsPartition::take()?;

    // ── 2. Health LED, lit until the network is joined ───────
    let timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(1.kHz().into()),
    )?;
    let pwm = LedcDriver::new(peripherals.ledc.channel0, timer, peripherals.pins.gpio2)?;
    let mut led = HealthLed::new(pwm, HEALTH_LED_INVERTED);
    led.set(true)?;

    let mut load_led = PinDriver::output(peripherals.pins.gpio33)?;
    let mut button_pin = PinDriver::input(peripherals.pins.gpio0)?;
    button_pin.set_pull(Pull::Up)?;
    let mut button = ButtonDriver::new(button_pin);
    let mut load_panel = LoadPanel::new(LOAD_LED_ACTIVE_HIGH);

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let mut nvs = NvsAdapter::new(partition.clone()).map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    let mac = device_id::read_mac();
    let hostname = device_id::resolve(&config.hostname, &mac);
    info!("Hostname: {}", hostname);

    // ── 4. Join the network ───────────────────────────────────
    let stored = netconfig::load(&nvs);
    led.set(false)?;
    let mut wifi = match WifiAdapter::start(
        peripherals.modem,
        sysloop.clone(),
        partition,
        &hostname,
        &config.wifi.ssid,
        &config.wifi.password,
        stored.as_ref(),
    ) {
        Ok(w) => w,
        Err(e) => fail_and_restart(&mut led, &format!("Failed to connect WLAN: {}", e)),
    };
    led.set(true)?;
    info!("LiFePO Island v{}, WLAN IP is {}", env!("CARGO_PKG_VERSION"), wifi.identity().address);

    // ── 5. Network services ───────────────────────────────────
    let _sntp = EspSntp::new_default()?;
    let mut bus = MqttBus::start(&config.bus, &hostname)?;
    let mut influx = InfluxSink::new(&config.influx)?;
    let _server = http_server::start()?;

    let mut mdns = MdnsAdapter::new(&hostname);
    if let Err(e) = mdns.start() {
        warn!("mDNS: not advertising: {}", e);
    }

    // ── 6. Devices and the application core ───────────────────
    warn!("Devices: RS485 codecs not linked, serving simulated registers");
    let mut charger = SimCharger::new("00000000");
    let mut bms = SimBms::new("JBD-SIM", 4);

    let clock = SystemClock::new();
    let mut log_sink = LogEventSink::new(config.info_log_window_ms);
    match SyslogSink::connect(&config.syslog, &hostname) {
        Ok(Some(remote)) => log_sink = log_sink.with_remote(remote),
        Ok(None) => info!("Syslog: disabled"),
        Err(e) => warn!("Syslog: {}:{} unusable: {}", config.syslog.server, config.syslog.port, e),
    }
    let mut scheduler = PollScheduler::starting_at(clock.uptime_ms());
    let mut service = AppService::new(&config, &hostname);
    service.start(&mut log_sink);
    if let Err(e) = service.apply_battery_profile(&mut charger) {
        warn!("Battery profile not applied: {}", e);
    }

    let mut deferred = Deferred::new();

    // ── 7. Main loop ──────────────────────────────────────────
    loop {
        let now = clock.uptime_ms();
        log_sink.set_uptime(now);
        service.check_time(clock.wall_clock(), &mut charger, &mut bus);

        let outcome = {
            let mut devices = Devices::new(&mut charger, &mut bms);
            let mut sinks = Sinks::new(&mut log_sink, &mut bus, &mut influx);
            service.run_polls(&mut scheduler, now, &mut devices, &mut sinks);
            service.supervise_link(now, &mut wifi, &mut sinks)
        };
        if outcome.restart {
            fail_and_restart(&mut led, "WLAN reconnect ceiling exceeded");
        }

        service.service_bus(&mut bus);
        while let Some(msg) = mqtt::poll_inbox() {
            service.handle_bus_message(&msg.topic, &msg.payload, &mut charger, &mut log_sink);
        }

        load_panel.refresh(now, &mut charger, &mut load_led, &mut log_sink);
        if button.tick(now) == Some(ButtonEvent::Pressed) {
            load_panel.toggle(&mut charger, &mut log_sink);
        }

        if let Some(request) = bridge::poll_request() {
            let page = PageContext {
                clock: clock.wall_clock(),
                identity: wifi.identity(),
                now_ms: now,
            };
            let mut devices = Devices::new(&mut charger, &mut bms);
            let (response, follow) = web::dispatch(&request, &mut service, &mut devices, &page, &mut log_sink);
            let ticket = bridge::respond(response);
            deferred.arm(ticket, follow);
        }

        match deferred.poll() {
            FollowUp::CommitIp => match service.commit_pending_ip(&mut wifi, &mut nvs) {
                Some(Ok(identity)) => info!("NetId: now at {}", identity.address),
                Some(Err(e)) => error!("NetId: address change failed: {}", e),
                None => {}
            },
            FollowUp::Restart => {
                info!("Reset: restarting");
                FreeRtos::delay_ms(100);
                restart();
            }
            FollowUp::None => {}
        }

        if let Err(e) = led.update(now, service.health()) {
            warn!("LED: {}", e);
        }

        FreeRtos::delay_ms(config.loop_interval_ms);
    }
}
