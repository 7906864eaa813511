//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements          | Connects to                |
//! |---------------|---------------------|----------------------------|
//! | `devices`     | ChargerPort         | simulated eSmart3 registers|
//! |               | BmsPort             | simulated JBD registers    |
//! | `device_id`   | —                   | factory MAC → hostname     |
//! | `http_server` | —                   | ESP-IDF httpd ↔ web bridge |
//! | `influx`      | TimeSeriesPort      | InfluxDB v1 `/write`       |
//! | `log_sink`    | EventSink           | Serial log output          |
//! | `mdns`        | —                   | mDNS hostname + http svc   |
//! | `mqtt`        | BusPort             | ESP-IDF MQTT client        |
//! | `nvs`         | ConfigPort          | NVS / in-memory store      |
//! |               | StoragePort         |                            |
//! | `syslog`      | EventSink           | RFC 5424 syslog over UDP   |
//! | `time`        | ClockPort           | esp_timer + SNTP clock     |
//! | `wifi`        | LinkPort            | ESP-IDF WiFi STA           |

pub mod device_id;
pub mod devices;
#[cfg(target_os = "espidf")]
pub mod http_server;
pub mod influx;
pub mod log_sink;
pub mod mdns;
pub mod mqtt;
pub mod nvs;
pub mod syslog;
pub mod time;
pub mod wifi;
