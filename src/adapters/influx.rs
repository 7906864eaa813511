//! InfluxDB v1 line-protocol sink.
//!
//! Implements [`TimeSeriesPort`]: one `POST /write?db=<name>` per changed
//! record.  The HTTP status is handed back to the publisher, which turns
//! status changes into the `DBResponse` bus topic.

use core::fmt::Write as _;

use log::debug;

use crate::app::ports::TimeSeriesPort;
use crate::config::InfluxConfig;
use crate::error::SinkError;

#[cfg(target_os = "espidf")]
use embedded_svc::{
    http::{Method, client::Client as HttpClient},
    io::Write,
};
#[cfg(target_os = "espidf")]
use esp_idf_svc::http::client::{Configuration as HttpClientConfiguration, EspHttpConnection};

/// Write endpoint URL capacity.
pub const URL_LEN: usize = 128;

/// `http://<server>:<port>/write?db=<database>`
pub fn write_url(config: &InfluxConfig) -> Result<heapless::String<URL_LEN>, SinkError> {
    let mut url = heapless::String::new();
    write!(url, "http://{}:{}/write?db={}", config.server, config.port, config.database)
        .map_err(|_| SinkError::TooLarge)?;
    Ok(url)
}

#[cfg(target_os = "espidf")]
pub struct InfluxSink {
    client: HttpClient<EspHttpConnection>,
    url: heapless::String<URL_LEN>,
}

#[cfg(target_os = "espidf")]
impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> anyhow::Result<Self> {
        let conf = HttpClientConfiguration {
            timeout: Some(core::time::Duration::from_secs(5)),
            ..Default::default()
        };
        let client = HttpClient::wrap(EspHttpConnection::new(&conf)?);
        let url = write_url(config).map_err(|e| anyhow::anyhow!("influx url: {}", e))?;
        log::info!("Influx: writing to {}", url);
        Ok(Self { client, url })
    }
}

#[cfg(target_os = "espidf")]
impl TimeSeriesPort for InfluxSink {
    fn write_line(&mut self, line: &str) -> Result<u16, SinkError> {
        let mut len: heapless::String<8> = heapless::String::new();
        let _ = write!(len, "{}", line.len());
        let headers = [("Content-Type", "text/plain"), ("Content-Length", len.as_str())];

        let mut request = self
            .client
            .request(Method::Post, &self.url, &headers)
            .map_err(|_| SinkError::Unreachable)?;
        request.write_all(line.as_bytes()).map_err(|_| SinkError::Io)?;
        request.flush().map_err(|_| SinkError::Io)?;
        let response = request.submit().map_err(|_| SinkError::Unreachable)?;
        let status = response.status();
        debug!("Influx: status {} for {} bytes", status, line.len());
        Ok(status)
    }
}

/// Host simulation: keeps the lines and answers with a settable status.
#[cfg(not(target_os = "espidf"))]
pub struct InfluxSink {
    pub lines: Vec<String>,
    pub status: Result<u16, SinkError>,
    url: heapless::String<URL_LEN>,
}

#[cfg(not(target_os = "espidf"))]
impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self, SinkError> {
        Ok(Self {
            lines: Vec::new(),
            status: Ok(204),
            url: write_url(config)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(not(target_os = "espidf"))]
impl TimeSeriesPort for InfluxSink {
    fn write_line(&mut self, line: &str) -> Result<u16, SinkError> {
        debug!("Influx(sim): {}", line);
        self.lines.push(line.to_owned());
        self.status
    }
}
