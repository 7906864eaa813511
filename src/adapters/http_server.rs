//! ESP-IDF httpd front end for the operator web surface.
//!
//! One wildcard handler per method copies the request into a
//! [`HttpRequest`], hands it to the main loop via [`bridge::exchange`]
//! and writes the answer.  The flush acknowledgement echoes the response
//! ticket, so the main loop runs a deferred action (address change,
//! restart) only after the client got the page it was armed for.

use embedded_svc::{
    http::Method as SvcMethod,
    io::{Read, Write},
};
use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
use log::info;

use crate::web::{FORM_LEN, HttpRequest, Method, bridge};

/// Start the server on port 80.  Dropping the returned server stops it.
pub fn start() -> anyhow::Result<EspHttpServer<'static>> {
    let conf = HttpConfiguration {
        stack_size: 8 * 1024,
        uri_match_wildcard: true,
        ..Default::default()
    };
    let mut server = EspHttpServer::new(&conf)?;

    for (svc, method) in [(SvcMethod::Get, Method::Get), (SvcMethod::Post, Method::Post)] {
        server.fn_handler::<anyhow::Error, _>("/*", svc, move |mut req| {
            let mut form = [0_u8; FORM_LEN];
            let mut len = 0;
            while len < form.len() {
                let n = req.read(&mut form[len..])?;
                if n == 0 {
                    break;
                }
                len += n;
            }
            // a cut multi-byte sequence only loses itself
            let body = String::from_utf8_lossy(&form[..len]);
            let request = HttpRequest::new(method, req.uri(), &body);

            let (ticket, response) = bridge::exchange(request);

            let mut headers: heapless::Vec<(&str, &str), 2> = heapless::Vec::new();
            let _ = headers.push(("Content-Type", response.content_type));
            if let Some(location) = response.location {
                let _ = headers.push(("Location", location));
            }
            let mut out = req.into_response(response.status, None, &headers)?;
            out.write_all(response.body.as_bytes())?;
            out.flush()?;
            bridge::acknowledge_flush(ticket);
            Ok(())
        })?;
    }

    info!("Web: server listening on :80");
    Ok(server)
}
