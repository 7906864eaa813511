//! Operator HTTP surface — routing and dispatch.
//!
//! **Server-decoupled**: nothing here touches the ESP-IDF httpd.  The
//! server thread hands each request to the main loop through
//! [`bridge`], the main loop calls [`dispatch`] and hands the response
//! back.  Actions that must wait for the response to reach the client
//! (address change, restart) are returned as a [`FollowUp`].
//!
//! ```text
//!  GET  /                 status page (applies a staged IP change after flush)
//!  GET  /json/<Category>  cached record as JSON
//!  POST /on /off /toggle  charger load
//!  POST /mosfets          BMS charge/discharge mosfets
//!  POST /ip               stage a host address change
//!  POST /breathe          toggle the health LED animation
//!  POST /reset            restart after the response
//!  GET  /switch           one-button load switch
//! ```

pub mod bridge;

use core::fmt::Write;

use log::{debug, warn};

use crate::app::commands::{AppCommand, IP_TEXT_LEN};
use crate::app::ports::{BmsPort, ChargerPort, EventSink, WallClock};
use crate::app::service::{AppService, Devices, FollowUp, INDEX_LEN};
use crate::netconfig::NetworkIdentity;
use crate::telemetry::DataCategory;
use crate::telemetry::records::MosfetMode;
use crate::telemetry::render::RenderBuf;

/// Longest request path kept.
pub const PATH_LEN: usize = 48;
/// Longest form body kept.
pub const FORM_LEN: usize = 128;

pub const TEXT: &str = "text/plain";
pub const HTML: &str = "text/html";
pub const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: heapless::String<PATH_LEN>,
    /// `application/x-www-form-urlencoded` body, empty for GET.
    pub form: heapless::String<FORM_LEN>,
}

impl HttpRequest {
    pub fn new(method: Method, path: &str, form: &str) -> Self {
        Self {
            method,
            path: truncated(path),
            form: truncated(form),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    /// `Location` header of a redirect.
    pub location: Option<&'static str>,
    pub body: RenderBuf<INDEX_LEN>,
}

impl HttpResponse {
    fn text(status: u16, content_type: &'static str, body: &str) -> Self {
        let mut buf = RenderBuf::new();
        let _ = buf.write_str(body);
        Self {
            status,
            content_type,
            location: None,
            body: buf,
        }
    }

    fn redirect(location: &'static str) -> Self {
        Self {
            location: Some(location),
            ..Self::text(302, TEXT, "")
        }
    }
}

/// Everything the status page shows besides service state.
#[derive(Debug, Clone, Copy)]
pub struct PageContext {
    pub clock: Option<WallClock>,
    pub identity: NetworkIdentity,
    pub now_ms: u32,
}

// ───────────────────────────────────────────────────────────────
// Routing
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Json(DataCategory),
    /// Command followed by a redirect to the index.
    Command(AppCommand),
    ShowBreathe,
    SwitchPage,
    /// Load switch from the switch page, redirects back to it.
    Switch(bool),
    NotFound,
}

/// Exact lookup of method and path.
pub fn route(req: &HttpRequest) -> Route {
    use Method::{Get, Post};

    let path = req.path.split('?').next().unwrap_or_default();
    if let Some(name) = path.strip_prefix("/json/") {
        return match (req.method, DataCategory::from_name(name)) {
            (Get, Some(category)) => Route::Json(category),
            _ => Route::NotFound,
        };
    }

    match (req.method, path) {
        (Get, "/") => Route::Index,
        (Post, "/on") => Route::Command(AppCommand::SetLoad(true)),
        (Post, "/off") => Route::Command(AppCommand::SetLoad(false)),
        (Post, "/toggle") => Route::Command(AppCommand::ToggleLoad),
        (Post, "/mosfets") => {
            let charge = form_value::<16>(&req.form, "charge").is_some_and(|v| v == "Charge");
            let discharge = form_value::<16>(&req.form, "discharge").is_some_and(|v| v == "Discharge");
            Route::Command(AppCommand::SetMosfets(MosfetMode::from_flags(charge, discharge)))
        }
        (Post, "/ip") => {
            let ip = form_value::<IP_TEXT_LEN>(&req.form, "ip").unwrap_or_default();
            Route::Command(AppCommand::ChangeIp(ip))
        }
        (Post, "/breathe") => Route::Command(AppCommand::ToggleBreathe),
        (Get, "/breathe") => Route::ShowBreathe,
        (Post, "/reset") => Route::Command(AppCommand::Reset),
        (Get, "/switch") => Route::SwitchPage,
        (Post, "/switchon") => Route::Switch(true),
        (Post, "/switchoff") => Route::Switch(false),
        _ => Route::NotFound,
    }
}

/// Serve one request against the service.
pub fn dispatch<C: ChargerPort, M: BmsPort>(
    req: &HttpRequest,
    service: &mut AppService,
    devices: &mut Devices<'_, C, M>,
    page: &PageContext,
    sink: &mut impl EventSink,
) -> (HttpResponse, FollowUp) {
    let route = route(req);
    debug!("Web: {:?} {} -> {:?}", req.method, req.path, route);

    match route {
        Route::Index => {
            let body = service.index_page(page.clock, page.identity.address, page.now_ms);
            let follow = if service.ip_change_pending() {
                FollowUp::CommitIp
            } else {
                FollowUp::None
            };
            (page_response(200, body), follow)
        }
        Route::Json(category) => match service.json_for(category) {
            Some(json) => (HttpResponse::text(200, JSON, json.as_str()), FollowUp::None),
            None => (HttpResponse::text(503, TEXT, "no data yet"), FollowUp::None),
        },
        Route::Command(AppCommand::Reset) => {
            let follow = service.handle_command(AppCommand::Reset, devices, &page.identity, sink);
            (HttpResponse::text(200, TEXT, "Resetting..."), follow)
        }
        Route::Command(cmd) => {
            let follow = service.handle_command(cmd, devices, &page.identity, sink);
            (HttpResponse::redirect("/"), follow)
        }
        Route::ShowBreathe => {
            service.show_breathing();
            (HttpResponse::redirect("/"), FollowUp::None)
        }
        Route::SwitchPage => (switch_page(devices.charger), FollowUp::None),
        Route::Switch(on) => {
            if let Err(e) = devices.charger.set_load(on) {
                warn!("Web: switch load failed: {}", e);
            }
            (HttpResponse::redirect("/switch"), FollowUp::None)
        }
        Route::NotFound => {
            warn!("Web: page not found: {}", req.path);
            service.set_message(format_args!("page not found"));
            let body = service.index_page(page.clock, page.identity.address, page.now_ms);
            (page_response(404, body), FollowUp::None)
        }
    }
}

fn page_response(status: u16, body: RenderBuf<INDEX_LEN>) -> HttpResponse {
    HttpResponse {
        status,
        content_type: TEXT,
        location: None,
        body,
    }
}

fn switch_page(charger: &mut impl ChargerPort) -> HttpResponse {
    let (action, label) = match charger.load() {
        Ok(true) => ("switchoff", "Off"),
        _ => ("switchon", "On"),
    };
    let mut body = RenderBuf::new();
    let _ = write!(
        body,
        "<!doctype html>\n<html><body>\n<form action=\"{}\" method=\"post\">\n\
         <input type=\"submit\" name=\"switch\" value=\"{}\" />\n</form>\n</body></html>\n",
        action, label
    );
    HttpResponse {
        status: 200,
        content_type: HTML,
        location: None,
        body,
    }
}

// ───────────────────────────────────────────────────────────────
// Form decoding
// ───────────────────────────────────────────────────────────────

/// Decoded value of `key` in a url-encoded form.  Values longer than `N`
/// are cut.
pub fn form_value<const N: usize>(form: &str, key: &str) -> Option<heapless::String<N>> {
    form.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        (k == key).then(|| url_decode(v))
    })
}

fn url_decode<const N: usize>(raw: &str) -> heapless::String<N> {
    let mut bytes: heapless::Vec<u8, FORM_LEN> = heapless::Vec::new();
    let raw = raw.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        let b = match raw[i] {
            b'+' => b' ',
            b'%' if i + 2 < raw.len() => match hex_pair(raw[i + 1], raw[i + 2]) {
                Some(b) => {
                    i += 2;
                    b
                }
                None => b'%',
            },
            b => b,
        };
        if bytes.push(b).is_err() {
            break;
        }
        i += 1;
    }
    truncated(&String::from_utf8_lossy(&bytes))
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let digit = |c: u8| char::from(c).to_digit(16);
    Some((digit(hi)? * 16 + digit(lo)?) as u8)
}

fn truncated<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for ch in s.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}
