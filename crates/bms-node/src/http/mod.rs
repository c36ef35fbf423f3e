//! HTTP front-end: dashboard pages, stats replay, and the configuration
//! editor with its save/cancel flow.

mod assets;
mod form;

pub use form::{is_valid_ip, parse_post_param, round2, ConfigForm};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{error, info, warn};

use bms_config::CONFIG_MODE_KEY;

use crate::node::NodeState;

/// Maximum accepted config-save body, matching the receive buffer of
/// the firmware handler.
const MAX_SAVE_BODY: usize = 2048;

/// Restart delays after the save/cancel responses went out.
const RESTART_AFTER_SAVE: Duration = Duration::from_secs(3);
const RESTART_AFTER_CANCEL: Duration = Duration::from_secs(2);

/// Poll interval for the accept loop's stop check.
const ACCEPT_POLL: Duration = Duration::from_millis(250);

fn content_type(value: &'static str) -> Header {
    // Static names and values; construction cannot fail.
    Header::from_bytes(&b"Content-Type"[..], value.as_bytes()).expect("static header")
}

/// The HTTP server thread and its shutdown flag.
pub struct HttpServer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl HttpServer {
    /// Bind and start serving on the node's configured address.
    pub fn start(state: Arc<NodeState>) -> anyhow::Result<Self> {
        let server = Server::http(state.http_addr.as_str())
            .map_err(|e| anyhow::anyhow!("http bind {}: {e}", state.http_addr))?;
        let local_addr = server
            .server_addr()
            .to_ip()
            .context("http server has no ip address")?;

        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new().name("http_server".into()).spawn({
            let stop = Arc::clone(&stop);
            move || accept_loop(server, state, stop)
        })?;

        info!(addr = %local_addr, "http server started");
        Ok(Self {
            stop,
            handle: Some(handle),
            local_addr,
        })
    }

    /// Bound address, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and join the server thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(server: Server, state: Arc<NodeState>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        match server.recv_timeout(ACCEPT_POLL) {
            Ok(Some(request)) => handle_request(&state, request),
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "http accept failed");
                break;
            }
        }
    }
    info!("http server stopped");
}

/// Fixed handler table.
fn handle_request(state: &Arc<NodeState>, request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();

    let result = match (&method, url.as_str()) {
        (Method::Get, "/") => respond_redirect(request, "/bms"),
        (Method::Get, "/bms") => respond_html(request, assets::INDEX_HTML),
        (Method::Get, "/bms/stats") => respond_html(request, assets::STATS_HTML),
        (Method::Get, "/bms/config") => h_config_page(state, request),
        (Method::Get, "/bms/stats/data") => h_stats_data(state, request),
        (Method::Get, "/bms/config/data") => h_config_data(request),
        (Method::Post, "/bms/config/save") => h_config_save(state, request),
        (Method::Post, "/bms/config/cancel") => h_config_cancel(state, request),
        (Method::Get, "/bms/css/style.css") => {
            respond_with_type(request, assets::STYLE_CSS, "text/css")
        }
        (Method::Get, "/bms/js/charts.js") => {
            respond_with_type(request, assets::CHARTS_JS, "application/javascript")
        }
        _ => request.respond(Response::from_string("not found").with_status_code(404)),
    };

    if let Err(e) = result {
        warn!(%url, error = %e, "http response failed");
    }
}

fn respond_redirect(request: Request, location: &'static str) -> std::io::Result<()> {
    // Location is a static path; header construction cannot fail.
    let header =
        Header::from_bytes(&b"Location"[..], location.as_bytes()).expect("static header");
    request.respond(
        Response::from_string("")
            .with_status_code(302)
            .with_header(header),
    )
}

fn respond_html(request: Request, body: &str) -> std::io::Result<()> {
    respond_with_type(request, body, "text/html")
}

fn respond_with_type(
    request: Request,
    body: &str,
    ctype: &'static str,
) -> std::io::Result<()> {
    request.respond(Response::from_string(body).with_header(content_type(ctype)))
}

/// GET `/bms/config`: serving the page is what arms the enter-config
/// flag for the next processing cycle.
fn h_config_page(state: &Arc<NodeState>, request: Request) -> std::io::Result<()> {
    if let Err(e) = state.kv.set_u8(CONFIG_MODE_KEY, 1) {
        warn!(error = %e, "failed to set config mode flag");
    } else {
        info!("config mode activated via page access");
    }
    respond_html(request, assets::CONFIG_HTML)
}

/// GET `/bms/stats/data`: replay the history ring as a JSON array.
fn h_stats_data(state: &Arc<NodeState>, request: Request) -> std::io::Result<()> {
    let mut body = Vec::with_capacity(16 * 1024);
    state.history.render_as_json_array(&mut body)?;
    request.respond(Response::from_data(body).with_header(content_type("application/json")))
}

/// GET `/bms/config/data`: configuration snapshot, password excluded.
fn h_config_data(request: Request) -> std::io::Result<()> {
    let cfg = bms_config::snapshot();
    let body = serde_json::json!({
        "wifi": {
            "ssid": cfg.wifi.ssid,
            "static_ip": cfg.wifi.static_ip,
            "gateway": cfg.wifi.gateway,
            "netmask": cfg.wifi.netmask,
        },
        "mqtt": { "uri": cfg.mqtt.uri },
        "battery": {
            "cell_v_min": cfg.battery.cell_v_min,
            "cell_v_max": cfg.battery.cell_v_max,
            "pack_v_min": cfg.battery.pack_v_min,
            "pack_v_max": cfg.battery.pack_v_max,
            "current_min": cfg.battery.current_min,
            "current_max": cfg.battery.current_max,
        },
    });
    request
        .respond(Response::from_string(body.to_string()).with_header(content_type("application/json")))
}

/// POST `/bms/config/save`.
fn h_config_save(state: &Arc<NodeState>, mut request: Request) -> std::io::Result<()> {
    if request.body_length().unwrap_or(0) >= MAX_SAVE_BODY {
        return request.respond(Response::from_string("Content too long").with_status_code(400));
    }

    let mut body = String::with_capacity(request.body_length().unwrap_or(0));
    if let Err(e) = request.as_reader().read_to_string(&mut body) {
        warn!(error = %e, "failed to read save body");
        return request.respond(Response::from_string("bad request").with_status_code(400));
    }

    info!(body = %body, "received config save request");

    let form = ConfigForm::parse(&body);
    if let Err(invalid) = form.validate() {
        warn!(title = invalid.title, "rejected config save");
        return respond_html(request, &assets::render_error_modal(invalid.title, invalid.message));
    }

    form.apply();

    if let Err(e) = bms_config::save_to(&state.config_path()) {
        error!(error = %e, "failed to save configuration");
        return request.respond(
            Response::from_string("Failed to save configuration").with_status_code(500),
        );
    }

    if let Err(e) = state.kv.set_u8(CONFIG_MODE_KEY, 0) {
        warn!(error = %e, "failed to clear config mode flag");
    } else {
        info!("config mode flag cleared");
    }

    let result = respond_html(request, assets::CONFIG_SAVED_HTML);
    info!("configuration saved, restarting in 3 seconds");
    state.request_restart(RESTART_AFTER_SAVE);
    result
}

/// POST `/bms/config/cancel`.
fn h_config_cancel(state: &Arc<NodeState>, request: Request) -> std::io::Result<()> {
    info!("configuration canceled by user");

    if let Err(e) = state.kv.set_u8(CONFIG_MODE_KEY, 0) {
        warn!(error = %e, "failed to clear config mode flag");
    } else {
        info!("config mode flag cleared");
    }

    let result = respond_html(request, assets::CONFIG_CANCELED_HTML);
    info!("restarting to exit config mode");
    state.request_restart(RESTART_AFTER_CANCEL);
    result
}
