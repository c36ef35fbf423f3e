//! HTTP surface tests over real sockets.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use bms_config::CONFIG_MODE_KEY;
use bms_node::http::HttpServer;
use bms_node::node::NodeState;
use bms_watchdog::Watchdog;

struct TestNode {
    state: Arc<NodeState>,
    server: HttpServer,
    restarts: Arc<AtomicUsize>,
    _dir: TempDir,
}

fn start_node() -> TestNode {
    let dir = TempDir::new().unwrap();
    let restarts = Arc::new(AtomicUsize::new(0));
    let restarts_in = Arc::clone(&restarts);
    let state = NodeState::with_parts(
        dir.path().to_path_buf(),
        "127.0.0.1:0".into(),
        Watchdog::init_with(Duration::from_secs(3600), Box::new(|_| {})),
        Box::new(move |_| {
            restarts_in.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();

    let server = HttpServer::start(Arc::clone(&state)).unwrap();
    TestNode {
        state,
        server,
        restarts,
        _dir: dir,
    }
}

fn request(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(raw.as_bytes()).unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

fn get(addr: SocketAddr, path: &str) -> String {
    request(
        addr,
        &format!("GET {path} HTTP/1.1\r\nHost: bms\r\nConnection: close\r\n\r\n"),
    )
}

fn post(addr: SocketAddr, path: &str, body: &str) -> String {
    request(
        addr,
        &format!(
            "POST {path} HTTP/1.1\r\nHost: bms\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\n\
             Content-Length: {}\r\n\r\n{body}",
            body.len()
        ),
    )
}

fn body_of(response: &str) -> &str {
    response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body)
        .unwrap_or("")
}

#[test]
fn root_redirects_to_dashboard() {
    let node = start_node();
    let response = get(node.server.local_addr(), "/");
    assert!(response.starts_with("HTTP/1.1 302"));
    assert!(response.contains("Location: /bms"));
}

#[test]
fn dashboard_and_assets_are_served() {
    let node = start_node();
    let addr = node.server.local_addr();

    assert!(get(addr, "/bms").contains("BMS Telemetry Node"));
    assert!(get(addr, "/bms/stats").contains("<canvas"));
    assert!(get(addr, "/bms/css/style.css").contains("Content-Type: text/css"));
    assert!(get(addr, "/bms/js/charts.js").contains("Content-Type: application/javascript"));
    assert!(get(addr, "/bms/nope").starts_with("HTTP/1.1 404"));
}

#[test]
fn config_page_arms_the_enter_config_flag() {
    let node = start_node();
    assert_eq!(node.state.kv.get_u8(CONFIG_MODE_KEY), None);

    let response = get(node.server.local_addr(), "/bms/config");
    assert!(response.contains("Configuration"));
    assert_eq!(node.state.kv.get_u8(CONFIG_MODE_KEY), Some(1));
}

#[test]
fn stats_data_replays_last_240_in_order() {
    let node = start_node();
    for n in 1..=300 {
        node.state
            .history
            .push(format!("{{\"p\":{n}}}").as_bytes());
    }

    let response = get(node.server.local_addr(), "/bms/stats/data");
    assert!(response.contains("Content-Type: application/json"));
    let body = body_of(&response);
    assert!(body.starts_with("[{\"p\":61},"));
    assert!(body.ends_with(",{\"p\":300}]"));
}

#[test]
fn config_data_snapshot_has_no_password() {
    let node = start_node();
    let response = get(node.server.local_addr(), "/bms/config/data");
    let body = body_of(&response);

    let json: serde_json::Value = serde_json::from_str(body).unwrap();
    assert!(json["wifi"]["ssid"].is_string());
    assert!(json["wifi"].get("pass").is_none());
    assert!(json["battery"]["cell_v_min"].is_number());
    assert!(json["mqtt"]["uri"].is_string());
}

#[test]
fn save_flow_validates_applies_and_restarts() {
    let node = start_node();
    let addr = node.server.local_addr();
    bms_config::reset_to_defaults();

    // Invalid static IP: error modal, nothing changes, no restart.
    node.state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    let before = bms_config::snapshot();
    let response = post(addr, "/bms/config/save", "wifi_static_ip=999.1.1.1");
    assert!(body_of(&response).contains("Invalid Static IP Address"));
    assert_eq!(bms_config::snapshot(), before);
    assert_eq!(node.state.kv.get_u8(CONFIG_MODE_KEY), Some(1));
    assert_eq!(node.restarts.load(Ordering::SeqCst), 0);
    assert!(!node.state.config_path().exists());

    // Valid save: rounded limits stored, file written, flag cleared,
    // restart scheduled.
    let response = post(
        addr,
        "/bms/config/save",
        "wifi_ssid=pack-lab&wifi_static_ip=192.168.1.50&wifi_pass=&cell_v_min=3.456&mqtt_uri=mqtt%3A%2F%2Fbroker%3A1883",
    );
    assert!(body_of(&response).contains("Configuration saved"));

    let cfg = bms_config::snapshot();
    assert_eq!(cfg.wifi.ssid, "pack-lab");
    assert_eq!(cfg.wifi.static_ip, "192.168.1.50");
    // Empty password field keeps the previous secret.
    assert_eq!(cfg.wifi.pass, before.wifi.pass);
    assert_eq!(cfg.battery.cell_v_min, 3.46);
    assert_eq!(cfg.mqtt.uri, "mqtt://broker:1883");

    assert!(node.state.config_path().exists());
    assert_eq!(node.state.kv.get_u8(CONFIG_MODE_KEY), Some(0));
    assert_eq!(node.restarts.load(Ordering::SeqCst), 1);

    // Cancel: flag cleared, restart scheduled, config untouched.
    node.state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    let response = post(addr, "/bms/config/cancel", "");
    assert!(body_of(&response).contains("Configuration canceled"));
    assert_eq!(node.state.kv.get_u8(CONFIG_MODE_KEY), Some(0));
    assert_eq!(node.restarts.load(Ordering::SeqCst), 2);

    bms_config::reset_to_defaults();
}

#[test]
fn oversized_save_body_is_rejected() {
    let node = start_node();
    let body = format!("wifi_ssid={}", "x".repeat(3000));
    let response = post(node.server.local_addr(), "/bms/config/save", &body);
    assert!(response.starts_with("HTTP/1.1 400"));
}
