//! State-machine lifecycle tests with live collaborators: demo link,
//! demo broker, real fast-core tasks on an ephemeral HTTP port.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use bms_config::CONFIG_MODE_KEY;
use bms_node::appsm::{AppSm, AppState};
use bms_node::node::NodeState;
use bms_watchdog::Watchdog;

fn test_state(dir: &TempDir) -> (Arc<NodeState>, Arc<AtomicUsize>) {
    let restarts = Arc::new(AtomicUsize::new(0));
    let restarts_in = Arc::clone(&restarts);
    let state = NodeState::with_parts(
        dir.path().to_path_buf(),
        "127.0.0.1:0".into(),
        Watchdog::init_with(Duration::from_millis(80), Box::new(|_| {})),
        Box::new(move |_| {
            restarts_in.fetch_add(1, Ordering::SeqCst);
        }),
    )
    .unwrap();
    (state, restarts)
}

#[test]
fn healthy_init_reaches_processing_in_one_step() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);

    let mut sm = AppSm::new(Arc::clone(&state));
    assert_eq!(sm.current(), AppState::Init);

    sm.exec();
    assert_eq!(sm.current(), AppState::Processing);
    assert!(sm.fast_tasks().is_some());
    assert!(sm.http_server().is_some());
    assert!(state.queue().is_some());
    assert!(state.broker().is_some());

    // Shut the pipeline down so the temp dir can go away cleanly.
    state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    sm.exec();
    sm.exec();
    assert_eq!(sm.current(), AppState::Config);
}

#[test]
fn processing_fills_history_from_live_pipeline() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);

    let mut sm = AppSm::new(Arc::clone(&state));
    sm.exec();
    assert_eq!(sm.current(), AppState::Processing);

    // 20 samples arrive in one second at 20 Hz; allow a few strobes for
    // the first full chunk to aggregate and land in history.
    let deadline = Instant::now() + Duration::from_secs(10);
    while state.history.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(200));
        sm.exec();
    }
    assert!(
        !state.history.is_empty(),
        "no stats window reached history within 10 s"
    );

    let mut rendered = Vec::new();
    state.history.render_as_json_array(&mut rendered).unwrap();
    let rendered = String::from_utf8(rendered).unwrap();
    assert!(rendered.starts_with("[{\"timestamp\":"));
    assert!(rendered.contains("\"cell_errors\":"));

    state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    sm.exec();
    sm.exec();
    assert_eq!(sm.current(), AppState::Config);
}

#[test]
fn config_flag_moves_processing_to_config() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);

    let mut sm = AppSm::new(Arc::clone(&state));
    sm.exec();
    assert_eq!(sm.current(), AppState::Processing);

    // Persisted request: next processing step must leave for CONFIG.
    state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    sm.exec();
    assert_eq!(sm.current(), AppState::Config);

    // The flag was consumed on the way.
    assert_eq!(state.kv.get_u8(CONFIG_MODE_KEY), Some(0));

    // CONFIG entry tears the fast tasks down within its bounded wait.
    let start = Instant::now();
    sm.exec();
    assert_eq!(sm.current(), AppState::Config);
    assert!(sm.fast_tasks().is_none());
    // Entry teardown (<= 500 ms wait + settle) plus the 1 s config body.
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn config_is_terminal_without_restart() {
    let dir = TempDir::new().unwrap();
    let (state, restarts) = test_state(&dir);

    let mut sm = AppSm::new(Arc::clone(&state));
    sm.exec();
    state.kv.set_u8(CONFIG_MODE_KEY, 1).unwrap();
    sm.exec();
    sm.exec();
    sm.exec();
    assert_eq!(sm.current(), AppState::Config);
    assert_eq!(restarts.load(Ordering::SeqCst), 0);
}
