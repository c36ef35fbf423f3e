//! Process-level reset plumbing.

use std::thread;
use std::time::Duration;

use tracing::info;

/// Schedule an orderly process exit after `delay`, detached from the
/// caller so an HTTP response can go out first. The surrounding
/// supervisor (or the operator) brings the node back up; CONFIG mode is
/// only ever left through this path.
pub fn schedule_restart(delay: Duration) {
    info!(delay_ms = delay.as_millis() as u64, "restart scheduled");
    thread::Builder::new()
        .name("restart".into())
        .spawn(move || {
            thread::sleep(delay);
            info!("restarting now");
            std::process::exit(0);
        })
        .ok();
}
