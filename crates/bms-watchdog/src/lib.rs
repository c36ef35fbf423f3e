//! Task watchdog service, the host-side model of the hardware task
//! watchdog.
//!
//! Tasks that must be supervised register by name and feed explicitly.
//! A monitor thread checks every registered task against the shared
//! timeout; the first missed deadline runs the expiry action, which by
//! default aborts the process the way the hardware watchdog panics and
//! resets the device. There is no in-process recovery path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info};

/// Watchdog timeout. Feeders run at 20 ms, so a healthy task has four
/// chances per timeout.
pub const WDT_TIMEOUT: Duration = Duration::from_millis(80);

/// Monitor poll interval.
const MONITOR_PERIOD: Duration = Duration::from_millis(5);

/// Ran when a registered task misses the deadline. The default aborts
/// the process; tests substitute a recording action.
pub type ExpiryAction = Box<dyn Fn(&str) + Send + Sync>;

struct WatchdogState {
    tasks: Mutex<HashMap<String, Instant>>,
    timeout: Duration,
    expiry: ExpiryAction,
    running: AtomicBool,
}

/// Per-task watchdog with a single shared timeout. All operations take
/// `&self` so the service can sit behind an `Arc` shared by every core.
pub struct Watchdog {
    state: Arc<WatchdogState>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Initialize with the production timeout and the abort-on-expiry
    /// action.
    pub fn init() -> Self {
        Self::init_with(WDT_TIMEOUT, Box::new(abort_on_expiry))
    }

    /// Initialize with an explicit timeout and expiry action.
    pub fn init_with(timeout: Duration, expiry: ExpiryAction) -> Self {
        let state = Arc::new(WatchdogState {
            tasks: Mutex::new(HashMap::new()),
            timeout,
            expiry,
            running: AtomicBool::new(true),
        });

        let monitor_state = Arc::clone(&state);
        let monitor = thread::Builder::new()
            .name("wdt_monitor".into())
            .spawn(move || monitor_loop(monitor_state))
            .ok();

        info!(
            timeout_ms = timeout.as_millis() as u64,
            "task watchdog initialized"
        );
        Self {
            state,
            monitor: Mutex::new(monitor),
        }
    }

    /// Register a task. Registering an already-registered name just
    /// resets its deadline.
    pub fn register(&self, task: &str) {
        self.state
            .tasks
            .lock()
            .insert(task.to_string(), Instant::now());
        info!(task, "registered to watchdog");
    }

    /// Reset the deadline of a registered task. Feeding an unregistered
    /// name is ignored, matching the tolerated not-found case of the
    /// hardware API.
    pub fn feed(&self, task: &str) {
        if let Some(deadline) = self.state.tasks.lock().get_mut(task) {
            *deadline = Instant::now();
        }
    }

    /// Remove a task from supervision. Must run before the task exits,
    /// otherwise its stale deadline expires the watchdog.
    pub fn unregister(&self, task: &str) {
        self.state.tasks.lock().remove(task);
        info!(task, "unregistered from watchdog");
    }

    pub fn is_registered(&self, task: &str) -> bool {
        self.state.tasks.lock().contains_key(task)
    }

    /// Instant of the task's registration or latest feed. Diagnostics
    /// and tests; `None` for unregistered tasks.
    pub fn last_fed(&self, task: &str) -> Option<Instant> {
        self.state.tasks.lock().get(task).copied()
    }

    /// Stop the monitor and forget all registrations. Idempotent.
    pub fn deinit(&self) {
        self.state.running.store(false, Ordering::Release);
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.join();
        }
        self.state.tasks.lock().clear();
        info!("task watchdog deinitialized");
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.join();
        }
    }
}

fn monitor_loop(state: Arc<WatchdogState>) {
    while state.running.load(Ordering::Acquire) {
        let starved = {
            let tasks = state.tasks.lock();
            tasks
                .iter()
                .find(|(_, fed)| fed.elapsed() > state.timeout)
                .map(|(name, _)| name.clone())
        };

        if let Some(task) = starved {
            error!(task = %task, "watchdog timeout");
            (state.expiry)(&task);
            // A test action returns; drop the stale deadline so the
            // action does not re-fire every poll.
            state.tasks.lock().remove(&task);
        }

        thread::sleep(MONITOR_PERIOD);
    }
}

fn abort_on_expiry(task: &str) {
    error!(task, "watchdog expired, resetting");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_watchdog(
        timeout: Duration,
    ) -> (Watchdog, Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let names = Arc::new(Mutex::new(Vec::new()));
        let fired_in = Arc::clone(&fired);
        let names_in = Arc::clone(&names);
        let wdt = Watchdog::init_with(
            timeout,
            Box::new(move |task| {
                fired_in.fetch_add(1, Ordering::SeqCst);
                names_in.lock().push(task.to_string());
            }),
        );
        (wdt, fired, names)
    }

    #[test]
    fn fed_task_does_not_expire() {
        let (wdt, fired, _) = counting_watchdog(Duration::from_millis(50));
        wdt.register("feeder");

        for _ in 0..10 {
            wdt.feed("feeder");
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn starved_task_expires_and_is_named() {
        let (wdt, fired, names) = counting_watchdog(Duration::from_millis(30));
        wdt.register("fast_core_feeder");

        thread::sleep(Duration::from_millis(100));
        assert!(fired.load(Ordering::SeqCst) >= 1);
        assert_eq!(names.lock()[0], "fast_core_feeder");
    }

    #[test]
    fn unregistered_task_is_not_supervised() {
        let (wdt, fired, _) = counting_watchdog(Duration::from_millis(30));
        wdt.register("feeder");
        wdt.unregister("feeder");

        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn feeding_unregistered_name_is_ignored() {
        let (wdt, fired, _) = counting_watchdog(Duration::from_millis(30));
        wdt.feed("ghost");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn deinit_stops_supervision() {
        let (wdt, fired, _) = counting_watchdog(Duration::from_millis(30));
        wdt.register("feeder");
        wdt.deinit();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!wdt.is_registered("feeder"));
    }
}
