//! Slow-core task and feeder.
//!
//! The slow-core task advances the application state machine once per
//! 1 s strobe and applies a 30 s soft deadline to each step. Its feeder
//! is spawned on INIT exit and deleted on CONFIG entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::appsm::AppSm;
use crate::node::NodeState;
use crate::tasks_fast::WDT_FEED_PERIOD;

/// State-machine strobe period.
pub const SLOW_STROBE: Duration = Duration::from_millis(1000);
/// Soft deadline for one state-machine step.
pub const SLOW_SOFT_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Watchdog name of the slow-core feeder.
pub const SLOW_FEEDER_TASK: &str = "slow_core_feeder";

/// Handle of the slow-core feeder thread.
pub struct SlowFeeder {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SlowFeeder {
    /// Spawn the feeder; it preempts nothing here, but being a dedicated
    /// thread means slow-path work cannot starve it.
    pub fn create(state: Arc<NodeState>, allow_feeding: Arc<AtomicBool>) -> anyhow::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name(SLOW_FEEDER_TASK.into())
            .spawn({
                let stop = Arc::clone(&stop);
                move || {
                    state.wdt.register(SLOW_FEEDER_TASK);
                    while !stop.load(Ordering::Acquire) {
                        if allow_feeding.load(Ordering::Acquire) {
                            state.wdt.feed(SLOW_FEEDER_TASK);
                        }
                        thread::sleep(WDT_FEED_PERIOD);
                    }
                    state.wdt.unregister(SLOW_FEEDER_TASK);
                    info!("slow core feeder exiting");
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop and join the feeder. It unregisters itself on the way out.
    pub fn delete(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn the slow-core task carrying the state machine.
pub fn slow_core_task_create(state: Arc<NodeState>) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("slow_core".into())
        .spawn(move || slow_core_task(state))?;
    Ok(handle)
}

/// Slow-core loop: one state-machine step per strobe, soft watchdog
/// around each step.
fn slow_core_task(state: Arc<NodeState>) {
    let mut sm = AppSm::new(state);

    loop {
        let start = Instant::now();

        sm.exec();

        let elapsed = start.elapsed();
        if elapsed > SLOW_SOFT_TIMEOUT {
            error!(
                elapsed_ms = elapsed.as_millis() as u64,
                "slow core SW watchdog timeout, disabling HW WD feed"
            );
            sm.disable_feeding();
        }

        thread::sleep(SLOW_STROBE);
    }
}
