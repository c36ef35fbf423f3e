//! Fast-core tasks: the 20 Hz sampler and its watchdog feeder.
//!
//! The sampler owns the producer side of the inter-core queue. A full
//! queue at the start of a cycle, or a cycle overrunning its 50 ms
//! period, latches `allow_feeding` off: the feeder then skips its feeds
//! and the watchdog resets the node. The latch is one-way in-process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use bms_adapter::SampleSource;
use bms_sync::IntercoreQueue;

use crate::node::NodeState;

/// Sampler period: 20 Hz.
pub const FAST_CORE_PERIOD: Duration = Duration::from_millis(50);
/// Feeder period; four feeds per watchdog timeout.
pub const WDT_FEED_PERIOD: Duration = Duration::from_millis(20);
/// Watchdog name of the fast-core feeder.
pub const FAST_FEEDER_TASK: &str = "fast_core_feeder";

/// Graceful-exit polling on delete: 10 x 50 ms.
const EXIT_WAIT_SLICES: usize = 10;
const EXIT_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Handles and flags of the running fast-core tasks.
pub struct FastCoreTasks {
    should_exit: Arc<AtomicBool>,
    allow_feeding: Arc<AtomicBool>,
    sampler: Option<JoinHandle<()>>,
    feeder: Option<JoinHandle<()>>,
}

impl FastCoreTasks {
    /// Spawn the sampler and feeder threads.
    pub fn create(
        state: Arc<NodeState>,
        queue: Arc<IntercoreQueue>,
        adapter: Box<dyn SampleSource>,
    ) -> anyhow::Result<Self> {
        let should_exit = Arc::new(AtomicBool::new(false));
        let allow_feeding = Arc::new(AtomicBool::new(true));

        let sampler = thread::Builder::new().name("fast_core".into()).spawn({
            let should_exit = Arc::clone(&should_exit);
            let allow_feeding = Arc::clone(&allow_feeding);
            move || fast_core_task(adapter, queue, should_exit, allow_feeding)
        })?;

        let feeder = thread::Builder::new()
            .name(FAST_FEEDER_TASK.into())
            .spawn({
                let should_exit = Arc::clone(&should_exit);
                let allow_feeding = Arc::clone(&allow_feeding);
                move || fast_core_feeder_task(state, should_exit, allow_feeding)
            })?;

        Ok(Self {
            should_exit,
            allow_feeding,
            sampler: Some(sampler),
            feeder: Some(feeder),
        })
    }

    /// Latch state, for the slow path and tests.
    pub fn feeding_allowed(&self) -> bool {
        self.allow_feeding.load(Ordering::Acquire)
    }

    pub fn exited(&self) -> bool {
        let sampler_done = self.sampler.as_ref().map_or(true, |h| h.is_finished());
        let feeder_done = self.feeder.as_ref().map_or(true, |h| h.is_finished());
        sampler_done && feeder_done
    }

    /// Signal both tasks to exit and wait up to 500 ms. Threads still
    /// running after the window are abandoned with a warning; the latch
    /// stays set so they exit at their next loop check.
    pub fn delete(mut self) {
        info!("signaling fast core tasks to exit gracefully");
        self.should_exit.store(true, Ordering::Release);

        for _ in 0..EXIT_WAIT_SLICES {
            if self.exited() {
                break;
            }
            thread::sleep(EXIT_WAIT_SLICE);
        }

        for (name, handle) in [
            ("fast_core", self.sampler.take()),
            (FAST_FEEDER_TASK, self.feeder.take()),
        ] {
            match handle {
                Some(h) if h.is_finished() => {
                    let _ = h.join();
                }
                Some(_) => warn!(task = name, "force deleting task (didn't exit gracefully)"),
                None => {}
            }
        }

        info!("fast core tasks cleaned up");
    }
}

/// Sampler loop: one adapter read and queue push per 50 ms cycle, with
/// the queue-full and overrun checks that gate watchdog feeding.
fn fast_core_task(
    mut adapter: Box<dyn SampleSource>,
    queue: Arc<IntercoreQueue>,
    should_exit: Arc<AtomicBool>,
    allow_feeding: Arc<AtomicBool>,
) {
    let mut next_wake = Instant::now() + FAST_CORE_PERIOD;

    while !should_exit.load(Ordering::Acquire) {
        let start = Instant::now();

        // A full queue means the consumer died 30 s ago; stop feeding
        // and let the watchdog reset the node.
        if queue.free_slots() == 0 {
            error!("sample queue full (no free slots), disabling watchdog feed");
            allow_feeding.store(false, Ordering::Release);
        }

        match adapter.read_sample() {
            Ok(sample) => {
                if !queue.push(&sample) {
                    // Next cycle's free-slots check trips the latch.
                    error!("failed to enqueue sample (queue full)");
                }
            }
            Err(e) => error!(error = %e, "adapter read_sample failed"),
        }

        let elapsed = start.elapsed();
        if elapsed > FAST_CORE_PERIOD {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = FAST_CORE_PERIOD.as_millis() as u64,
                "fast core RT overrun"
            );
            allow_feeding.store(false, Ordering::Release);
        }

        // Absolute-deadline delay keeps the 20 Hz cadence independent of
        // per-cycle work time.
        let now = Instant::now();
        if next_wake > now {
            thread::sleep(next_wake - now);
        }
        next_wake += FAST_CORE_PERIOD;
    }

    info!("fast core task exiting gracefully");
}

/// Feeder loop: feeds the watchdog every 20 ms while the latch allows.
fn fast_core_feeder_task(
    state: Arc<NodeState>,
    should_exit: Arc<AtomicBool>,
    allow_feeding: Arc<AtomicBool>,
) {
    state.wdt.register(FAST_FEEDER_TASK);

    while !should_exit.load(Ordering::Acquire) {
        if allow_feeding.load(Ordering::Acquire) {
            state.wdt.feed(FAST_FEEDER_TASK);
        }
        thread::sleep(WDT_FEED_PERIOD);
    }

    info!("fast core feeder unregistering and exiting gracefully");
    state.wdt.unregister(FAST_FEEDER_TASK);
}
