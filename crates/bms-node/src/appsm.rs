//! Application state machine: INIT -> PROCESSING <-> CONFIG.
//!
//! One step per slow-core strobe: entry actions when the state was just
//! entered, the state body computing the next state, exit actions when
//! the state is about to be left, then the shift. CONFIG is terminal
//! in-process; it is left only through a restart requested by the HTTP
//! save/cancel handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use bms_config::CONFIG_MODE_KEY;
use bms_data::SampleBuffer;
use bms_process::{compute_stats, stats_to_json};

use crate::http::HttpServer;
use crate::init;
use crate::net::broker::STATS_TOPIC;
use crate::node::NodeState;
use crate::tasks_fast::FastCoreTasks;
use crate::tasks_slow::SlowFeeder;

/// Staging ring capacity: most samples drained from the inter-core
/// queue in one slow-core cycle.
pub const MAX_SAMPLES_PER_POP: usize = 100;

/// Settle delay between task teardown and watchdog deinit.
const CONFIG_TEARDOWN_SETTLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Undefined,
    Init,
    Processing,
    Config,
}

/// The state machine and the subsystem handles it owns.
pub struct AppSm {
    pub(crate) state: Arc<NodeState>,

    prev: AppState,
    curr: AppState,
    next: AppState,

    /// Staging ring; allocated on PROCESSING entry, freed on exit.
    pub(crate) staging: Option<SampleBuffer>,
    /// Fast-core task pair; created by the INIT sequence.
    pub(crate) fast: Option<FastCoreTasks>,
    /// Slow-core feeder; spawned on INIT exit, deleted on CONFIG entry.
    pub(crate) slow_feeder: Option<SlowFeeder>,
    /// HTTP front-end; started by the INIT sequence, stays up in CONFIG.
    pub(crate) http: Option<HttpServer>,

    /// Slow-core feeding latch, shared with the slow feeder.
    slow_allow_feeding: Arc<AtomicBool>,
}

impl AppSm {
    pub fn new(state: Arc<NodeState>) -> Self {
        Self {
            state,
            prev: AppState::Undefined,
            curr: AppState::Init,
            next: AppState::Init,
            staging: None,
            fast: None,
            slow_feeder: None,
            http: None,
            slow_allow_feeding: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn current(&self) -> AppState {
        self.curr
    }

    pub fn fast_tasks(&self) -> Option<&FastCoreTasks> {
        self.fast.as_ref()
    }

    pub fn http_server(&self) -> Option<&HttpServer> {
        self.http.as_ref()
    }

    /// Trip the slow-core feeding latch. One-way until restart.
    pub fn disable_feeding(&self) {
        self.slow_allow_feeding.store(false, Ordering::Release);
    }

    /// Run one state-machine step.
    pub fn exec(&mut self) {
        self.input_handler();

        self.next = match self.curr {
            AppState::Init => self.init_body(),
            AppState::Processing => self.processing_body(),
            AppState::Config => self.config_body(),
            AppState::Undefined => self.curr,
        };

        self.output_handler();

        self.prev = self.curr;
        self.curr = self.next;
    }

    /// Entry actions, run when the state was entered this step.
    fn input_handler(&mut self) {
        if self.prev == self.curr {
            return;
        }

        match self.curr {
            AppState::Init => {
                if let Err(e) = self.state.mount_data_dir() {
                    error!(error = %e, "data dir mount failed");
                    return;
                }

                match bms_config::load_from(&self.state.config_path()) {
                    Ok(()) => {
                        let cfg = bms_config::snapshot();
                        info!(ssid = %cfg.wifi.ssid, mqtt_uri = %cfg.mqtt.uri, "config loaded");
                        info!(
                            cell_v_min = cfg.battery.cell_v_min as f64,
                            cell_v_max = cfg.battery.cell_v_max as f64,
                            "battery limits"
                        );
                    }
                    Err(e) => warn!(error = %e, "config not loaded, using defaults"),
                }
            }

            AppState::Processing => {
                self.staging = Some(SampleBuffer::with_capacity(MAX_SAMPLES_PER_POP));
            }

            AppState::Config => {
                info!("entering CONFIG state, cleaning up tasks and disabling watchdogs");

                if let Some(fast) = self.fast.take() {
                    fast.delete();
                }
                if let Some(feeder) = self.slow_feeder.take() {
                    feeder.delete();
                }

                thread::sleep(CONFIG_TEARDOWN_SETTLE);
                self.state.wdt.deinit();
            }

            AppState::Undefined => {}
        }
    }

    /// Exit actions, run when the state is being left this step.
    fn output_handler(&mut self) {
        if self.next == self.curr {
            return;
        }

        match self.curr {
            AppState::Init => {
                match SlowFeeder::create(
                    Arc::clone(&self.state),
                    Arc::clone(&self.slow_allow_feeding),
                ) {
                    Ok(feeder) => self.slow_feeder = Some(feeder),
                    Err(e) => error!(error = %e, "failed to create slow core feeder"),
                }
            }

            AppState::Processing => {
                self.staging = None;
            }

            AppState::Config | AppState::Undefined => {}
        }
    }

    fn init_body(&mut self) -> AppState {
        if init::initialization_exec(self) {
            AppState::Processing
        } else {
            warn!("initialization failed, entering CONFIG state");
            AppState::Config
        }
    }

    fn processing_body(&mut self) -> AppState {
        match self.state.kv.take_flag(CONFIG_MODE_KEY) {
            Ok(true) => {
                info!("config mode flag set, entering CONFIG state");
                return AppState::Config;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "config mode flag check failed"),
        }

        let Self { state, staging, .. } = self;
        let staging = match staging.as_mut() {
            Some(staging) => staging,
            None => return AppState::Processing,
        };

        // 1) Drain the inter-core queue into the staging ring.
        if let Some(queue) = state.queue() {
            while !staging.is_full() {
                match queue.pop() {
                    Some(sample) => {
                        staging.push(sample);
                    }
                    None => break,
                }
            }
        }

        // 2) Aggregate until the ring has less than a full chunk, and
        // ship every produced window.
        let battery = bms_config::snapshot().battery;
        while let Some(batch) = compute_stats(staging, &battery) {
            for (i, st) in batch.windows.iter().enumerate() {
                let json = match stats_to_json(st) {
                    Ok(json) => json,
                    Err(e) => {
                        error!(error = %e, "failed to serialize stats");
                        break;
                    }
                };

                // QoS0: dropped messages are logged and forgotten.
                if let Some(broker) = state.broker() {
                    if let Err(e) = broker.publish_qos0(STATS_TOPIC, json.as_bytes()) {
                        warn!(error = %e, "broker publish failed, message dropped");
                    }
                }

                // History feeds the dashboard regardless of publish.
                state.history.push(json.as_bytes());

                info!(
                    window = i,
                    timestamp = st.timestamp,
                    samples = st.sample_count,
                    cell_errors = %format!("{:#06x}", st.cell_errors),
                    "stats window"
                );
            }
        }

        AppState::Processing
    }

    fn config_body(&mut self) -> AppState {
        thread::sleep(Duration::from_millis(1000));
        AppState::Config
    }
}
