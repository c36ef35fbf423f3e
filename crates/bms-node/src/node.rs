//! Process-wide node state shared across cores and the HTTP front-end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;

use bms_config::KvStore;
use bms_sync::{HistoryRing, IntercoreQueue};
use bms_watchdog::Watchdog;

use crate::net::broker::BrokerClient;
use crate::system;

/// Restart hook: production schedules a delayed process exit, tests
/// record the request instead.
pub type Restarter = Box<dyn Fn(Duration) + Send + Sync>;

/// Shared handles with process lifetime. Single initialization entry
/// point ([`NodeState::new`]); subsystems created later in INIT live in
/// `OnceCell` slots.
pub struct NodeState {
    pub data_dir: PathBuf,
    pub http_addr: String,
    /// Persistent flag store (`storage` namespace analog).
    pub kv: KvStore,
    /// Serialized stats windows for dashboard replay.
    pub history: HistoryRing,
    /// Task watchdog, final arbiter of liveness.
    pub wdt: Watchdog,
    /// Inter-core sample queue; created by the INIT sequence.
    queue: OnceCell<Arc<IntercoreQueue>>,
    /// Broker client; created by the INIT sequence.
    broker: OnceCell<Arc<dyn BrokerClient>>,
    restarter: Restarter,
}

impl NodeState {
    /// Build the node state with the production watchdog and restarter.
    pub fn new(data_dir: PathBuf, http_addr: String) -> anyhow::Result<Arc<Self>> {
        Self::with_parts(
            data_dir,
            http_addr,
            Watchdog::init(),
            Box::new(system::schedule_restart),
        )
    }

    /// Build with explicit watchdog and restarter, used by tests to
    /// observe expiry and restart instead of dying.
    pub fn with_parts(
        data_dir: PathBuf,
        http_addr: String,
        wdt: Watchdog,
        restarter: Restarter,
    ) -> anyhow::Result<Arc<Self>> {
        let kv = KvStore::open(data_dir.join("storage.json"))?;
        Ok(Arc::new(Self {
            data_dir,
            http_addr,
            kv,
            history: HistoryRing::new(),
            wdt,
            queue: OnceCell::new(),
            broker: OnceCell::new(),
            restarter,
        }))
    }

    /// Path of the JSON configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    /// Create the inter-core queue. Later calls return the existing one.
    pub fn create_queue(&self) -> Arc<IntercoreQueue> {
        Arc::clone(
            self.queue
                .get_or_init(|| Arc::new(IntercoreQueue::new())),
        )
    }

    pub fn queue(&self) -> Option<&Arc<IntercoreQueue>> {
        self.queue.get()
    }

    /// Install the broker client created by the INIT sequence.
    pub fn set_broker(&self, broker: Arc<dyn BrokerClient>) {
        let _ = self.broker.set(broker);
    }

    pub fn broker(&self) -> Option<&Arc<dyn BrokerClient>> {
        self.broker.get()
    }

    /// Request a process restart after `delay`.
    pub fn request_restart(&self, delay: Duration) {
        (self.restarter)(delay);
    }

    /// Prepare the data directory (flash filesystem mount analog).
    pub fn mount_data_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}
