//! INIT-state bring-up sequence.

use std::sync::Arc;

use tracing::{error, info};

use bms_adapter::{DemoAdapter, SampleSource};

use crate::appsm::AppSm;
use crate::http::HttpServer;
use crate::net::broker::DemoBroker;
use crate::net::wifi;
use crate::node::NodeState;
use crate::tasks_fast::FastCoreTasks;

/// Bring the node up: station link, HTTP server, broker client, sample
/// adapter, inter-core queue, fast-core tasks. Returns `false` on the
/// first failure; subsystems already started stay up (the CONFIG path
/// needs the HTTP server).
pub fn initialization_exec(sm: &mut AppSm) -> bool {
    let state: Arc<NodeState> = Arc::clone(&sm.state);
    let cfg = bms_config::snapshot();

    if let Err(e) = wifi::connect(&cfg.wifi) {
        error!(error = %e, "wifi init failed");
        return false;
    }

    if sm.http.is_none() {
        match HttpServer::start(Arc::clone(&state)) {
            Ok(server) => sm.http = Some(server),
            Err(e) => {
                error!(error = %e, "http server start failed");
                return false;
            }
        }
    }

    // Broker bring-up happens after the link is connected.
    match DemoBroker::connect(&cfg.mqtt.uri) {
        Ok(broker) => state.set_broker(Arc::new(broker)),
        Err(e) => {
            error!(error = %e, "broker init failed");
            return false;
        }
    }

    let mut adapter: Box<dyn SampleSource> = Box::new(DemoAdapter::new());
    if let Err(e) = adapter.init() {
        error!(error = %e, "adapter init failed");
        return false;
    }

    let queue = state.create_queue();

    match FastCoreTasks::create(Arc::clone(&state), queue, adapter) {
        Ok(fast) => sm.fast = Some(fast),
        Err(e) => {
            error!(error = %e, "fast core tasks creation failed");
            return false;
        }
    }

    info!("application started, tasks running");
    true
}
