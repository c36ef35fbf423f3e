//! Network collaborators: station link bring-up and the broker client.
//!
//! Both are contracts the core consumes; the implementations here are
//! the demo stand-ins for the real radio and MQTT stacks.

pub mod broker;
pub mod wifi;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("wifi connect timeout")]
    ConnectTimeout,
    #[error("broker not connected")]
    NotConnected,
    #[error("unsupported broker uri: {0}")]
    BadUri(String),
}
