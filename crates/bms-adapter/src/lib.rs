//! Sample acquisition adapters.
//!
//! [`SampleSource`] is the seam between the fast path and whatever
//! produces readings. The demo adapter synthesizes plausible pack data;
//! a hardware adapter would talk to the monitor IC over its transport
//! and plug in behind the same trait.

use thiserror::Error;

mod demo;

pub use demo::DemoAdapter;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("adapter not initialized")]
    NotInitialized,
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// Produces one sample on demand.
pub trait SampleSource: Send {
    /// One-time bring-up; called from the init sequence.
    fn init(&mut self) -> Result<(), AdapterError>;

    /// Acquire one sample. Errors are transient: the fast path logs and
    /// carries on within its cycle budget.
    fn read_sample(&mut self) -> Result<bms_data::Sample, AdapterError>;
}
