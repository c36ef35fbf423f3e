//! Shared data model for the BMS telemetry node.
//!
//! One `Sample` is a single acquisition of all cell voltages plus pack
//! current; samples are value-copied at every hop of the pipeline
//! (adapter -> inter-core queue -> staging ring -> aggregator), never
//! shared by reference across cores.

use serde::{Deserialize, Serialize};

mod buffer;
mod clock;
mod stats;

pub use buffer::SampleBuffer;
pub use clock::ticks_now;
pub use stats::{
    err_cell_overvoltage, err_cell_undervoltage, StatsBatch, StatsWindow, ERR_PACK_OVERCURRENT,
    ERR_PACK_UNDERCURRENT, ERR_VALID, MAX_STATS_WINDOWS,
};

/// Number of cells in the battery pack.
pub const NUM_CELLS: usize = 5;

/// Seconds of samples the inter-core queue can hold.
pub const QUEUE_SECONDS: usize = 30;
/// Sampling rate of the fast path in Hz.
pub const QUEUE_RATE_HZ: usize = 20;
/// Inter-core queue capacity: 30 s of samples at 20 Hz.
pub const QUEUE_LEN: usize = QUEUE_SECONDS * QUEUE_RATE_HZ;

/// One measured BMS sample.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    /// Per-cell voltages.
    pub cell_v: [f32; NUM_CELLS],
    /// Sum of cell voltages.
    pub pack_v: f32,
    /// Pack current.
    pub pack_i: f32,
    /// Monotonic tick at acquisition (ms since process start).
    pub timestamp: u64,
}

impl Sample {
    /// Mark a consumed sample invalid by zeroing every field.
    pub fn zero(&mut self) {
        *self = Sample::default();
    }
}
