//! Statistics aggregation over staged samples, plus the wire
//! serialization of the resulting windows.

mod json;
mod stats;

pub use json::{stats_to_json, JsonError, STATS_JSON_MAXLEN};
pub use stats::{compute_stats, SAMPLES_PER_0_2S, SAMPLES_PER_1S};
