//! Fixed-layout JSON rendering of statistics windows.
//!
//! The payload layout (key order, 3-decimal floats) is part of the wire
//! contract shared with the broker consumers and the dashboard charts,
//! so it is formatted by hand rather than through a serializer that
//! owns the float rendering.

use std::fmt::Write;

use thiserror::Error;

use bms_data::StatsWindow;

/// Maximum serialized length of one stats window.
pub const STATS_JSON_MAXLEN: usize = 512;

#[derive(Debug, Error, PartialEq)]
pub enum JsonError {
    #[error("serialized stats exceed {STATS_JSON_MAXLEN} bytes: {0}")]
    Truncated(usize),
}

/// Serialize one stats window.
///
/// The result is bounded by [`STATS_JSON_MAXLEN`]; a longer rendering is
/// an error rather than a silently clipped payload.
pub fn stats_to_json(st: &StatsWindow) -> Result<String, JsonError> {
    let mut out = String::with_capacity(STATS_JSON_MAXLEN);

    // fmt::Write into a String cannot fail.
    let _ = write!(
        out,
        "{{\"timestamp\":{},\"sample_count\":{},\"cell_errors\":{},",
        st.timestamp, st.sample_count, st.cell_errors
    );

    let _ = write!(
        out,
        "\"cell_v_avg\":[{:.3},{:.3},{:.3},{:.3},{:.3}],",
        st.cell_v_avg[0], st.cell_v_avg[1], st.cell_v_avg[2], st.cell_v_avg[3], st.cell_v_avg[4]
    );
    let _ = write!(
        out,
        "\"cell_v_min\":[{:.3},{:.3},{:.3},{:.3},{:.3}],",
        st.cell_v_min[0], st.cell_v_min[1], st.cell_v_min[2], st.cell_v_min[3], st.cell_v_min[4]
    );
    let _ = write!(
        out,
        "\"cell_v_max\":[{:.3},{:.3},{:.3},{:.3},{:.3}],",
        st.cell_v_max[0], st.cell_v_max[1], st.cell_v_max[2], st.cell_v_max[3], st.cell_v_max[4]
    );

    let _ = write!(
        out,
        "\"pack_v_avg\":{:.3},\"pack_v_min\":{:.3},\"pack_v_max\":{:.3},",
        st.pack_v_avg, st.pack_v_min, st.pack_v_max
    );
    let _ = write!(
        out,
        "\"pack_i_avg\":{:.3},\"pack_i_min\":{:.3},\"pack_i_max\":{:.3}}}",
        st.pack_i_avg, st.pack_i_min, st.pack_i_max
    );

    if out.len() >= STATS_JSON_MAXLEN {
        return Err(JsonError::Truncated(out.len()));
    }
    Ok(out)
}
