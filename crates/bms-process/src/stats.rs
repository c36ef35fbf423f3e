//! Aggregator turning staged raw samples into statistics windows.
//!
//! Consumes the staging ring in exact 1-second chunks. A chunk with no
//! limit violations collapses into one window; a chunk with any
//! violation is split into 0.2 s sub-windows so the excursion is
//! localized in time.

use bms_config::BatteryLimits;
use bms_data::{
    err_cell_overvoltage, err_cell_undervoltage, Sample, SampleBuffer, StatsBatch, StatsWindow,
    ERR_PACK_OVERCURRENT, ERR_PACK_UNDERCURRENT, ERR_VALID, MAX_STATS_WINDOWS, NUM_CELLS,
};

/// Samples per 1 s window at the 20 Hz sampling rate.
pub const SAMPLES_PER_1S: usize = 20;
/// Samples per 0.2 s sub-window.
pub const SAMPLES_PER_0_2S: usize = 4;

/// Set violation bits for one sample into `errors`.
fn check_limits_sample(s: &Sample, limits: &BatteryLimits, errors: &mut u16) {
    for i in 0..NUM_CELLS {
        let v = s.cell_v[i];
        if v < limits.cell_v_min {
            *errors |= err_cell_undervoltage(i);
        }
        if v > limits.cell_v_max {
            *errors |= err_cell_overvoltage(i);
        }
    }

    if s.pack_i < limits.current_min {
        *errors |= ERR_PACK_UNDERCURRENT;
    }
    if s.pack_i > limits.current_max {
        *errors |= ERR_PACK_OVERCURRENT;
    }
}

/// Start a window from its first sample: timestamp and min/max taken
/// from the sample, sums and flags zeroed.
fn init_window_from_first(first: &Sample) -> StatsWindow {
    let mut out = StatsWindow {
        timestamp: first.timestamp,
        ..StatsWindow::default()
    };

    for c in 0..NUM_CELLS {
        let v = first.cell_v[c];
        out.cell_v_min[c] = v;
        out.cell_v_max[c] = v;
    }

    out.pack_v_min = first.pack_v;
    out.pack_v_max = first.pack_v;
    out.pack_i_min = first.pack_i;
    out.pack_i_max = first.pack_i;

    out
}

/// Fold one sample into running sums and elementwise extremes.
fn accumulate_sample(s: &Sample, out: &mut StatsWindow) {
    for c in 0..NUM_CELLS {
        let v = s.cell_v[c];
        out.cell_v_avg[c] += v;
        if v < out.cell_v_min[c] {
            out.cell_v_min[c] = v;
        }
        if v > out.cell_v_max[c] {
            out.cell_v_max[c] = v;
        }
    }

    out.pack_v_avg += s.pack_v;
    if s.pack_v < out.pack_v_min {
        out.pack_v_min = s.pack_v;
    }
    if s.pack_v > out.pack_v_max {
        out.pack_v_max = s.pack_v;
    }

    out.pack_i_avg += s.pack_i;
    if s.pack_i < out.pack_i_min {
        out.pack_i_min = s.pack_i;
    }
    if s.pack_i > out.pack_i_max {
        out.pack_i_max = s.pack_i;
    }

    out.sample_count += 1;
}

/// Convert accumulated sums into arithmetic means. Windows always see at
/// least one sample; the zero guard stays for safety.
fn finish_averages(out: &mut StatsWindow) {
    if out.sample_count == 0 {
        return;
    }
    let inv_n = 1.0f32 / out.sample_count as f32;
    for c in 0..NUM_CELLS {
        out.cell_v_avg[c] *= inv_n;
    }
    out.pack_v_avg *= inv_n;
    out.pack_i_avg *= inv_n;
}

/// Compute statistics from staged samples.
///
/// Requires a full 1 s chunk (20 samples); returns `None` and leaves the
/// ring untouched otherwise. On success exactly 20 samples are consumed:
/// the batch is computed, the consumed slots are zeroed in place, and
/// only then do head and count advance. Given the same staged samples
/// the output is bit-identical.
pub fn compute_stats(buf: &mut SampleBuffer, limits: &BatteryLimits) -> Option<StatsBatch> {
    if buf.count() < SAMPLES_PER_1S {
        return None;
    }

    let available = buf.count().min(SAMPLES_PER_1S);

    // First pass: one scan of the chunk decides the windowing mode.
    let mut scan_errors = 0u16;
    for i in 0..available {
        check_limits_sample(buf.get(i), limits, &mut scan_errors);
    }
    let any_violation = scan_errors != 0;

    let mut batch = StatsBatch::new();

    if !any_violation {
        // Nominal: one window over the whole chunk.
        let mut st = init_window_from_first(buf.get(0));
        for i in 0..available {
            accumulate_sample(buf.get(i), &mut st);
            // No violations were found in the first pass.
            st.cell_errors = 0;
        }
        finish_averages(&mut st);
        st.cell_errors |= ERR_VALID;
        batch.windows.push(st);
    } else {
        // Fault: split the chunk into 0.2 s sub-windows, each with its
        // own bitmap.
        let mut offset = 0;
        while offset < available && batch.len() < MAX_STATS_WINDOWS {
            let mut st = init_window_from_first(buf.get(offset));
            for i in 0..SAMPLES_PER_0_2S {
                let s = buf.get(offset + i);
                accumulate_sample(s, &mut st);
                check_limits_sample(s, limits, &mut st.cell_errors);
            }
            finish_averages(&mut st);
            st.cell_errors |= ERR_VALID;
            batch.windows.push(st);

            offset += SAMPLES_PER_0_2S;
        }
    }

    // Consume the chunk: zero first so stale slots cannot be
    // re-processed, then advance head and count.
    buf.zero_range(available);
    buf.consume(available);

    Some(batch)
}
