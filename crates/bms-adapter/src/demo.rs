//! Demo adapter: synthesizes samples with a deterministic xorshift32
//! stream, injecting occasional under/over-voltage excursions.

use tracing::info;

use bms_data::{ticks_now, Sample, NUM_CELLS};

use crate::{AdapterError, SampleSource};

/// Probability of pushing one cell below the configured minimum.
const P_UNDERVOLTAGE: f32 = 0.02;
/// Probability of pushing one cell above the configured maximum.
const P_OVERVOLTAGE: f32 = 0.02;

/// Seed used when the entropy source hands back zero, which xorshift32
/// cannot recover from.
const FALLBACK_SEED: u32 = 0x1234_5678;

/// Synthetic sample source for bench and demo runs.
#[derive(Debug, Default)]
pub struct DemoAdapter {
    /// Lazily seeded on the first draw; zero means "not seeded yet".
    state: u32,
    initialized: bool,
}

impl DemoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixed-seed constructor for deterministic tests.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            state: if seed == 0 { FALLBACK_SEED } else { seed },
            initialized: false,
        }
    }

    fn rand32(&mut self) -> u32 {
        if self.state == 0 {
            self.state = rand::random::<u32>();
            if self.state == 0 {
                self.state = FALLBACK_SEED;
            }
        }

        // xorshift32
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Pseudo-random f32 in [0, 1) built from 24 random bits.
    fn rand01(&mut self) -> f32 {
        (self.rand32() & 0x00FF_FFFF) as f32 / 0x0100_0000 as f32
    }
}

impl SampleSource for DemoAdapter {
    fn init(&mut self) -> Result<(), AdapterError> {
        self.initialized = true;
        info!("demo adapter initialized (random cell voltages)");
        Ok(())
    }

    fn read_sample(&mut self) -> Result<Sample, AdapterError> {
        if !self.initialized {
            return Err(AdapterError::NotInitialized);
        }

        let battery = bms_config::snapshot().battery;
        let mut out = Sample::default();
        let mut pack_v = 0.0f32;

        for i in 0..NUM_CELLS {
            let r = self.rand01();
            let mut v = battery.cell_v_min + r * (battery.cell_v_max - battery.cell_v_min);

            // Occasional excursion 0.1-0.3 V outside the configured band.
            let e = self.rand01();
            if e < P_UNDERVOLTAGE {
                v -= 0.1 + self.rand01() * 0.2;
            } else if e > 1.0 - P_OVERVOLTAGE {
                v += 0.1 + self.rand01() * 0.2;
            }

            out.cell_v[i] = v;
            pack_v += v;
        }

        out.pack_v = pack_v;
        // Asymmetric on purpose, matching the deployed generator.
        out.pack_i = battery.current_min + self.rand01() * battery.current_max * 2.0;
        out.timestamp = ticks_now();

        Ok(out)
    }
}
