//! Supported sample rates and the RF filter chosen for each

use tracing::debug;

use crate::error::HardwareError;
use crate::hardware::{Module, RadioHardware, LMS_BANDWIDTHS};

/// Offered sample rates in Hz (multiples of 1.024 MS/s)
pub const SAMPLE_RATES: [u32; 7] = [
    2_048_000, 4_096_000, 6_144_000, 8_192_000, 10_240_000, 12_288_000, 14_336_000,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRateTable {
    rates: Vec<u32>,
    bandwidths: Vec<u32>,
    preferred: usize,
}

impl SampleRateTable {
    /// Build the table, asking the hardware which RF bandwidth each rate gets.
    ///
    /// Filters are tried widest first; the first whose actual bandwidth is
    /// less than half the rate wins, otherwise the narrowest one.
    pub fn discover(hw: &dyn RadioHardware, preferred: usize) -> Result<Self, HardwareError> {
        let mut bandwidths = Vec::with_capacity(SAMPLE_RATES.len());
        for &rate in &SAMPLE_RATES {
            let mut chosen = LMS_BANDWIDTHS[0];
            for &bw in LMS_BANDWIDTHS.iter().rev() {
                chosen = hw.set_bandwidth(Module::Rx, bw)?;
                if chosen.saturating_mul(2) < rate {
                    break;
                }
            }
            debug!(
                "Rate {:.1} kS/s -> RF filter {:.1} kHz",
                rate as f64 / 1e3,
                2.0 * chosen as f64 / 1e3
            );
            bandwidths.push(chosen);
        }

        Ok(Self {
            rates: SAMPLE_RATES.to_vec(),
            bandwidths,
            preferred: preferred.min(SAMPLE_RATES.len() - 1),
        })
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn rate(&self, index: usize) -> Option<u32> {
        self.rates.get(index).copied()
    }

    pub fn preferred_index(&self) -> usize {
        self.preferred
    }

    pub fn preferred_rate(&self) -> u32 {
        self.rates[self.preferred]
    }

    /// RF bandwidth for a rate in the table
    pub fn bandwidth_for(&self, rate: u32) -> Option<u32> {
        self.rates
            .iter()
            .position(|&r| r == rate)
            .map(|i| self.bandwidths[i])
    }

    pub fn bandwidth_at(&self, index: usize) -> Option<u32> {
        self.bandwidths.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimulatedRadio;

    #[test]
    fn test_discover_selects_filters() {
        let radio = SimulatedRadio::new("sim0");
        let table = SampleRateTable::discover(&radio, 0).unwrap();

        assert_eq!(table.len(), 7);
        // Nothing is narrower than 1.024 MHz, so the narrowest filter is kept
        assert_eq!(table.bandwidth_for(2_048_000), Some(1_500_000));
        assert_eq!(table.bandwidth_for(4_096_000), Some(1_750_000));
        assert_eq!(table.bandwidth_for(10_240_000), Some(5_000_000));
        assert_eq!(table.bandwidth_for(14_336_000), Some(7_000_000));
        assert_eq!(table.bandwidth_for(3_000_000), None);
    }

    #[test]
    fn test_preferred_rate() {
        let radio = SimulatedRadio::new("sim0");
        let table = SampleRateTable::discover(&radio, 2).unwrap();
        assert_eq!(table.preferred_rate(), 6_144_000);
        assert_eq!(table.rate(7), None);
    }
}
