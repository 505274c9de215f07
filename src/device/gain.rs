//! RX gain stages of the LMS6002D front-end

use crate::error::HardwareError;
use crate::hardware::{LnaGain, RadioHardware};

pub const LNA_GAIN_MID_DB: f32 = 3.0;
pub const LNA_GAIN_MAX_DB: f32 = 6.0;
pub const RXVGA1_GAIN_MIN: i32 = 5;
pub const RXVGA1_GAIN_MAX: i32 = 30;
pub const RXVGA2_GAIN_MIN: i32 = 0;
pub const RXVGA2_GAIN_MAX: i32 = 30;

pub const GAIN_UNIT: &str = "dB";

/// Gain control type as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainType {
    Continuous = 0,
    Discrete = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainStage {
    Lna,
    Vga1,
    Vga2,
}

impl GainStage {
    pub const ALL: [GainStage; 3] = [GainStage::Lna, GainStage::Vga1, GainStage::Vga2];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GainStage::Lna => "LNA",
            GainStage::Vga1 => "VGA1",
            GainStage::Vga2 => "VGA2",
        }
    }

    pub fn unit(self) -> &'static str {
        GAIN_UNIT
    }

    pub fn gain_type(self) -> GainType {
        GainType::Continuous
    }

    pub fn min(self) -> f32 {
        match self {
            GainStage::Lna => 0.0,
            GainStage::Vga1 => RXVGA1_GAIN_MIN as f32,
            GainStage::Vga2 => RXVGA2_GAIN_MIN as f32,
        }
    }

    pub fn max(self) -> f32 {
        match self {
            GainStage::Lna => LNA_GAIN_MAX_DB,
            GainStage::Vga1 => RXVGA1_GAIN_MAX as f32,
            GainStage::Vga2 => RXVGA2_GAIN_MAX as f32,
        }
    }

    /// Gain applied when the device is opened: LNA mid, VGAs mid-range
    pub fn startup(self) -> f32 {
        match self {
            GainStage::Lna => LNA_GAIN_MID_DB,
            GainStage::Vga1 => (RXVGA1_GAIN_MIN + (RXVGA1_GAIN_MAX - RXVGA1_GAIN_MIN) / 2) as f32,
            GainStage::Vga2 => (RXVGA2_GAIN_MIN + (RXVGA2_GAIN_MAX - RXVGA2_GAIN_MIN) / 2) as f32,
        }
    }

    /// Program the stage and return the gain actually in effect.
    ///
    /// The value is clamped to the stage range. The LNA only has three
    /// settings: 0 dB bypasses it, up to 3 dB selects mid, anything above
    /// selects max.
    pub fn apply(self, hw: &dyn RadioHardware, value: f32) -> Result<f32, HardwareError> {
        let value = value.clamp(self.min(), self.max());
        match self {
            GainStage::Lna => {
                let setting = match value as i32 {
                    0 => LnaGain::Bypass,
                    1..=3 => LnaGain::Mid,
                    _ => LnaGain::Max,
                };
                hw.set_lna_gain(setting)?;
                Ok(value)
            }
            GainStage::Vga1 => {
                let db = value as i32;
                hw.set_rxvga1(db)?;
                Ok(db as f32)
            }
            GainStage::Vga2 => {
                let db = value as i32;
                hw.set_rxvga2(db)?;
                Ok(db as f32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::{HwCall, SimulatedRadio};

    #[test]
    fn test_startup_values() {
        assert_eq!(GainStage::Lna.startup(), 3.0);
        assert_eq!(GainStage::Vga1.startup(), 17.0);
        assert_eq!(GainStage::Vga2.startup(), 15.0);
    }

    #[test]
    fn test_lna_mapping() {
        let radio = SimulatedRadio::new("sim0");
        GainStage::Lna.apply(&radio, 0.0).unwrap();
        GainStage::Lna.apply(&radio, 2.5).unwrap();
        GainStage::Lna.apply(&radio, 6.0).unwrap();
        assert_eq!(
            radio.calls(),
            vec![
                HwCall::SetLnaGain(LnaGain::Bypass),
                HwCall::SetLnaGain(LnaGain::Mid),
                HwCall::SetLnaGain(LnaGain::Max),
            ]
        );
    }

    #[test]
    fn test_vga_clamps_and_truncates() {
        let radio = SimulatedRadio::new("sim0");
        assert_eq!(GainStage::Vga1.apply(&radio, 45.0).unwrap(), 30.0);
        assert_eq!(GainStage::Vga1.apply(&radio, 0.0).unwrap(), 5.0);
        assert_eq!(GainStage::Vga2.apply(&radio, 12.7).unwrap(), 12.0);
        assert_eq!(
            radio.calls(),
            vec![
                HwCall::SetRxVga1(30),
                HwCall::SetRxVga1(5),
                HwCall::SetRxVga2(12),
            ]
        );
    }

    #[test]
    fn test_stage_lookup() {
        assert_eq!(GainStage::from_index(1), Some(GainStage::Vga1));
        assert_eq!(GainStage::from_index(3), None);
        assert_eq!(GainStage::Vga2.name(), "VGA2");
        assert_eq!(GainStage::Lna.unit(), "dB");
    }
}
