//! Hardware layer boundary
//!
//! Everything the streaming core needs from the radio goes through
//! [`RadioHardware`]. Implementations: [`sim::SimulatedRadio`] (always
//! available) and `bladerf::BladerfBackend` (feature `bladerf`).

#[cfg(feature = "bladerf")]
pub mod bladerf;
pub mod sim;

use std::fmt;
use std::sync::Arc;

use crate::error::HardwareError;

/// bladeRF (LMS6002D) tuning range without an expansion board
pub const FREQUENCY_MIN_HZ: i64 = 237_500_000;
pub const FREQUENCY_MAX_HZ: i64 = 3_800_000_000;

/// LMS6002D low-pass filter bandwidths, narrowest first
pub const LMS_BANDWIDTHS: [u32; 16] = [
    1_500_000, 1_750_000, 2_500_000, 2_750_000, 3_000_000, 3_840_000, 5_000_000, 5_500_000,
    6_000_000, 7_000_000, 8_750_000, 10_000_000, 12_000_000, 14_000_000, 18_000_000, 20_000_000,
];

/// Signal path inside the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Rx,
    Tx,
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Rx => write!(f, "RX"),
            Module::Tx => write!(f, "TX"),
        }
    }
}

/// Analog blocks with an on-chip DC calibration routine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DcCalModule {
    LpfTuning,
    TxLpf,
    RxLpf,
    RxVga2,
}

/// Low-pass filter operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpfMode {
    Normal,
}

/// Discrete LNA settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LnaGain {
    Bypass,
    Mid,
    Max,
}

/// Wire format of streamed samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Interleaved signed 16-bit I/Q, 12 significant bits, with per-block metadata
    Sc16Q11Meta,
}

/// Block-transfer subsystem parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub module: Module,
    pub format: SampleFormat,
    pub num_buffers: u32,
    pub buffer_size: u32,
    pub num_transfers: u32,
    pub timeout_ms: u32,
}

/// Ask the hardware to read immediately rather than at a scheduled timestamp
pub const META_FLAG_RX_NOW: u32 = 1 << 31;

/// Per-read metadata, filled in by `sync_rx`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxMetadata {
    pub flags: u32,
    pub timestamp: u64,
    pub actual_count: usize,
    pub status: u32,
}

impl RxMetadata {
    pub fn rx_now() -> Self {
        Self {
            flags: META_FLAG_RX_NOW,
            ..Self::default()
        }
    }
}

/// One physical radio.
///
/// Calls take `&self`: the host may retune while the worker is blocked in
/// `sync_rx`, so implementations serialise internally.
pub trait RadioHardware: Send + Sync {
    fn serial(&self) -> String;

    /// Tunable RX range in Hz, inclusive
    fn frequency_range(&self) -> (i64, i64);

    fn set_frequency(&self, module: Module, hz: u64) -> Result<(), HardwareError>;
    fn frequency(&self, module: Module) -> Result<u64, HardwareError>;

    /// Returns the rate actually applied
    fn set_sample_rate(&self, module: Module, hz: u32) -> Result<u32, HardwareError>;

    /// Returns the bandwidth actually applied
    fn set_bandwidth(&self, module: Module, hz: u32) -> Result<u32, HardwareError>;

    fn set_lna_gain(&self, gain: LnaGain) -> Result<(), HardwareError>;
    fn set_rxvga1(&self, db: i32) -> Result<(), HardwareError>;
    fn set_rxvga2(&self, db: i32) -> Result<(), HardwareError>;

    fn enable_module(&self, module: Module, enable: bool) -> Result<(), HardwareError>;
    fn calibrate_dc(&self, module: DcCalModule) -> Result<(), HardwareError>;
    fn set_lpf_mode(&self, module: Module, mode: LpfMode) -> Result<(), HardwareError>;
    fn sync_config(&self, config: &SyncConfig) -> Result<(), HardwareError>;

    /// Blocking read of up to `buf.len() / 2` interleaved little-endian
    /// I/Q pairs. On success `meta.actual_count` holds the pairs written.
    fn sync_rx(
        &self,
        buf: &mut [i16],
        meta: &mut RxMetadata,
        timeout_ms: u32,
    ) -> Result<(), HardwareError>;
}

/// Source of radios at driver initialisation
pub trait HardwareBackend {
    /// Open every attached device that is ready to stream
    fn enumerate(&self) -> Vec<Arc<dyn RadioHardware>>;
}

impl<F> HardwareBackend for F
where
    F: Fn() -> Vec<Arc<dyn RadioHardware>>,
{
    fn enumerate(&self) -> Vec<Arc<dyn RadioHardware>> {
        self()
    }
}
