//! Simulated radio for development and testing without hardware.
//!
//! Every control call is recorded in order so tests can check exactly what
//! the driver asked the radio to do. Faults can be injected on module
//! enables, calibration routines, transfer configuration and reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::trace;

use super::{
    DcCalModule, LnaGain, LpfMode, Module, RadioHardware, RxMetadata, SyncConfig,
    FREQUENCY_MAX_HZ, FREQUENCY_MIN_HZ, LMS_BANDWIDTHS,
};
use crate::error::{HardwareError, HwStatus};

const SAMPLE_RATE_MIN: u32 = 160_000;
const SAMPLE_RATE_MAX: u32 = 40_000_000;

/// A control call as seen by the radio
#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    SetFrequency(Module, u64),
    SetSampleRate(Module, u32),
    SetBandwidth(Module, u32),
    SetLnaGain(LnaGain),
    SetRxVga1(i32),
    SetRxVga2(i32),
    EnableModule(Module, bool),
    CalibrateDc(DcCalModule),
    SetLpfMode(Module, LpfMode),
    SyncConfig(SyncConfig),
}

/// Point at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Enabling (not disabling) the given module
    Enable(Module),
    Calibrate(DcCalModule),
    LpfMode,
    SyncConfig,
}

/// Raw sample generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Every pair is the same raw `(I, Q)`
    Constant(i16, i16),
    /// Complex exponential with a fixed raw DC offset
    Tone {
        dc: (i16, i16),
        amplitude: f32,
        /// Cycles per sample
        frequency: f32,
    },
}

struct SimState {
    serial: String,
    frequency: u64,
    sample_rate: u32,
    bandwidth: u32,
    enabled: HashMap<Module, bool>,
    calls: Vec<HwCall>,
    faults: HashMap<Fault, HwStatus>,
    waveform: Waveform,
    sample_index: u64,
    block_period: Duration,
    failing_reads: u32,
    read_failure: HwStatus,
    short_read: Option<usize>,
    reads: u64,
    timestamp: u64,
}

/// Cloneable handle onto one simulated radio
#[derive(Clone)]
pub struct SimulatedRadio {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedRadio {
    pub fn new(serial: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                serial: serial.to_string(),
                frequency: FREQUENCY_MIN_HZ as u64,
                sample_rate: 2_048_000,
                bandwidth: LMS_BANDWIDTHS[0],
                enabled: HashMap::new(),
                calls: Vec::new(),
                faults: HashMap::new(),
                waveform: Waveform::Constant(0, 0),
                sample_index: 0,
                block_period: Duration::from_millis(1),
                failing_reads: 0,
                read_failure: HwStatus::TIMEOUT,
                short_read: None,
                reads: 0,
                timestamp: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `fault` fail with `status` until cleared
    pub fn inject_fault(&self, fault: Fault, status: HwStatus) {
        self.lock().faults.insert(fault, status);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Fail the next `count` reads with `status`
    pub fn fail_next_reads(&self, count: u32, status: HwStatus) {
        let mut s = self.lock();
        s.failing_reads = count;
        s.read_failure = status;
    }

    /// Return only `count` pairs from the next successful read
    pub fn short_next_read(&self, count: usize) {
        self.lock().short_read = Some(count);
    }

    pub fn set_waveform(&self, waveform: Waveform) {
        let mut s = self.lock();
        s.waveform = waveform;
        s.sample_index = 0;
    }

    /// Simulated transfer time of one block
    pub fn set_block_period(&self, period: Duration) {
        self.lock().block_period = period;
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn is_enabled(&self, module: Module) -> bool {
        self.lock().enabled.get(&module).copied().unwrap_or(false)
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn bandwidth(&self) -> u32 {
        self.lock().bandwidth
    }

    /// Number of `sync_rx` calls so far, failed ones included
    pub fn reads(&self) -> u64 {
        self.lock().reads
    }

    fn record(&self, call: HwCall) {
        trace!("[SIM RADIO] {:?}", call);
        self.lock().calls.push(call);
    }

    fn check_fault(&self, op: &'static str, fault: Fault) -> Result<(), HardwareError> {
        match self.lock().faults.get(&fault) {
            Some(status) => Err(HardwareError::new(op, *status)),
            None => Ok(()),
        }
    }
}

impl RadioHardware for SimulatedRadio {
    fn serial(&self) -> String {
        self.lock().serial.clone()
    }

    fn frequency_range(&self) -> (i64, i64) {
        (FREQUENCY_MIN_HZ, FREQUENCY_MAX_HZ)
    }

    fn set_frequency(&self, module: Module, hz: u64) -> Result<(), HardwareError> {
        self.record(HwCall::SetFrequency(module, hz));
        if (hz as i64) < FREQUENCY_MIN_HZ || (hz as i64) > FREQUENCY_MAX_HZ {
            return Err(HardwareError::new("set_frequency", HwStatus::RANGE));
        }
        self.lock().frequency = hz;
        Ok(())
    }

    fn frequency(&self, _module: Module) -> Result<u64, HardwareError> {
        Ok(self.lock().frequency)
    }

    fn set_sample_rate(&self, module: Module, hz: u32) -> Result<u32, HardwareError> {
        self.record(HwCall::SetSampleRate(module, hz));
        if !(SAMPLE_RATE_MIN..=SAMPLE_RATE_MAX).contains(&hz) {
            return Err(HardwareError::new("set_sample_rate", HwStatus::RANGE));
        }
        self.lock().sample_rate = hz;
        Ok(hz)
    }

    fn set_bandwidth(&self, module: Module, hz: u32) -> Result<u32, HardwareError> {
        self.record(HwCall::SetBandwidth(module, hz));
        // The LMS rounds up to the next filter it has, or its widest one
        let actual = LMS_BANDWIDTHS
            .iter()
            .copied()
            .find(|&bw| bw >= hz)
            .unwrap_or(LMS_BANDWIDTHS[LMS_BANDWIDTHS.len() - 1]);
        self.lock().bandwidth = actual;
        Ok(actual)
    }

    fn set_lna_gain(&self, gain: LnaGain) -> Result<(), HardwareError> {
        self.record(HwCall::SetLnaGain(gain));
        Ok(())
    }

    fn set_rxvga1(&self, db: i32) -> Result<(), HardwareError> {
        self.record(HwCall::SetRxVga1(db));
        Ok(())
    }

    fn set_rxvga2(&self, db: i32) -> Result<(), HardwareError> {
        self.record(HwCall::SetRxVga2(db));
        Ok(())
    }

    fn enable_module(&self, module: Module, enable: bool) -> Result<(), HardwareError> {
        self.record(HwCall::EnableModule(module, enable));
        if enable {
            self.check_fault("enable_module", Fault::Enable(module))?;
        }
        self.lock().enabled.insert(module, enable);
        Ok(())
    }

    fn calibrate_dc(&self, module: DcCalModule) -> Result<(), HardwareError> {
        self.record(HwCall::CalibrateDc(module));
        self.check_fault("calibrate_dc", Fault::Calibrate(module))
    }

    fn set_lpf_mode(&self, module: Module, mode: LpfMode) -> Result<(), HardwareError> {
        self.record(HwCall::SetLpfMode(module, mode));
        self.check_fault("set_lpf_mode", Fault::LpfMode)
    }

    fn sync_config(&self, config: &SyncConfig) -> Result<(), HardwareError> {
        self.record(HwCall::SyncConfig(*config));
        self.check_fault("sync_config", Fault::SyncConfig)
    }

    fn sync_rx(
        &self,
        buf: &mut [i16],
        meta: &mut RxMetadata,
        _timeout_ms: u32,
    ) -> Result<(), HardwareError> {
        let period = self.lock().block_period;
        if !period.is_zero() {
            thread::sleep(period);
        }

        let mut s = self.lock();
        s.reads += 1;

        if s.failing_reads > 0 {
            s.failing_reads -= 1;
            return Err(HardwareError::new("sync_rx", s.read_failure));
        }
        if !s.enabled.get(&Module::Rx).copied().unwrap_or(false) {
            return Err(HardwareError::new("sync_rx", HwStatus::INVAL));
        }

        let requested = buf.len() / 2;
        let count = s.short_read.take().map_or(requested, |n| n.min(requested));

        for pair in buf.chunks_exact_mut(2).take(count) {
            let (i, q) = match s.waveform {
                Waveform::Constant(i, q) => (i, q),
                Waveform::Tone {
                    dc,
                    amplitude,
                    frequency,
                } => {
                    let phase = 2.0 * std::f32::consts::PI * frequency * s.sample_index as f32;
                    (
                        dc.0.saturating_add((amplitude * phase.cos()) as i16),
                        dc.1.saturating_add((amplitude * phase.sin()) as i16),
                    )
                }
            };
            // The wire format is little-endian regardless of host
            pair[0] = i.to_le();
            pair[1] = q.to_le();
            s.sample_index += 1;
        }

        meta.actual_count = count;
        meta.timestamp = s.timestamp;
        meta.status = 0;
        s.timestamp += count as u64;
        Ok(())
    }
}
