//! Per-device state: static metadata, current tuning and the worker

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use super::gain::GainStage;
use super::rates::SampleRateTable;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::hardware::{Module, RadioHardware};
use crate::stream::{
    CorrelationTag, DeviceWorker, SampleSink, StatsSnapshot, StreamSession, StreamState,
    StreamStats,
};

pub const HARDWARE_NAME: &str = "BladeRF";

/// One opened radio and its streaming worker
pub struct DeviceHandle {
    index: usize,
    name: String,
    serial: String,
    frequency_range: (i64, i64),
    rates: SampleRateTable,
    gains: Mutex<[f32; 3]>,
    hardware: Arc<dyn RadioHardware>,
    session: Arc<StreamSession>,
    tag: Arc<CorrelationTag>,
    stats: Arc<StreamStats>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceHandle {
    /// Bring the radio to its startup tuning and spawn its worker
    pub fn open(
        index: usize,
        hardware: Arc<dyn RadioHardware>,
        config: &DriverConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self> {
        let serial = hardware.serial();
        let frequency_range = hardware.frequency_range();

        let center = frequency_range
            .0
            .checked_add(config.startup_frequency_offset_hz)
            .filter(|hz| (frequency_range.0..=frequency_range.1).contains(hz))
            .ok_or_else(|| {
                DriverError::Config(format!(
                    "startup offset {} Hz leaves the {}..={} Hz range",
                    config.startup_frequency_offset_hz, frequency_range.0, frequency_range.1
                ))
            })?;
        if let Err(e) = hardware.set_frequency(Module::Rx, center as u64) {
            warn!("Device {}: startup tuning failed: {}", index, e);
        }

        let rates =
            SampleRateTable::discover(hardware.as_ref(), config.preferred_sample_rate_index)?;
        let sample_rate = hardware.set_sample_rate(Module::Rx, rates.preferred_rate())?;
        if let Some(bw) = rates.bandwidth_at(rates.preferred_index()) {
            hardware.set_bandwidth(Module::Rx, bw)?;
        }

        let mut gains = [0.0f32; 3];
        for stage in GainStage::ALL {
            gains[stage.index()] = stage.apply(hardware.as_ref(), stage.startup())?;
        }

        let (session, commands) = StreamSession::new(sample_rate, center);
        let session = Arc::new(session);
        let tag = Arc::new(CorrelationTag::default());
        let stats = StreamStats::new();

        let worker = DeviceWorker::new(
            index,
            hardware.clone(),
            session.clone(),
            tag.clone(),
            sink,
            stats.clone(),
            config.stream.clone(),
            commands,
        )
        .spawn()
        .map_err(DriverError::WorkerSpawn)?;

        info!(
            "Device {}: {} serial {} at {:.3} MHz, {:.3} MSPS",
            index,
            HARDWARE_NAME,
            serial,
            center as f64 / 1e6,
            sample_rate as f64 / 1e6
        );

        Ok(Self {
            index,
            name: HARDWARE_NAME.to_string(),
            serial,
            frequency_range,
            rates,
            gains: Mutex::new(gains),
            hardware,
            session,
            tag,
            stats,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn frequency_range(&self) -> (i64, i64) {
        self.frequency_range
    }

    pub fn rates(&self) -> &SampleRateTable {
        &self.rates
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn state(&self) -> StreamState {
        self.session.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn set_tag(&self, tag: &str) -> Result<()> {
        if tag.is_empty() {
            return Err(DriverError::InvalidArgument("empty correlation tag".to_string()));
        }
        self.tag.set(tag);
        Ok(())
    }

    pub fn tag(&self) -> Option<Arc<str>> {
        self.tag.get()
    }

    pub fn start(&self) -> Result<()> {
        if self.session.request_start() {
            Ok(())
        } else {
            Err(DriverError::WorkerGone(self.index))
        }
    }

    pub fn stop(&self) -> Result<()> {
        if self.session.request_stop() {
            Ok(())
        } else {
            Err(DriverError::WorkerGone(self.index))
        }
    }

    pub fn set_center_frequency(&self, hz: i64) -> Result<()> {
        let (min, max) = self.frequency_range;
        if hz < min || hz > max {
            return Err(DriverError::InvalidArgument(format!(
                "frequency {} Hz outside {}..={} Hz",
                hz, min, max
            )));
        }
        self.hardware.set_frequency(Module::Rx, hz as u64)?;
        self.session.set_center_frequency(hz);
        debug!("Device {}: tuned to {} Hz", self.index, hz);
        Ok(())
    }

    /// Current frequency as read back from the radio
    pub fn center_frequency(&self) -> i64 {
        match self.hardware.frequency(Module::Rx) {
            Ok(hz) if hz > 0 => {
                self.session.set_center_frequency(hz as i64);
                hz as i64
            }
            Ok(_) => self.session.center_frequency(),
            Err(e) => {
                warn!("Device {}: frequency read-back failed: {}", self.index, e);
                self.session.center_frequency()
            }
        }
    }

    /// Apply a new rate; rates from the table also retune the RF filter
    pub fn set_sample_rate(&self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(DriverError::InvalidArgument("sample rate 0".to_string()));
        }
        if hz == self.session.sample_rate() {
            return Ok(());
        }

        let actual = self.hardware.set_sample_rate(Module::Rx, hz)?;
        self.session.set_sample_rate(actual);

        if let Some(bw) = self.rates.bandwidth_for(hz) {
            let applied = self.hardware.set_bandwidth(Module::Rx, bw)?;
            debug!(
                "Device {}: rate {:.1} kS/s, filter {:.1} kHz",
                self.index,
                hz as f64 / 1e3,
                2.0 * applied as f64 / 1e3
            );
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.session.sample_rate()
    }

    fn lock_gains(&self) -> MutexGuard<'_, [f32; 3]> {
        self.gains.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_gain(&self, stage: GainStage, value: f32) -> Result<()> {
        if !value.is_finite() {
            return Err(DriverError::InvalidArgument(format!(
                "gain {} for {}",
                value,
                stage.name()
            )));
        }
        let applied = stage.apply(self.hardware.as_ref(), value)?;
        self.lock_gains()[stage.index()] = applied;
        Ok(())
    }

    pub fn gain(&self, stage: GainStage) -> f32 {
        self.lock_gains()[stage.index()]
    }

    /// Ask the worker to exit without waiting for it
    pub(crate) fn request_shutdown(&self) {
        self.session.request_shutdown();
    }

    /// Wait for the worker thread to finish (no-op once joined)
    pub(crate) fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Device {}: worker panicked", self.index);
            }
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.request_shutdown();
        self.join();
    }
}
