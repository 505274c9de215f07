//! Host-facing driver API
//!
//! Every call takes a device index. Bad indices and bad arguments come
//! back as errors and leave the device untouched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::device::{DeviceHandle, DeviceRegistry, GainStage, GainType, SAMPLE_RATES};
use crate::error::{DriverError, Result};
use crate::hardware::HardwareBackend;
use crate::stream::{SampleSink, StatsSnapshot, StreamState};

pub struct Driver {
    registry: DeviceRegistry,
}

impl Driver {
    /// Open all devices and spawn one parked worker per device
    pub fn init(
        backend: &dyn HardwareBackend,
        sink: Arc<dyn SampleSink>,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate(SAMPLE_RATES.len())?;
        let registry = DeviceRegistry::open(backend, &config, sink)?;
        info!("Driver ready with {} board(s)", registry.count());
        Ok(Self { registry })
    }

    fn device(&self, device: usize) -> Result<&DeviceHandle> {
        self.registry.get(device)
    }

    fn stage(stage: usize) -> Result<GainStage> {
        GainStage::from_index(stage)
            .ok_or_else(|| DriverError::InvalidArgument(format!("no gain stage {}", stage)))
    }

    pub fn board_count(&self) -> usize {
        self.registry.count()
    }

    pub fn hardware_name(&self, device: usize) -> Result<&str> {
        Ok(self.device(device)?.name())
    }

    pub fn serial_number(&self, device: usize) -> Result<&str> {
        Ok(self.device(device)?.serial())
    }

    /// Set the correlation tag passed with every delivered block
    pub fn set_board_uuid(&self, device: usize, uuid: &str) -> Result<()> {
        self.device(device)?.set_tag(uuid)
    }

    pub fn board_uuid(&self, device: usize) -> Result<Option<String>> {
        Ok(self.device(device)?.tag().map(|t| t.to_string()))
    }

    // Sample rates

    pub fn sample_rate_count(&self, device: usize) -> Result<usize> {
        Ok(self.device(device)?.rates().len())
    }

    pub fn sample_rate_value(&self, device: usize, index: usize) -> Result<u32> {
        self.device(device)?
            .rates()
            .rate(index)
            .ok_or_else(|| DriverError::InvalidArgument(format!("no sample rate {}", index)))
    }

    pub fn preferred_sample_rate(&self, device: usize) -> Result<usize> {
        Ok(self.device(device)?.rates().preferred_index())
    }

    // Frequency range

    pub fn min_center_frequency(&self, device: usize) -> Result<i64> {
        Ok(self.device(device)?.frequency_range().0)
    }

    pub fn max_center_frequency(&self, device: usize) -> Result<i64> {
        Ok(self.device(device)?.frequency_range().1)
    }

    // Gain stage metadata

    pub fn gain_stage_count(&self, device: usize) -> Result<usize> {
        self.device(device)?;
        Ok(GainStage::ALL.len())
    }

    pub fn gain_stage_name(&self, device: usize, stage: usize) -> Result<&'static str> {
        self.device(device)?;
        Ok(Self::stage(stage)?.name())
    }

    pub fn gain_stage_unit(&self, device: usize, stage: usize) -> Result<&'static str> {
        self.device(device)?;
        Ok(Self::stage(stage)?.unit())
    }

    pub fn gain_stage_type(&self, device: usize, stage: usize) -> Result<GainType> {
        self.device(device)?;
        Ok(Self::stage(stage)?.gain_type())
    }

    pub fn min_gain(&self, device: usize, stage: usize) -> Result<f32> {
        self.device(device)?;
        Ok(Self::stage(stage)?.min())
    }

    pub fn max_gain(&self, device: usize, stage: usize) -> Result<f32> {
        self.device(device)?;
        Ok(Self::stage(stage)?.max())
    }

    /// All stages are continuous, so there are no discrete values
    pub fn gain_discrete_values_count(&self, device: usize, stage: usize) -> Result<usize> {
        self.device(device)?;
        Self::stage(stage)?;
        Ok(0)
    }

    pub fn gain_discrete_value(&self, device: usize, stage: usize, index: usize) -> Result<f32> {
        let count = self.gain_discrete_values_count(device, stage)?;
        Err(DriverError::InvalidArgument(format!(
            "discrete value {} out of range (stage has {})",
            index, count
        )))
    }

    // Acquisition

    /// Wake the device worker and start a streaming session
    pub fn prepare_rx_engine(&self, device: usize) -> Result<()> {
        debug!("prepare_rx_engine({})", device);
        self.device(device)?.start()
    }

    /// Ask the device worker to stop; returns without waiting
    pub fn finalize_rx_engine(&self, device: usize) -> Result<()> {
        debug!("finalize_rx_engine({})", device);
        self.device(device)?.stop()
    }

    pub fn set_rx_sample_rate(&self, device: usize, hz: u32) -> Result<()> {
        self.device(device)?.set_sample_rate(hz)
    }

    pub fn actual_rx_sample_rate(&self, device: usize) -> Result<u32> {
        Ok(self.device(device)?.sample_rate())
    }

    pub fn set_rx_center_frequency(&self, device: usize, hz: i64) -> Result<()> {
        self.device(device)?.set_center_frequency(hz)
    }

    pub fn rx_center_frequency(&self, device: usize) -> Result<i64> {
        Ok(self.device(device)?.center_frequency())
    }

    pub fn set_rx_gain(&self, device: usize, stage: usize, value: f32) -> Result<()> {
        let handle = self.device(device)?;
        handle.set_gain(Self::stage(stage)?, value)
    }

    pub fn rx_gain(&self, device: usize, stage: usize) -> Result<f32> {
        let handle = self.device(device)?;
        Ok(handle.gain(Self::stage(stage)?))
    }

    /// Automatic gain is not supported by this front-end
    pub fn set_auto_gain_mode(&self, device: usize) -> Result<bool> {
        self.device(device)?;
        Ok(false)
    }

    // Introspection

    pub fn stream_state(&self, device: usize) -> Result<StreamState> {
        Ok(self.device(device)?.state())
    }

    pub fn stats(&self, device: usize) -> Result<StatsSnapshot> {
        Ok(self.device(device)?.stats())
    }

    /// Block until the device reaches `target` or the timeout elapses
    pub fn wait_for_state(
        &self,
        device: usize,
        target: StreamState,
        timeout: Duration,
    ) -> Result<bool> {
        Ok(self.device(device)?.session().wait_for_state(target, timeout))
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.registry.shutdown();
        info!("Driver shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::sim::SimulatedRadio;
    use crate::hardware::RadioHardware;
    use crate::stream::{Delivery, DeliveryContext, SampleBlock};

    fn decline_all() -> Arc<dyn SampleSink> {
        Arc::new(
            |_tag: Option<&str>, block: SampleBlock, _channels: usize, _ctx: &DeliveryContext| {
                Delivery::Declined(block)
            },
        )
    }

    fn driver_with(radio: &SimulatedRadio) -> Driver {
        let radio = radio.clone();
        let backend = move || vec![Arc::new(radio.clone()) as Arc<dyn RadioHardware>];
        Driver::init(&backend, decline_all(), DriverConfig::default()).unwrap()
    }

    #[test]
    fn test_init_without_hardware() {
        let backend = Vec::<Arc<dyn RadioHardware>>::new;
        let result = Driver::init(&backend, decline_all(), DriverConfig::default());
        assert!(matches!(result, Err(DriverError::NoHardware)));
    }

    #[test]
    fn test_init_rejects_bad_config() {
        let radio = SimulatedRadio::new("sim0");
        let backend = move || vec![Arc::new(radio.clone()) as Arc<dyn RadioHardware>];
        let mut config = DriverConfig::default();
        config.stream.num_transfers = config.stream.num_buffers;
        let result = Driver::init(&backend, decline_all(), config);
        assert!(matches!(result, Err(DriverError::Config(_))));
    }

    #[test]
    fn test_init_rejects_params_that_would_overflow() {
        for params in [
            r#"{"startup_frequency_offset_hz": 9223372036854775807}"#,
            r#"{"startup_frequency_offset_hz": -5}"#,
            r#"{"samples_per_block": 9223372036854775808}"#,
        ] {
            let radio = SimulatedRadio::new("sim0");
            let backend = {
                let radio = radio.clone();
                move || vec![Arc::new(radio.clone()) as Arc<dyn RadioHardware>]
            };
            let mut config = DriverConfig::default();
            config.apply_init_params(params).unwrap();

            let result = Driver::init(&backend, decline_all(), config);
            assert!(matches!(result, Err(DriverError::Config(_))), "{}", params);
            assert!(radio.calls().is_empty());
        }
    }

    #[test]
    fn test_metadata() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);

        assert_eq!(driver.board_count(), 1);
        assert_eq!(driver.hardware_name(0).unwrap(), "BladeRF");
        assert_eq!(driver.serial_number(0).unwrap(), "sim0");
        assert_eq!(driver.sample_rate_count(0).unwrap(), 7);
        assert_eq!(driver.sample_rate_value(0, 0).unwrap(), 2_048_000);
        assert_eq!(driver.preferred_sample_rate(0).unwrap(), 0);
        assert_eq!(driver.min_center_frequency(0).unwrap(), 237_500_000);
        assert_eq!(driver.max_center_frequency(0).unwrap(), 3_800_000_000);
        assert_eq!(driver.gain_stage_count(0).unwrap(), 3);
        assert_eq!(driver.gain_stage_name(0, 2).unwrap(), "VGA2");
        assert_eq!(driver.gain_stage_unit(0, 0).unwrap(), "dB");
        assert_eq!(driver.gain_stage_type(0, 1).unwrap(), GainType::Continuous);
        assert_eq!(driver.max_gain(0, 0).unwrap(), 6.0);
        assert_eq!(driver.min_gain(0, 1).unwrap(), 5.0);
        assert_eq!(driver.gain_discrete_values_count(0, 0).unwrap(), 0);
        assert!(driver.gain_discrete_value(0, 0, 0).is_err());
        assert!(!driver.set_auto_gain_mode(0).unwrap());
    }

    #[test]
    fn test_startup_tuning() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);

        assert_eq!(driver.rx_center_frequency(0).unwrap(), 238_500_000);
        assert_eq!(driver.actual_rx_sample_rate(0).unwrap(), 2_048_000);
        assert_eq!(radio.bandwidth(), 1_500_000);
        assert_eq!(driver.rx_gain(0, 0).unwrap(), 3.0);
        assert_eq!(driver.rx_gain(0, 1).unwrap(), 17.0);
        assert_eq!(driver.rx_gain(0, 2).unwrap(), 15.0);
        assert_eq!(driver.stream_state(0).unwrap(), StreamState::Idle);
    }

    #[test]
    fn test_bad_index_rejected() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);

        assert!(matches!(driver.serial_number(1), Err(DriverError::InvalidDevice(1))));
        assert!(matches!(driver.prepare_rx_engine(4), Err(DriverError::InvalidDevice(4))));
        assert!(matches!(
            driver.set_rx_center_frequency(2, 433_000_000),
            Err(DriverError::InvalidDevice(2))
        ));
        assert!(driver.gain_stage_name(0, 3).is_err());
        assert!(driver.sample_rate_value(0, 7).is_err());
    }

    #[test]
    fn test_invalid_arguments_do_not_mutate() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);
        radio.clear_calls();

        assert!(driver.set_rx_center_frequency(0, 100).is_err());
        assert!(driver.set_rx_sample_rate(0, 0).is_err());
        assert!(driver.set_rx_gain(0, 1, f32::NAN).is_err());
        assert!(driver.set_rx_gain(0, 5, 10.0).is_err());
        assert!(driver.set_board_uuid(0, "").is_err());

        assert!(radio.calls().is_empty());
        assert_eq!(driver.rx_gain(0, 1).unwrap(), 17.0);
        assert_eq!(driver.board_uuid(0).unwrap(), None);
    }

    #[test]
    fn test_sample_rate_retunes_filter() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);

        driver.set_rx_sample_rate(0, 10_240_000).unwrap();
        assert_eq!(driver.actual_rx_sample_rate(0).unwrap(), 10_240_000);
        assert_eq!(radio.bandwidth(), 5_000_000);

        // Off-table rate leaves the filter where it was
        driver.set_rx_sample_rate(0, 3_000_000).unwrap();
        assert_eq!(radio.sample_rate(), 3_000_000);
        assert_eq!(radio.bandwidth(), 5_000_000);

        radio.clear_calls();
        driver.set_rx_sample_rate(0, 3_000_000).unwrap();
        assert!(radio.calls().is_empty());
    }

    #[test]
    fn test_gain_all_stages() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);

        driver.set_rx_gain(0, 0, 6.0).unwrap();
        driver.set_rx_gain(0, 1, 40.0).unwrap();
        driver.set_rx_gain(0, 2, 3.0).unwrap();
        assert_eq!(driver.rx_gain(0, 0).unwrap(), 6.0);
        assert_eq!(driver.rx_gain(0, 1).unwrap(), 30.0);
        assert_eq!(driver.rx_gain(0, 2).unwrap(), 3.0);
    }

    #[test]
    fn test_uuid() {
        let radio = SimulatedRadio::new("sim0");
        let driver = driver_with(&radio);
        driver.set_board_uuid(0, "3f2a-rx").unwrap();
        assert_eq!(driver.board_uuid(0).unwrap().as_deref(), Some("3f2a-rx"));
        driver.set_board_uuid(0, "other").unwrap();
        assert_eq!(driver.board_uuid(0).unwrap().as_deref(), Some("other"));
    }
}
