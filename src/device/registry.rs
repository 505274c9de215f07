//! Registry of opened devices, indexed by device id

use std::sync::Arc;

use tracing::{info, warn};

use super::handle::DeviceHandle;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::hardware::HardwareBackend;
use crate::stream::SampleSink;

pub struct DeviceRegistry {
    devices: Vec<DeviceHandle>,
}

impl DeviceRegistry {
    /// Open every device the backend finds. Devices that fail to open are
    /// skipped; ids are assigned to the survivors in order.
    pub fn open(
        backend: &dyn HardwareBackend,
        config: &DriverConfig,
        sink: Arc<dyn SampleSink>,
    ) -> Result<Self> {
        let mut devices = Vec::new();
        for hardware in backend.enumerate() {
            let index = devices.len();
            match DeviceHandle::open(index, hardware, config, sink.clone()) {
                Ok(device) => devices.push(device),
                Err(e) => warn!("Skipping device: {}", e),
            }
        }

        if devices.is_empty() {
            return Err(DriverError::NoHardware);
        }
        info!("{} device(s) ready", devices.len());
        Ok(Self { devices })
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn get(&self, index: usize) -> Result<&DeviceHandle> {
        self.devices
            .get(index)
            .ok_or(DriverError::InvalidDevice(index))
    }

    /// Signal every worker first, then wait for all of them
    pub fn shutdown(&self) {
        for device in &self.devices {
            device.request_shutdown();
        }
        for device in &self.devices {
            device.join();
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
