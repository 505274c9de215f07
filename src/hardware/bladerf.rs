//! libbladeRF backend
//!
//! Thin FFI over the bladeRF 1 (LMS6002D) API. libbladeRF serialises calls
//! on a device handle internally, which is what lets the host retune while
//! the worker sits in `bladerf_sync_rx`.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::Arc;

use tracing::{info, warn};

use super::{
    DcCalModule, HardwareBackend, LnaGain, LpfMode, Module, RadioHardware, RxMetadata,
    SampleFormat, SyncConfig, FREQUENCY_MAX_HZ, FREQUENCY_MIN_HZ,
};
use crate::error::{HardwareError, HwStatus};

type BladerfDevice = c_void;

const BLADERF_CHANNEL_RX0: c_int = 0;
const BLADERF_CHANNEL_TX0: c_int = 1;
const BLADERF_RX_X1: c_int = 0;
const BLADERF_FORMAT_SC16_Q11_META: c_int = 1;

const BLADERF_LNA_GAIN_BYPASS: c_int = 1;
const BLADERF_LNA_GAIN_MID: c_int = 2;
const BLADERF_LNA_GAIN_MAX: c_int = 3;

const BLADERF_DC_CAL_LPF_TUNING: c_int = 0;
const BLADERF_DC_CAL_TX_LPF: c_int = 1;
const BLADERF_DC_CAL_RX_LPF: c_int = 2;
const BLADERF_DC_CAL_RXVGA2: c_int = 3;

const BLADERF_LPF_NORMAL: c_int = 0;

const BLADERF_FPGA_40KLE: c_int = 40;
const BLADERF_FPGA_115KLE: c_int = 115;

#[repr(C)]
#[allow(dead_code)]
struct BladerfDevinfo {
    backend: c_int,
    serial: [c_char; 33],
    usb_bus: u8,
    usb_addr: u8,
    instance: c_uint,
    manufacturer: [c_char; 33],
    product: [c_char; 33],
}

#[repr(C)]
#[allow(dead_code)]
struct BladerfMetadata {
    timestamp: u64,
    flags: u32,
    status: u32,
    actual_count: c_uint,
    reserved: [u8; 32],
}

extern "C" {
    fn bladerf_get_device_list(devices: *mut *mut BladerfDevinfo) -> c_int;
    fn bladerf_free_device_list(devices: *mut BladerfDevinfo);
    fn bladerf_open_with_devinfo(
        device: *mut *mut BladerfDevice,
        devinfo: *mut BladerfDevinfo,
    ) -> c_int;
    fn bladerf_close(device: *mut BladerfDevice);
    fn bladerf_is_fpga_configured(dev: *mut BladerfDevice) -> c_int;
    fn bladerf_get_fpga_size(dev: *mut BladerfDevice, size: *mut c_int) -> c_int;
    fn bladerf_load_fpga(dev: *mut BladerfDevice, fpga: *const c_char) -> c_int;
    fn bladerf_set_frequency(dev: *mut BladerfDevice, ch: c_int, frequency: u64) -> c_int;
    fn bladerf_get_frequency(dev: *mut BladerfDevice, ch: c_int, frequency: *mut u64) -> c_int;
    fn bladerf_set_sample_rate(
        dev: *mut BladerfDevice,
        ch: c_int,
        rate: c_uint,
        actual: *mut c_uint,
    ) -> c_int;
    fn bladerf_set_bandwidth(
        dev: *mut BladerfDevice,
        ch: c_int,
        bandwidth: c_uint,
        actual: *mut c_uint,
    ) -> c_int;
    fn bladerf_set_lna_gain(dev: *mut BladerfDevice, gain: c_int) -> c_int;
    fn bladerf_set_rxvga1(dev: *mut BladerfDevice, gain: c_int) -> c_int;
    fn bladerf_set_rxvga2(dev: *mut BladerfDevice, gain: c_int) -> c_int;
    fn bladerf_enable_module(dev: *mut BladerfDevice, ch: c_int, enable: bool) -> c_int;
    fn bladerf_calibrate_dc(dev: *mut BladerfDevice, module: c_int) -> c_int;
    fn bladerf_set_lpf_mode(dev: *mut BladerfDevice, ch: c_int, mode: c_int) -> c_int;
    fn bladerf_sync_config(
        dev: *mut BladerfDevice,
        layout: c_int,
        format: c_int,
        num_buffers: c_uint,
        buffer_size: c_uint,
        num_transfers: c_uint,
        stream_timeout: c_uint,
    ) -> c_int;
    fn bladerf_sync_rx(
        dev: *mut BladerfDevice,
        samples: *mut c_void,
        num_samples: c_uint,
        metadata: *mut BladerfMetadata,
        timeout_ms: c_uint,
    ) -> c_int;
}

fn channel(module: Module) -> c_int {
    match module {
        Module::Rx => BLADERF_CHANNEL_RX0,
        Module::Tx => BLADERF_CHANNEL_TX0,
    }
}

/// An opened bladeRF
pub struct BladerfRadio {
    dev: *mut BladerfDevice,
    serial: String,
}

// libbladeRF guards each device handle with its own lock
unsafe impl Send for BladerfRadio {}
unsafe impl Sync for BladerfRadio {}

impl RadioHardware for BladerfRadio {
    fn serial(&self) -> String {
        self.serial.clone()
    }

    fn frequency_range(&self) -> (i64, i64) {
        (FREQUENCY_MIN_HZ, FREQUENCY_MAX_HZ)
    }

    fn set_frequency(&self, module: Module, hz: u64) -> Result<(), HardwareError> {
        let rc = unsafe { bladerf_set_frequency(self.dev, channel(module), hz) };
        HardwareError::check("set_frequency", rc)
    }

    fn frequency(&self, module: Module) -> Result<u64, HardwareError> {
        let mut hz: u64 = 0;
        let rc = unsafe { bladerf_get_frequency(self.dev, channel(module), &mut hz) };
        HardwareError::check("get_frequency", rc)?;
        Ok(hz)
    }

    fn set_sample_rate(&self, module: Module, hz: u32) -> Result<u32, HardwareError> {
        let mut actual: c_uint = 0;
        let rc = unsafe { bladerf_set_sample_rate(self.dev, channel(module), hz, &mut actual) };
        HardwareError::check("set_sample_rate", rc)?;
        Ok(actual)
    }

    fn set_bandwidth(&self, module: Module, hz: u32) -> Result<u32, HardwareError> {
        let mut actual: c_uint = 0;
        let rc = unsafe { bladerf_set_bandwidth(self.dev, channel(module), hz, &mut actual) };
        HardwareError::check("set_bandwidth", rc)?;
        Ok(actual)
    }

    fn set_lna_gain(&self, gain: LnaGain) -> Result<(), HardwareError> {
        let value = match gain {
            LnaGain::Bypass => BLADERF_LNA_GAIN_BYPASS,
            LnaGain::Mid => BLADERF_LNA_GAIN_MID,
            LnaGain::Max => BLADERF_LNA_GAIN_MAX,
        };
        let rc = unsafe { bladerf_set_lna_gain(self.dev, value) };
        HardwareError::check("set_lna_gain", rc)
    }

    fn set_rxvga1(&self, db: i32) -> Result<(), HardwareError> {
        let rc = unsafe { bladerf_set_rxvga1(self.dev, db) };
        HardwareError::check("set_rxvga1", rc)
    }

    fn set_rxvga2(&self, db: i32) -> Result<(), HardwareError> {
        let rc = unsafe { bladerf_set_rxvga2(self.dev, db) };
        HardwareError::check("set_rxvga2", rc)
    }

    fn enable_module(&self, module: Module, enable: bool) -> Result<(), HardwareError> {
        let rc = unsafe { bladerf_enable_module(self.dev, channel(module), enable) };
        HardwareError::check("enable_module", rc)
    }

    fn calibrate_dc(&self, module: DcCalModule) -> Result<(), HardwareError> {
        let value = match module {
            DcCalModule::LpfTuning => BLADERF_DC_CAL_LPF_TUNING,
            DcCalModule::TxLpf => BLADERF_DC_CAL_TX_LPF,
            DcCalModule::RxLpf => BLADERF_DC_CAL_RX_LPF,
            DcCalModule::RxVga2 => BLADERF_DC_CAL_RXVGA2,
        };
        let rc = unsafe { bladerf_calibrate_dc(self.dev, value) };
        HardwareError::check("calibrate_dc", rc)
    }

    fn set_lpf_mode(&self, module: Module, mode: LpfMode) -> Result<(), HardwareError> {
        let value = match mode {
            LpfMode::Normal => BLADERF_LPF_NORMAL,
        };
        let rc = unsafe { bladerf_set_lpf_mode(self.dev, channel(module), value) };
        HardwareError::check("set_lpf_mode", rc)
    }

    fn sync_config(&self, config: &SyncConfig) -> Result<(), HardwareError> {
        if config.module != Module::Rx {
            return Err(HardwareError::new("sync_config", HwStatus::UNSUPPORTED));
        }
        let format = match config.format {
            SampleFormat::Sc16Q11Meta => BLADERF_FORMAT_SC16_Q11_META,
        };
        let rc = unsafe {
            bladerf_sync_config(
                self.dev,
                BLADERF_RX_X1,
                format,
                config.num_buffers,
                config.buffer_size,
                config.num_transfers,
                config.timeout_ms,
            )
        };
        HardwareError::check("sync_config", rc)
    }

    fn sync_rx(
        &self,
        buf: &mut [i16],
        meta: &mut RxMetadata,
        timeout_ms: u32,
    ) -> Result<(), HardwareError> {
        let mut raw = BladerfMetadata {
            timestamp: 0,
            flags: meta.flags,
            status: 0,
            actual_count: 0,
            reserved: [0; 32],
        };
        let num_samples = (buf.len() / 2) as c_uint;
        let rc = unsafe {
            bladerf_sync_rx(
                self.dev,
                buf.as_mut_ptr() as *mut c_void,
                num_samples,
                &mut raw,
                timeout_ms,
            )
        };
        HardwareError::check("sync_rx", rc)?;

        meta.timestamp = raw.timestamp;
        meta.status = raw.status;
        meta.actual_count = (raw.actual_count as usize).min(buf.len() / 2);
        Ok(())
    }
}

impl Drop for BladerfRadio {
    fn drop(&mut self) {
        unsafe {
            bladerf_enable_module(self.dev, BLADERF_CHANNEL_RX0, false);
            bladerf_close(self.dev);
        }
    }
}

/// Enumerates attached bladeRFs, loading an FPGA image where needed
pub struct BladerfBackend {
    fpga_image_dir: PathBuf,
}

impl BladerfBackend {
    pub fn new(fpga_image_dir: impl Into<PathBuf>) -> Self {
        Self {
            fpga_image_dir: fpga_image_dir.into(),
        }
    }

    /// Make sure the FPGA is loaded; false means the device is unusable
    fn ensure_fpga(&self, dev: *mut BladerfDevice, serial: &str) -> bool {
        let configured = unsafe { bladerf_is_fpga_configured(dev) };
        if configured > 0 {
            return true;
        }

        let mut size: c_int = 0;
        let rc = unsafe { bladerf_get_fpga_size(dev, &mut size) };
        if rc != 0 {
            warn!("bladeRF {}: get_fpga_size failed: {}", serial, HwStatus(rc));
            return false;
        }
        let image = match size {
            BLADERF_FPGA_40KLE => "hostedx40.rbf",
            BLADERF_FPGA_115KLE => "hostedx115.rbf",
            other => {
                warn!("bladeRF {}: unknown FPGA size {}, skipping", serial, other);
                return false;
            }
        };

        let path = self.fpga_image_dir.join(image);
        load_fpga(dev, &path, serial)
    }
}

fn load_fpga(dev: *mut BladerfDevice, path: &Path, serial: &str) -> bool {
    let Ok(c_path) = CString::new(path.to_string_lossy().as_bytes()) else {
        warn!("bladeRF {}: FPGA path {:?} contains a NUL byte", serial, path);
        return false;
    };
    info!("bladeRF {}: loading FPGA image {:?}", serial, path);
    let rc = unsafe { bladerf_load_fpga(dev, c_path.as_ptr()) };
    if rc != 0 {
        warn!("bladeRF {}: load_fpga failed: {}", serial, HwStatus(rc));
        return false;
    }
    true
}

impl HardwareBackend for BladerfBackend {
    fn enumerate(&self) -> Vec<Arc<dyn RadioHardware>> {
        let mut list: *mut BladerfDevinfo = ptr::null_mut();
        let count = unsafe { bladerf_get_device_list(&mut list) };
        if count <= 0 || list.is_null() {
            return Vec::new();
        }

        let mut radios: Vec<Arc<dyn RadioHardware>> = Vec::new();
        for i in 0..count as usize {
            let info = unsafe { &mut *list.add(i) };
            let serial = unsafe { CStr::from_ptr(info.serial.as_ptr()) }
                .to_string_lossy()
                .to_string();

            let mut dev: *mut BladerfDevice = ptr::null_mut();
            let rc = unsafe { bladerf_open_with_devinfo(&mut dev, info) };
            if rc != 0 || dev.is_null() {
                warn!("bladeRF {}: open failed: {}", serial, HwStatus(rc));
                continue;
            }
            if !self.ensure_fpga(dev, &serial) {
                unsafe { bladerf_close(dev) };
                continue;
            }

            info!("bladeRF {} (instance {}) ready", serial, info.instance);
            radios.push(Arc::new(BladerfRadio { dev, serial }));
        }

        unsafe { bladerf_free_device_list(list) };
        radios
    }
}
