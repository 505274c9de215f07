//! Driver error taxonomy
//!
//! Hardware calls report a raw status code. It is caught where the call is
//! made, tagged with the operation name and turned into one of the types
//! below. Nothing here ever panics across the driver boundary.

use std::fmt;

use thiserror::Error;

use crate::stream::CalibrationStep;

/// Host-facing "ok" status
pub const RC_OK: i32 = 1;
/// Host-facing "not ok" status
pub const RC_NOK: i32 = 0;

/// Raw status code returned by the hardware layer (0 = success)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwStatus(pub i32);

impl HwStatus {
    pub const UNEXPECTED: HwStatus = HwStatus(-1);
    pub const RANGE: HwStatus = HwStatus(-2);
    pub const INVAL: HwStatus = HwStatus(-3);
    pub const IO: HwStatus = HwStatus(-5);
    pub const TIMEOUT: HwStatus = HwStatus(-6);
    pub const NODEV: HwStatus = HwStatus(-7);
    pub const UNSUPPORTED: HwStatus = HwStatus(-8);

    /// Human readable reason, same table libbladeRF uses for `bladerf_strerror`
    pub fn reason(self) -> &'static str {
        match self.0 {
            0 => "Success",
            -1 => "An unexpected error occurred",
            -2 => "Provided parameter was out of the allowable range",
            -3 => "Invalid operation or parameter",
            -4 => "A memory allocation error occurred",
            -5 => "File or device I/O failure",
            -6 => "Operation timed out",
            -7 => "No devices available",
            -8 => "Operation not supported",
            -9 => "Misaligned flash access",
            -10 => "Invalid checksum",
            -11 => "File not found",
            -12 => "An FPGA update is required",
            -13 => "A firmware update is required",
            -14 => "Requested timestamp is in the past",
            -15 => "Could not enqueue data into full queue",
            -16 => "An FPGA operation reported failure",
            -17 => "Insufficient permissions for the requested operation",
            -18 => "Operation would block",
            -19 => "Device not initialized",
            _ => "Unknown error code",
        }
    }
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.0)
    }
}

/// A failed hardware call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{op} failed: {status}")]
pub struct HardwareError {
    pub op: &'static str,
    pub status: HwStatus,
}

impl HardwareError {
    pub fn new(op: &'static str, status: HwStatus) -> Self {
        Self { op, status }
    }

    /// Map a raw libbladeRF return code onto `Result`
    pub fn check(op: &'static str, rc: i32) -> std::result::Result<(), HardwareError> {
        if rc == 0 {
            Ok(())
        } else {
            Err(Self::new(op, HwStatus(rc)))
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status == HwStatus::TIMEOUT
    }
}

/// A calibration attempt that did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("calibration aborted at {step}: {source}")]
pub struct CalibrationError {
    pub step: CalibrationStep,
    #[source]
    pub source: HardwareError,
}

/// Errors surfaced by the driver API
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("no device at index {0}")]
    InvalidDevice(usize),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("worker for device {0} is not running")]
    WorkerGone(usize),

    #[error("failed to spawn device worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no hardware found")]
    NoHardware,
}

impl DriverError {
    /// Status the host sees for this error
    pub fn status_code(&self) -> i32 {
        RC_NOK
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::Config(e.to_string())
    }
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Collapse a driver result into the host's status code
pub fn status_of<T>(result: &Result<T>) -> i32 {
    match result {
        Ok(_) => RC_OK,
        Err(e) => e.status_code(),
    }
}
