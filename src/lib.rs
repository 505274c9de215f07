//! bladeRF RX driver
//!
//! Streams DC-corrected complex samples from bladeRF radios to a host sink.
//! One worker thread per device runs calibrate → stream → stop cycles on
//! request from the [`Driver`] API.

pub mod config;
pub mod device;
pub mod driver;
pub mod dsp;
pub mod error;
pub mod hardware;
pub mod stream;

pub use config::{DriverConfig, StreamConfig};
pub use driver::Driver;
pub use error::{DriverError, HardwareError, HwStatus, Result, RC_NOK, RC_OK};
pub use stream::{
    ChannelSink, DeliveredBlock, Delivery, DeliveryContext, SampleBlock, SampleSink,
    StatsSnapshot, StreamState,
};
