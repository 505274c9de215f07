//! Device handles, their metadata tables and the registry that owns them

mod gain;
mod handle;
mod rates;
mod registry;

pub use gain::{GainStage, GainType, GAIN_UNIT};
pub use handle::{DeviceHandle, HARDWARE_NAME};
pub use rates::{SampleRateTable, SAMPLE_RATES};
pub use registry::DeviceRegistry;
