//! Real-time RX pipeline
//!
//! 1. Worker parks until the host sends a start
//! 2. Calibrate the analog front-end
//! 3. Read SC16 Q11 blocks, scale, remove DC
//! 4. Hand each block to the host sink
//! 5. Back to idle on stop

mod block;
mod calibration;
mod session;
mod stats;
mod transfer;
mod worker;

pub use block::{
    ChannelSink, DeliveredBlock, Delivery, DeliveryContext, SampleBlock, SampleSink,
    CONTEXT_VERSION,
};
pub use calibration::{calibrate, sync_config, CalibrationStep};
pub use session::{CorrelationTag, StreamSession, StreamState, WorkerCommand};
pub use stats::{StatsSnapshot, StreamStats};
pub use transfer::{convert_sample, SessionEnd, TransferEngine, CHANNEL_COUNT, SCALE};
pub use worker::DeviceWorker;
