//! Sample blocks and their hand-off to the host sink
//!
//! A [`SampleBlock`] is moved into the sink. The sink either keeps it
//! ([`Delivery::Retained`]) or hands it straight back
//! ([`Delivery::Declined`]) and the engine drops it. The engine can never
//! touch a retained block again, and a declined one cannot still be
//! referenced by the sink.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use num_complex::Complex32;

/// Version of the [`DeliveryContext`] layout
pub const CONTEXT_VERSION: u32 = 0;

/// Per-block description handed to the sink alongside the samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryContext {
    pub version: u32,
    pub sample_rate: u32,
    pub center_frequency: i64,
}

/// Conditioned samples from one hardware read
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<Complex32>,
    timestamp: u64,
}

impl SampleBlock {
    pub fn new(samples: Vec<Complex32>, timestamp: u64) -> Self {
        Self { samples, timestamp }
    }

    pub fn samples(&self) -> &[Complex32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Hardware timestamp of the first sample, in sample ticks
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// Outcome of a delivery
#[derive(Debug)]
pub enum Delivery {
    /// The sink owns the block now
    Retained,
    /// The sink did not take the block; the engine frees it
    Declined(SampleBlock),
}

impl Delivery {
    /// Status in the host's convention: positive means ownership moved
    pub fn status(&self) -> i32 {
        match self {
            Delivery::Retained => 1,
            Delivery::Declined(_) => 0,
        }
    }
}

/// Host-supplied consumer of conditioned samples
pub trait SampleSink: Send + Sync {
    fn deliver(
        &self,
        tag: Option<&str>,
        block: SampleBlock,
        channels: usize,
        context: &DeliveryContext,
    ) -> Delivery;
}

impl<F> SampleSink for F
where
    F: Fn(Option<&str>, SampleBlock, usize, &DeliveryContext) -> Delivery + Send + Sync,
{
    fn deliver(
        &self,
        tag: Option<&str>,
        block: SampleBlock,
        channels: usize,
        context: &DeliveryContext,
    ) -> Delivery {
        self(tag, block, channels, context)
    }
}

/// A block the sink kept, with everything it was delivered with
#[derive(Debug)]
pub struct DeliveredBlock {
    pub tag: Option<String>,
    pub block: SampleBlock,
    pub channels: usize,
    pub context: DeliveryContext,
}

/// Sink that forwards blocks over a bounded channel.
///
/// When the channel is full the block is declined rather than blocking
/// the worker.
pub struct ChannelSink {
    tx: Sender<DeliveredBlock>,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<DeliveredBlock>) {
        let (tx, rx) = bounded(capacity);
        (Self { tx }, rx)
    }
}

impl SampleSink for ChannelSink {
    fn deliver(
        &self,
        tag: Option<&str>,
        block: SampleBlock,
        channels: usize,
        context: &DeliveryContext,
    ) -> Delivery {
        let delivered = DeliveredBlock {
            tag: tag.map(str::to_string),
            block,
            channels,
            context: *context,
        };
        match self.tx.try_send(delivered) {
            Ok(()) => Delivery::Retained,
            Err(TrySendError::Full(d)) | Err(TrySendError::Disconnected(d)) => {
                Delivery::Declined(d.block)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DeliveryContext {
        DeliveryContext {
            version: CONTEXT_VERSION,
            sample_rate: 2_048_000,
            center_frequency: 433_920_000,
        }
    }

    #[test]
    fn test_channel_sink_retains_until_full() {
        let (sink, rx) = ChannelSink::bounded(1);
        let block = SampleBlock::new(vec![Complex32::new(0.5, -0.5)], 7);

        let first = sink.deliver(Some("rx-a"), block.clone(), 1, &context());
        assert_eq!(first.status(), 1);

        match sink.deliver(Some("rx-a"), block.clone(), 1, &context()) {
            Delivery::Declined(returned) => assert_eq!(returned, block),
            Delivery::Retained => panic!("full channel must decline"),
        }

        let got = rx.recv().unwrap();
        assert_eq!(got.tag.as_deref(), Some("rx-a"));
        assert_eq!(got.block.timestamp(), 7);
        assert_eq!(got.context, context());
    }

    #[test]
    fn test_closure_sink() {
        let sink = |_: Option<&str>, block: SampleBlock, _: usize, _: &DeliveryContext| {
            Delivery::Declined(block)
        };
        let d = sink.deliver(None, SampleBlock::new(Vec::new(), 0), 1, &context());
        assert_eq!(d.status(), 0);
    }
}
