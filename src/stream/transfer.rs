//! Steady-state RX loop: blocking read → SC16 Q11 to float → DC removal →
//! delivery, until the host asks to stop.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use num_complex::Complex32;
use tracing::{debug, info, warn};

use super::block::{Delivery, SampleBlock, SampleSink};
use super::session::{CorrelationTag, StreamSession, WorkerCommand};
use super::stats::StreamStats;
use crate::config::StreamConfig;
use crate::dsp::DcRemovalFilter;
use crate::hardware::{RadioHardware, RxMetadata};

/// SC16 Q11 full scale: 12 significant bits plus headroom
pub const SCALE: f32 = 1.0 / 2048.0;

/// One RX channel per device
pub const CHANNEL_COUNT: usize = 1;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Pause after a failed read so a vanished device does not spin the worker
pub const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Stopped,
    Shutdown,
}

/// Convert one little-endian wire pair to normalized floats
#[inline(always)]
pub fn convert_sample(raw_i: i16, raw_q: i16) -> Complex32 {
    Complex32::new(
        i16::from_le(raw_i) as f32 * SCALE,
        i16::from_le(raw_q) as f32 * SCALE,
    )
}

pub struct TransferEngine<'a> {
    hardware: &'a dyn RadioHardware,
    session: &'a StreamSession,
    tag: &'a CorrelationTag,
    sink: &'a dyn SampleSink,
    stats: &'a StreamStats,
    config: &'a StreamConfig,
    filter: &'a mut DcRemovalFilter,
    raw: Vec<i16>,
    consecutive_failures: u64,
}

impl<'a> TransferEngine<'a> {
    /// New engine filtering through `filter`, whose carry-state it continues
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hardware: &'a dyn RadioHardware,
        session: &'a StreamSession,
        tag: &'a CorrelationTag,
        sink: &'a dyn SampleSink,
        stats: &'a StreamStats,
        config: &'a StreamConfig,
        filter: &'a mut DcRemovalFilter,
    ) -> Self {
        Self {
            hardware,
            session,
            tag,
            sink,
            stats,
            config,
            filter,
            raw: vec![0i16; config.samples_per_block * 2],
            consecutive_failures: 0,
        }
    }

    /// Transfer blocks until a stop or shutdown command arrives
    pub fn run(&mut self, commands: &Receiver<WorkerCommand>) -> SessionEnd {
        let mut last_stats_time = Instant::now();
        let mut last_sample_count = self.stats.snapshot().samples_delivered;

        loop {
            if let Some(end) = poll_commands(commands) {
                return end;
            }

            self.transfer_block();

            if last_stats_time.elapsed() >= STATS_INTERVAL {
                let snap = self.stats.snapshot();
                let elapsed = last_stats_time.elapsed().as_secs_f32();
                let rate = (snap.samples_delivered - last_sample_count) as f32 / elapsed;
                info!(
                    "[RX Stats] Rate: {:.3} MSPS | Blocks: {} (freed: {}) | Read failures: {}",
                    rate / 1_000_000.0,
                    snap.blocks_delivered,
                    snap.blocks_freed,
                    snap.read_failures
                );
                last_stats_time = Instant::now();
                last_sample_count = snap.samples_delivered;
            }
        }
    }

    /// One read/convert/filter/deliver iteration. Returns true if a block
    /// went to the sink.
    pub fn transfer_block(&mut self) -> bool {
        let mut meta = RxMetadata::rx_now();
        let result = self
            .hardware
            .sync_rx(&mut self.raw, &mut meta, self.config.read_timeout_ms);

        if let Err(e) = result {
            StreamStats::bump(&self.stats.read_failures);
            self.consecutive_failures += 1;
            let n = self.consecutive_failures;
            if n == 1 || n % self.config.read_failure_log_interval.max(1) == 0 {
                warn!("RX read failed ({} in a row): {}", n, e);
            }
            thread::sleep(READ_RETRY_DELAY);
            return false;
        }

        if self.consecutive_failures > 0 {
            info!("RX reads recovered after {} failures", self.consecutive_failures);
            self.consecutive_failures = 0;
        }

        let count = meta.actual_count.min(self.config.samples_per_block);
        if count < self.config.samples_per_block {
            StreamStats::bump(&self.stats.short_reads);
            debug!(
                "Short read: {} of {} samples",
                count, self.config.samples_per_block
            );
        }
        if count == 0 {
            return false;
        }

        let samples = self.condition(count);
        let block = SampleBlock::new(samples, meta.timestamp);

        let tag = self.tag.get();
        let context = self.session.context();
        match self
            .sink
            .deliver(tag.as_deref(), block, CHANNEL_COUNT, &context)
        {
            Delivery::Retained => StreamStats::bump(&self.stats.blocks_retained),
            Delivery::Declined(block) => {
                drop(block);
                StreamStats::bump(&self.stats.blocks_freed);
            }
        }

        StreamStats::bump(&self.stats.blocks_delivered);
        self.stats
            .samples_delivered
            .fetch_add(count as u64, std::sync::atomic::Ordering::Relaxed);
        true
    }

    /// Convert and filter the first `count` pairs of the raw buffer, in order
    fn condition(&mut self, count: usize) -> Vec<Complex32> {
        let mut samples: Vec<Complex32> = self
            .raw
            .chunks_exact(2)
            .take(count)
            .map(|pair| convert_sample(pair[0], pair[1]))
            .collect();
        self.filter.process_block(&mut samples);
        samples
    }
}

/// Drain pending commands; a `Start` while streaming is already satisfied
fn poll_commands(commands: &Receiver<WorkerCommand>) -> Option<SessionEnd> {
    loop {
        match commands.try_recv() {
            Ok(WorkerCommand::Start) => continue,
            Ok(WorkerCommand::Stop) => return Some(SessionEnd::Stopped),
            Ok(WorkerCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                return Some(SessionEnd::Shutdown)
            }
            Err(TryRecvError::Empty) => return None,
        }
    }
}
