//! Device worker thread
//!
//! One thread per device, parked on its command channel while idle:
//!
//! ```text
//! Idle --Start--> Calibrating --ok--> Streaming --Stop--> Stopping --> Idle
//!                      \--fail--> Idle
//! ```
//!
//! A failed calibration leaves the device usable for the next start.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, info_span, warn};

use super::block::SampleSink;
use super::calibration::calibrate;
use super::session::{CorrelationTag, StreamSession, StreamState, WorkerCommand};
use super::stats::StreamStats;
use super::transfer::{SessionEnd, TransferEngine};
use crate::config::StreamConfig;
use crate::dsp::DcRemovalFilter;
use crate::hardware::{Module, RadioHardware};

pub struct DeviceWorker {
    index: usize,
    hardware: Arc<dyn RadioHardware>,
    session: Arc<StreamSession>,
    tag: Arc<CorrelationTag>,
    sink: Arc<dyn SampleSink>,
    stats: Arc<StreamStats>,
    config: StreamConfig,
    commands: Receiver<WorkerCommand>,
    filter: DcRemovalFilter,
}

impl DeviceWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        hardware: Arc<dyn RadioHardware>,
        session: Arc<StreamSession>,
        tag: Arc<CorrelationTag>,
        sink: Arc<dyn SampleSink>,
        stats: Arc<StreamStats>,
        config: StreamConfig,
        commands: Receiver<WorkerCommand>,
    ) -> Self {
        Self {
            index,
            hardware,
            session,
            tag,
            sink,
            stats,
            config,
            commands,
            filter: DcRemovalFilter::new(),
        }
    }

    /// Spawn the worker thread
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("bladerf-rx-{}", self.index))
            .spawn(move || self.run())
    }

    fn run(mut self) {
        let span = info_span!("device", index = self.index);
        let _enter = span.enter();
        debug!("Worker parked");

        loop {
            match self.commands.recv() {
                Ok(WorkerCommand::Start) => {
                    if self.run_session() == SessionEnd::Shutdown {
                        break;
                    }
                    debug!("Worker parked");
                }
                Ok(WorkerCommand::Stop) => debug!("Stop while idle, nothing to do"),
                Ok(WorkerCommand::Shutdown) | Err(_) => break,
            }
        }

        self.session.set_state(StreamState::Idle);
        info!("Worker exited");
    }

    /// One start → calibrate → stream → stop cycle
    fn run_session(&mut self) -> SessionEnd {
        let tag = self.tag.get();
        let span = info_span!("session", tag = tag.as_deref().unwrap_or("-"));
        let _enter = span.enter();

        self.session.set_state(StreamState::Calibrating);
        // Nothing from the previous session may bleed into this one
        self.filter.reset();
        StreamStats::bump(&self.stats.sessions_started);
        info!("Starting RX session");

        if let Err(e) = calibrate(self.hardware.as_ref(), &self.config) {
            error!("RX session aborted: {}", e);
            StreamStats::bump(&self.stats.calibration_failures);
            self.session.set_state(StreamState::Idle);
            return SessionEnd::Stopped;
        }

        // RX must be enabled before every read run
        if let Err(e) = self.hardware.enable_module(Module::Rx, true) {
            error!("RX session aborted: {}", e);
            StreamStats::bump(&self.stats.calibration_failures);
            self.disable(Module::Tx);
            self.disable(Module::Rx);
            self.session.set_state(StreamState::Idle);
            return SessionEnd::Stopped;
        }

        self.session.set_state(StreamState::Streaming);
        info!(
            "Streaming at {:.3} MSPS, {:.3} MHz",
            self.session.sample_rate() as f64 / 1e6,
            self.session.center_frequency() as f64 / 1e6
        );

        let end = {
            let mut engine = TransferEngine::new(
                self.hardware.as_ref(),
                &self.session,
                &self.tag,
                self.sink.as_ref(),
                &self.stats,
                &self.config,
                &mut self.filter,
            );
            engine.run(&self.commands)
        };

        self.disable(Module::Rx);
        self.session.set_state(StreamState::Idle);
        info!("RX session stopped");
        end
    }

    fn disable(&self, module: Module) {
        if let Err(e) = self.hardware.enable_module(module, false) {
            warn!("Failed to disable {}: {}", module, e);
        }
    }
}
