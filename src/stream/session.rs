//! Stream session shared between the host and a device worker
//!
//! The host talks to the worker only through [`WorkerCommand`]s: `Start`
//! wakes the parked worker, `Stop` is picked up between blocks, `Shutdown`
//! ends the thread. Commands are handled in the order they were sent.
//! Filter carry-state is not here: it lives inside the worker's transfer
//! engine and nothing else can reach it.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::block::{DeliveryContext, CONTEXT_VERSION};

/// Streaming state of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Calibrating,
    Streaming,
    Stopping,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamState::Idle => "idle",
            StreamState::Calibrating => "calibrating",
            StreamState::Streaming => "streaming",
            StreamState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Host → worker signals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCommand {
    Start,
    Stop,
    Shutdown,
}

/// Host-assigned routing tag of a device
#[derive(Debug, Default)]
pub struct CorrelationTag(Mutex<Option<Arc<str>>>);

impl CorrelationTag {
    pub fn set(&self, tag: &str) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::from(tag));
    }

    pub fn get(&self) -> Option<Arc<str>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

pub struct StreamSession {
    commands: Sender<WorkerCommand>,
    state: Mutex<StreamState>,
    changed: Condvar,
    sample_rate: AtomicU32,
    center_frequency: AtomicI64,
}

impl StreamSession {
    /// New idle session and the command receiver for its worker
    pub fn new(sample_rate: u32, center_frequency: i64) -> (Self, Receiver<WorkerCommand>) {
        let (tx, rx) = unbounded();
        let session = Self {
            commands: tx,
            state: Mutex::new(StreamState::Idle),
            changed: Condvar::new(),
            sample_rate: AtomicU32::new(sample_rate),
            center_frequency: AtomicI64::new(center_frequency),
        };
        (session, rx)
    }

    fn lock_state(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the worker. False if the worker is gone.
    pub fn request_start(&self) -> bool {
        self.commands.send(WorkerCommand::Start).is_ok()
    }

    /// Ask the worker to stop after the block in flight. No acknowledgment.
    pub fn request_stop(&self) -> bool {
        {
            let mut state = self.lock_state();
            if *state == StreamState::Streaming {
                *state = StreamState::Stopping;
                self.changed.notify_all();
            }
        }
        self.commands.send(WorkerCommand::Stop).is_ok()
    }

    pub(crate) fn request_shutdown(&self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
    }

    pub fn state(&self) -> StreamState {
        *self.lock_state()
    }

    /// True between a successful calibration and the return to idle
    pub fn is_running(&self) -> bool {
        matches!(self.state(), StreamState::Streaming | StreamState::Stopping)
    }

    pub(crate) fn set_state(&self, next: StreamState) {
        *self.lock_state() = next;
        self.changed.notify_all();
    }

    /// Block until the session reaches `target`; false on timeout
    pub fn wait_for_state(&self, target: StreamState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        while *state != target {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn set_sample_rate(&self, hz: u32) {
        self.sample_rate.store(hz, Ordering::Release);
    }

    pub fn center_frequency(&self) -> i64 {
        self.center_frequency.load(Ordering::Acquire)
    }

    pub fn set_center_frequency(&self, hz: i64) {
        self.center_frequency.store(hz, Ordering::Release);
    }

    /// Context for the next delivered block
    pub fn context(&self) -> DeliveryContext {
        DeliveryContext {
            version: CONTEXT_VERSION,
            sample_rate: self.sample_rate(),
            center_frequency: self.center_frequency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_commands_arrive_in_order() {
        let (session, rx) = StreamSession::new(2_048_000, 100_000_000);
        assert!(session.request_start());
        assert!(session.request_stop());
        assert!(session.request_start());
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![WorkerCommand::Start, WorkerCommand::Stop, WorkerCommand::Start]
        );
    }

    #[test]
    fn test_stop_marks_streaming_session_stopping() {
        let (session, _rx) = StreamSession::new(2_048_000, 100_000_000);
        session.set_state(StreamState::Streaming);
        session.request_stop();
        assert_eq!(session.state(), StreamState::Stopping);
        assert!(session.is_running());

        session.set_state(StreamState::Idle);
        assert!(!session.is_running());
    }

    #[test]
    fn test_stop_while_idle_leaves_idle() {
        let (session, _rx) = StreamSession::new(2_048_000, 100_000_000);
        session.request_stop();
        assert_eq!(session.state(), StreamState::Idle);
    }

    #[test]
    fn test_wait_for_state() {
        let (session, _rx) = StreamSession::new(2_048_000, 100_000_000);
        let session = Arc::new(session);
        assert!(!session.wait_for_state(StreamState::Streaming, Duration::from_millis(10)));

        let s = session.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            s.set_state(StreamState::Streaming);
        });
        assert!(session.wait_for_state(StreamState::Streaming, Duration::from_secs(5)));
        t.join().unwrap();
    }

    #[test]
    fn test_context_follows_tuning() {
        let (session, _rx) = StreamSession::new(2_048_000, 100_000_000);
        session.set_sample_rate(4_096_000);
        session.set_center_frequency(915_000_000);
        let ctx = session.context();
        assert_eq!(ctx.version, CONTEXT_VERSION);
        assert_eq!(ctx.sample_rate, 4_096_000);
        assert_eq!(ctx.center_frequency, 915_000_000);
    }

    #[test]
    fn test_tag() {
        let tag = CorrelationTag::default();
        assert!(tag.get().is_none());
        tag.set("a");
        tag.set("b");
        assert_eq!(tag.get().as_deref(), Some("b"));
    }
}
