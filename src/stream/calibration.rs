//! DC calibration sequence, run before every streaming session
//!
//! Steps run in a fixed order and the first failure aborts the attempt.
//! Both paths are disabled on every exit path that does not reach the end
//! of the sequence.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::error::{CalibrationError, HardwareError};
use crate::hardware::{
    DcCalModule, LpfMode, Module, RadioHardware, SampleFormat, SyncConfig,
};

/// One step of the calibration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    /// The calibration routines loop signal through TX, so it must be on
    EnableTx,
    EnableRx,
    LpfTuning,
    TxLpf,
    RxLpf,
    RxVga2,
    /// RX low-pass back to normal (non-bypass) mode
    RxLpfMode,
    /// Block-mode transfer setup
    SyncConfig,
}

impl CalibrationStep {
    /// Order in which the steps run
    pub const SEQUENCE: [CalibrationStep; 8] = [
        CalibrationStep::EnableTx,
        CalibrationStep::EnableRx,
        CalibrationStep::LpfTuning,
        CalibrationStep::TxLpf,
        CalibrationStep::RxLpf,
        CalibrationStep::RxVga2,
        CalibrationStep::RxLpfMode,
        CalibrationStep::SyncConfig,
    ];

    fn execute(self, hw: &dyn RadioHardware, stream: &StreamConfig) -> Result<(), HardwareError> {
        match self {
            CalibrationStep::EnableTx => hw.enable_module(Module::Tx, true),
            CalibrationStep::EnableRx => hw.enable_module(Module::Rx, true),
            CalibrationStep::LpfTuning => hw.calibrate_dc(DcCalModule::LpfTuning),
            CalibrationStep::TxLpf => hw.calibrate_dc(DcCalModule::TxLpf),
            CalibrationStep::RxLpf => hw.calibrate_dc(DcCalModule::RxLpf),
            CalibrationStep::RxVga2 => hw.calibrate_dc(DcCalModule::RxVga2),
            CalibrationStep::RxLpfMode => hw.set_lpf_mode(Module::Rx, LpfMode::Normal),
            CalibrationStep::SyncConfig => hw.sync_config(&sync_config(stream)),
        }
    }
}

impl fmt::Display for CalibrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CalibrationStep::EnableTx => "enable TX",
            CalibrationStep::EnableRx => "enable RX",
            CalibrationStep::LpfTuning => "LPF tuning calibration",
            CalibrationStep::TxLpf => "TX LPF calibration",
            CalibrationStep::RxLpf => "RX LPF calibration",
            CalibrationStep::RxVga2 => "RX VGA2 calibration",
            CalibrationStep::RxLpfMode => "RX LPF normal mode",
            CalibrationStep::SyncConfig => "transfer configuration",
        };
        f.write_str(s)
    }
}

/// Transfer-subsystem parameters for RX block mode with metadata
pub fn sync_config(stream: &StreamConfig) -> SyncConfig {
    SyncConfig {
        module: Module::Rx,
        format: SampleFormat::Sc16Q11Meta,
        num_buffers: stream.num_buffers,
        buffer_size: stream.buffer_size,
        num_transfers: stream.num_transfers,
        timeout_ms: stream.stream_timeout_ms,
    }
}

/// Disables both paths when dropped while armed
struct PathGuard<'a> {
    hw: &'a dyn RadioHardware,
    armed: bool,
}

impl<'a> PathGuard<'a> {
    fn new(hw: &'a dyn RadioHardware) -> Self {
        Self { hw, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for module in [Module::Tx, Module::Rx] {
            if let Err(e) = self.hw.enable_module(module, false) {
                warn!("Failed to disable {} after aborted calibration: {}", module, e);
            }
        }
    }
}

/// Run the full calibration sequence.
///
/// On success RX is enabled and TX, only needed for the loopback, is
/// switched off again.
pub fn calibrate(hw: &dyn RadioHardware, stream: &StreamConfig) -> Result<(), CalibrationError> {
    let guard = PathGuard::new(hw);

    for step in CalibrationStep::SEQUENCE {
        debug!("Calibration: {}", step);
        if let Err(source) = step.execute(hw, stream) {
            error!("Calibration failed at {}: {}", step, source);
            return Err(CalibrationError { step, source });
        }
    }

    guard.disarm();

    if let Err(e) = hw.enable_module(Module::Tx, false) {
        warn!("Failed to disable TX after calibration: {}", e);
    }

    info!("Calibration complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HwStatus;
    use crate::hardware::sim::{Fault, HwCall, SimulatedRadio};

    #[test]
    fn test_full_sequence_order() {
        let radio = SimulatedRadio::new("sim0");
        let stream = StreamConfig::default();
        calibrate(&radio, &stream).unwrap();

        assert_eq!(
            radio.calls(),
            vec![
                HwCall::EnableModule(Module::Tx, true),
                HwCall::EnableModule(Module::Rx, true),
                HwCall::CalibrateDc(DcCalModule::LpfTuning),
                HwCall::CalibrateDc(DcCalModule::TxLpf),
                HwCall::CalibrateDc(DcCalModule::RxLpf),
                HwCall::CalibrateDc(DcCalModule::RxVga2),
                HwCall::SetLpfMode(Module::Rx, LpfMode::Normal),
                HwCall::SyncConfig(sync_config(&stream)),
                HwCall::EnableModule(Module::Tx, false),
            ]
        );
        assert!(radio.is_enabled(Module::Rx));
        assert!(!radio.is_enabled(Module::Tx));
    }

    fn fault_for(step: CalibrationStep) -> Fault {
        match step {
            CalibrationStep::EnableTx => Fault::Enable(Module::Tx),
            CalibrationStep::EnableRx => Fault::Enable(Module::Rx),
            CalibrationStep::LpfTuning => Fault::Calibrate(DcCalModule::LpfTuning),
            CalibrationStep::TxLpf => Fault::Calibrate(DcCalModule::TxLpf),
            CalibrationStep::RxLpf => Fault::Calibrate(DcCalModule::RxLpf),
            CalibrationStep::RxVga2 => Fault::Calibrate(DcCalModule::RxVga2),
            CalibrationStep::RxLpfMode => Fault::LpfMode,
            CalibrationStep::SyncConfig => Fault::SyncConfig,
        }
    }

    fn call_for(step: CalibrationStep, stream: &StreamConfig) -> HwCall {
        match step {
            CalibrationStep::EnableTx => HwCall::EnableModule(Module::Tx, true),
            CalibrationStep::EnableRx => HwCall::EnableModule(Module::Rx, true),
            CalibrationStep::LpfTuning => HwCall::CalibrateDc(DcCalModule::LpfTuning),
            CalibrationStep::TxLpf => HwCall::CalibrateDc(DcCalModule::TxLpf),
            CalibrationStep::RxLpf => HwCall::CalibrateDc(DcCalModule::RxLpf),
            CalibrationStep::RxVga2 => HwCall::CalibrateDc(DcCalModule::RxVga2),
            CalibrationStep::RxLpfMode => HwCall::SetLpfMode(Module::Rx, LpfMode::Normal),
            CalibrationStep::SyncConfig => HwCall::SyncConfig(sync_config(stream)),
        }
    }

    #[test]
    fn test_fault_at_every_step_stops_there() {
        let stream = StreamConfig::default();

        for (k, &failing) in CalibrationStep::SEQUENCE.iter().enumerate() {
            let radio = SimulatedRadio::new("sim0");
            radio.inject_fault(fault_for(failing), HwStatus::IO);

            let err = calibrate(&radio, &stream).unwrap_err();
            assert_eq!(err.step, failing);

            // Steps up to and including the failing one, then both paths off
            let mut expected: Vec<HwCall> = CalibrationStep::SEQUENCE[..=k]
                .iter()
                .map(|&step| call_for(step, &stream))
                .collect();
            expected.push(HwCall::EnableModule(Module::Tx, false));
            expected.push(HwCall::EnableModule(Module::Rx, false));

            assert_eq!(radio.calls(), expected, "fault at {}", failing);
            assert!(!radio.is_enabled(Module::Tx), "TX left on after {}", failing);
            assert!(!radio.is_enabled(Module::Rx), "RX left on after {}", failing);
        }
    }

    #[test]
    fn test_fault_stops_sequence_and_disables_paths() {
        let radio = SimulatedRadio::new("sim0");
        radio.inject_fault(Fault::Calibrate(DcCalModule::TxLpf), HwStatus::IO);

        let err = calibrate(&radio, &StreamConfig::default()).unwrap_err();
        assert_eq!(err.step, CalibrationStep::TxLpf);
        assert_eq!(err.source.status, HwStatus::IO);

        let calls = radio.calls();
        assert!(!calls.contains(&HwCall::CalibrateDc(DcCalModule::RxLpf)));
        assert!(!calls.iter().any(|c| matches!(c, HwCall::SyncConfig(_))));
        assert_eq!(
            &calls[calls.len() - 2..],
            &[
                HwCall::EnableModule(Module::Tx, false),
                HwCall::EnableModule(Module::Rx, false),
            ]
        );
        assert!(!radio.is_enabled(Module::Tx));
        assert!(!radio.is_enabled(Module::Rx));
    }

    #[test]
    fn test_sync_config_failure_is_fatal() {
        let radio = SimulatedRadio::new("sim0");
        radio.inject_fault(Fault::SyncConfig, HwStatus::INVAL);

        let err = calibrate(&radio, &StreamConfig::default()).unwrap_err();
        assert_eq!(err.step, CalibrationStep::SyncConfig);
        assert!(!radio.is_enabled(Module::Rx));
    }

    #[test]
    fn test_enable_tx_failure_is_first_step() {
        let radio = SimulatedRadio::new("sim0");
        radio.inject_fault(Fault::Enable(Module::Tx), HwStatus::IO);

        let err = calibrate(&radio, &StreamConfig::default()).unwrap_err();
        assert_eq!(err.step, CalibrationStep::EnableTx);
        assert!(!radio
            .calls()
            .contains(&HwCall::EnableModule(Module::Rx, true)));
    }
}
