//! bladeRF RX demo
//!
//! Opens every radio, streams from device 0 for a while and prints what
//! arrived at the sink. Without the `bladerf` feature a simulated radio
//! producing a tone with a DC offset stands in for the hardware.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use bladerf_rx::hardware::HardwareBackend;
use bladerf_rx::{ChannelSink, Driver, DriverConfig, StreamState};

const DEVICE: usize = 0;

#[cfg(feature = "bladerf")]
fn backend(config: &DriverConfig) -> Box<dyn HardwareBackend> {
    Box::new(bladerf_rx::hardware::bladerf::BladerfBackend::new(
        config.fpga_image_dir.clone(),
    ))
}

#[cfg(not(feature = "bladerf"))]
fn backend(_config: &DriverConfig) -> Box<dyn HardwareBackend> {
    use bladerf_rx::hardware::sim::{SimulatedRadio, Waveform};
    use bladerf_rx::hardware::RadioHardware;

    let radio = SimulatedRadio::new("SIM-0001");
    radio.set_waveform(Waveform::Tone {
        dc: (300, -200),
        amplitude: 1000.0,
        frequency: 0.01,
    });
    Box::new(move || vec![Arc::new(radio.clone()) as Arc<dyn RadioHardware>])
}

fn main() -> Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("===========================================");
    info!("   bladeRF RX");
    info!("===========================================");

    let mut config = DriverConfig::from_env();
    if let Ok(params) = std::env::var("BLADERF_RX_INIT_PARAMS") {
        config
            .apply_init_params(&params)
            .context("Invalid BLADERF_RX_INIT_PARAMS")?;
    }
    let run_for = Duration::from_secs(
        std::env::var("BLADERF_RX_RUN_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5),
    );

    let (sink, blocks) = ChannelSink::bounded(64);
    let backend = backend(&config);
    let driver = Driver::init(backend.as_ref(), Arc::new(sink), config)
        .context("Failed to initialise driver")?;

    for device in 0..driver.board_count() {
        info!(
            "Board {}: {} serial {}",
            device,
            driver.hardware_name(device)?,
            driver.serial_number(device)?
        );
    }

    driver.set_board_uuid(DEVICE, "demo-rx-0")?;
    if let Some(hz) = std::env::var("BLADERF_RX_FREQUENCY_HZ")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        driver
            .set_rx_center_frequency(DEVICE, hz)
            .with_context(|| format!("Cannot tune to {} Hz", hz))?;
    }

    // Consumer: print a running summary of what the sink received
    let consumer = thread::Builder::new()
        .name("sink-consumer".to_string())
        .spawn(move || {
            let mut count = 0u64;
            let mut samples = 0u64;
            let mut last_report = Instant::now();
            loop {
                match blocks.recv_timeout(Duration::from_millis(500)) {
                    Ok(delivered) => {
                        count += 1;
                        samples += delivered.block.len() as u64;
                        if last_report.elapsed() >= Duration::from_secs(1) {
                            let s = delivered.block.samples();
                            let mean = s.iter().sum::<num_complex::Complex32>()
                                / s.len().max(1) as f32;
                            info!(
                                "[Sink] {} blocks, {} samples, tag {}, {:.3} MHz, block mean {:.4}{:+.4}i",
                                count,
                                samples,
                                delivered.tag.as_deref().unwrap_or("-"),
                                delivered.context.center_frequency as f64 / 1e6,
                                mean.re,
                                mean.im
                            );
                            last_report = Instant::now();
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            (count, samples)
        })
        .context("Failed to spawn consumer thread")?;

    driver.prepare_rx_engine(DEVICE)?;
    if !driver.wait_for_state(DEVICE, StreamState::Streaming, Duration::from_secs(10))? {
        let stats = driver.stats(DEVICE)?;
        bail!(
            "Device {} did not start streaming ({} calibration failure(s))",
            DEVICE,
            stats.calibration_failures
        );
    }

    info!("Streaming for {:?}...", run_for);
    thread::sleep(run_for);

    driver.finalize_rx_engine(DEVICE)?;
    if !driver.wait_for_state(DEVICE, StreamState::Idle, Duration::from_secs(10))? {
        warn!("Device {} did not return to idle", DEVICE);
    }

    let stats = driver.stats(DEVICE)?;
    info!("Stats: {:?}", stats);

    // Dropping the driver drops the sink and closes the consumer's channel
    drop(driver);
    match consumer.join() {
        Ok((count, samples)) => info!(
            "Shutdown complete. Blocks received: {}, samples: {}",
            count, samples
        ),
        Err(_) => warn!("Consumer thread panicked"),
    }
    Ok(())
}
