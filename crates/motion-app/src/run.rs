//! Detection run: wire the MJPEG reader to a detector and report verdicts.

use anyhow::{Context, Result};
use clap::Parser;
use motion_core::{enumerate_devices, MotionDetector};
use tracing::{debug, info, warn};
use video_ingest::spawn_mjpeg_reader;

use crate::cli::{AppCli, RunConfig};

pub fn run() -> Result<()> {
    let cli = AppCli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();

    if cli.list_devices {
        list_devices();
        return Ok(());
    }

    let config = RunConfig::try_from(cli)?;
    detect_stream(config)
}

fn list_devices() {
    let devices = enumerate_devices();
    println!("{} compute device(s) visible:", devices.len());
    for (index, device) in devices.iter().enumerate() {
        println!(
            "  [{index}] {:?}/{:?}  {}",
            device.platform, device.kind, device.name
        );
    }
}

fn detect_stream(config: RunConfig) -> Result<()> {
    let mut detector = MotionDetector::new(
        config.video,
        config.motion,
        config.device,
        Some(Box::new(std::io::stderr())),
    )
    .with_context(|| "failed to construct the motion detector")?;
    info!(device = detector.device_name(), "detector ready");

    let frames = spawn_mjpeg_reader(&config.source)
        .with_context(|| format!("failed to open MJPEG source {:?}", config.source))?;

    let mut total = 0u64;
    let mut detected = 0u64;
    for message in frames {
        let frame = message.with_context(|| "MJPEG source failed mid-stream")?;
        total += 1;

        match detector.detect_on_frame(&frame.data) {
            Ok(true) => {
                detected += 1;
                info!(frame = total, timestamp_ms = frame.timestamp_ms, "motion detected");
            }
            Ok(false) => debug!(frame = total, "no motion"),
            Err(err) => {
                // Decode hiccups skip the frame; anything else is fatal.
                if matches!(err, motion_core::MotionError::Decode(_)) {
                    warn!(frame = total, "skipping undecodable frame: {err}");
                    continue;
                }
                return Err(err).with_context(|| format!("detection failed on frame {total}"));
            }
        }
    }

    info!(total, detected, "stream drained");
    Ok(())
}
