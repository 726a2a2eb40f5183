//! CLI argument parsing and translation into detector settings.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, ValueEnum};
use motion_core::{
    DecompMethod, DeviceConfig, FrameFormat, InputVideoSettings, MotionConfig,
};

/// Command-line surface of the motion detection binary.
#[derive(Debug, Parser)]
#[command(
    name = "motion-app",
    version,
    about = "Detects motion on an MJPEG stream using a compute device"
)]
pub struct AppCli {
    /// MJPEG stream (or single JPEG) to analyse.
    #[arg(long = "source", value_name = "PATH")]
    pub source: Option<PathBuf>,
    /// Stream width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<u32>,
    /// Stream height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<u32>,
    /// Pixel format the decoder should produce.
    #[arg(long = "format", value_enum, default_value = "rgb")]
    pub format: FormatArg,
    /// Gaussian blur radius (0 disables blurring).
    #[arg(long = "gaussian-size", value_name = "N", default_value_t = 1)]
    pub gaussian_size: u32,
    /// Downscale denominator.
    #[arg(long = "scale", value_name = "K", default_value_t = 1)]
    pub scale_denominator: u32,
    /// Frames averaged into the stabilized background.
    #[arg(long = "bg-frames", value_name = "N", default_value_t = 10)]
    pub bg_frames: u32,
    /// Frames averaged into the stabilized movement.
    #[arg(long = "mvt-frames", value_name = "N", default_value_t = 5)]
    pub mvt_frames: u32,
    /// Minimum per-pixel difference counted as a change (0-255).
    #[arg(long = "pixel-diff", value_name = "P", default_value_t = 5)]
    pub pixel_diff: u8,
    /// Fraction of pixels that must change for a motion verdict (0-1).
    #[arg(long = "min-changed", value_name = "F", default_value_t = 0.5)]
    pub min_changed: f32,
    /// Use the fast JPEG decompression method.
    #[arg(long = "fast-decode", action = clap::ArgAction::SetTrue)]
    pub fast_decode: bool,
    /// Compute device: "cpu", "gpu", or a numeric device index.
    #[arg(long = "device", value_name = "DEV", default_value = "cpu")]
    pub device: String,
    /// List visible compute devices and exit.
    #[arg(long = "list-devices", action = clap::ArgAction::SetTrue)]
    pub list_devices: bool,
    /// Emit per-frame debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

/// Pixel formats accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Gray,
    Rgb,
}

impl From<FormatArg> for FrameFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Gray => FrameFormat::Gray,
            FormatArg::Rgb => FrameFormat::Rgb,
        }
    }
}

/// Everything a detection run needs, validated and ready to use.
#[derive(Debug)]
pub struct RunConfig {
    pub source: PathBuf,
    pub video: InputVideoSettings,
    pub motion: MotionConfig,
    pub device: DeviceConfig,
    pub verbose: bool,
}

impl TryFrom<AppCli> for RunConfig {
    type Error = anyhow::Error;

    fn try_from(cli: AppCli) -> Result<Self> {
        let source = cli
            .source
            .ok_or_else(|| anyhow!("Missing source. Provide --source <path>."))?;
        let width = cli
            .width
            .ok_or_else(|| anyhow!("Missing width. Provide --width <px>."))?;
        let height = cli
            .height
            .ok_or_else(|| anyhow!("Missing height. Provide --height <px>."))?;
        if width == 0 || height == 0 {
            bail!("Stream width and height must be positive");
        }

        let video = InputVideoSettings {
            width,
            height,
            frame_format: cli.format.into(),
        };
        let motion = MotionConfig {
            gaussian_size: cli.gaussian_size,
            scale_denominator: cli.scale_denominator,
            bg_stabil_length: cli.bg_frames,
            motion_stabil_length: cli.mvt_frames,
            min_pixel_diff: cli.pixel_diff,
            min_changed_pixels: cli.min_changed,
            decomp_method: if cli.fast_decode {
                DecompMethod::Fast
            } else {
                DecompMethod::Accurate
            },
        };
        let device = parse_device(&cli.device)?;

        Ok(Self {
            source,
            video,
            motion,
            device,
            verbose: cli.verbose,
        })
    }
}

fn parse_device(value: &str) -> Result<DeviceConfig> {
    match value.to_ascii_lowercase().as_str() {
        "cpu" => Ok(DeviceConfig::Cpu),
        "gpu" => Ok(DeviceConfig::Gpu),
        other => other
            .parse::<usize>()
            .map(DeviceConfig::Specific)
            .map_err(|_| anyhow!("--device must be \"cpu\", \"gpu\", or a device index")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppCli {
        AppCli::try_parse_from(args).unwrap()
    }

    #[test]
    fn builds_a_run_config_from_flags() {
        let cli = parse(&[
            "motion-app",
            "--source",
            "cam.mjpeg",
            "--width",
            "640",
            "--height",
            "480",
            "--format",
            "gray",
            "--device",
            "2",
        ]);
        let config = RunConfig::try_from(cli).unwrap();
        assert_eq!(config.video.width, 640);
        assert_eq!(config.video.frame_format, FrameFormat::Gray);
        assert_eq!(config.device, DeviceConfig::Specific(2));
        assert_eq!(config.motion.bg_stabil_length, 10);
    }

    #[test]
    fn missing_dimensions_are_reported() {
        let cli = parse(&["motion-app", "--source", "cam.mjpeg"]);
        assert!(RunConfig::try_from(cli).is_err());
    }

    #[test]
    fn device_strings_resolve() {
        assert_eq!(parse_device("cpu").unwrap(), DeviceConfig::Cpu);
        assert_eq!(parse_device("GPU").unwrap(), DeviceConfig::Gpu);
        assert_eq!(parse_device("3").unwrap(), DeviceConfig::Specific(3));
        assert!(parse_device("tpu").is_err());
    }
}
