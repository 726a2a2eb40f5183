//! The pipeline's kernel sources, embedded at compile time.
//!
//! Argument order is the contract between the orchestrator and every
//! backend; see the comment block at the top of each `.cu` file.

use crate::port::KernelSource;

pub const BLUR_AND_SCALE_VERTICAL: &str = "blur_and_scale_vertical";
pub const BLUR_AND_SCALE_HORIZONTAL: &str = "blur_and_scale_horizontal";
pub const STABILIZE_BG_MVT: &str = "stabilize_bg_mvt";

pub const ALL_NAMES: [&str; 3] = [
    BLUR_AND_SCALE_VERTICAL,
    BLUR_AND_SCALE_HORIZONTAL,
    STABILIZE_BG_MVT,
];

/// Vertical Gaussian blur + downscale with luma reduction.
pub fn blur_and_scale_vertical() -> KernelSource {
    KernelSource {
        name: BLUR_AND_SCALE_VERTICAL,
        source: include_str!("kernels/blur_and_scale_vertical.cu"),
    }
}

/// Horizontal Gaussian blur + downscale over the intermediate frame.
pub fn blur_and_scale_horizontal() -> KernelSource {
    KernelSource {
        name: BLUR_AND_SCALE_HORIZONTAL,
        source: include_str!("kernels/blur_and_scale_horizontal.cu"),
    }
}

/// Reservoir update and per-pixel difference mask.
pub fn stabilize_bg_mvt() -> KernelSource {
    KernelSource {
        name: STABILIZE_BG_MVT,
        source: include_str!("kernels/stabilize_bg_mvt.cu"),
    }
}

/// Every kernel the pipeline builds at startup.
pub fn all() -> [KernelSource; 3] {
    [
        blur_and_scale_vertical(),
        blur_and_scale_horizontal(),
        stabilize_bg_mvt(),
    ]
}
