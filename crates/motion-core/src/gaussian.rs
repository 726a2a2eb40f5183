//! 1-D Gaussian kernels for the separable blur.

use crate::error::{MotionError, Result};

/// Builds the normalized Gaussian of odd length `2 * size + 1` with sigma 1.
///
/// `size` 0 yields the identity kernel `[1.0]`.
pub fn generate(size: u32) -> Vec<f64> {
    let kernel_len = (2 * size + 1) as usize;
    let sigma = 1.0f64;
    let center = (kernel_len / 2) as i64;

    let mut kernel = Vec::with_capacity(kernel_len);
    for i in 0..kernel_len {
        let distance = i as i64 - center;
        kernel.push((-((distance * distance) as f64) / (2.0 * sigma * sigma)).exp());
    }

    let sum: f64 = kernel.iter().sum();
    for weight in &mut kernel {
        *weight /= sum;
    }
    kernel
}

/// Stretches a kernel by `factor`: every weight is repeated `factor` times
/// and divided by `factor`, so the sum stays 1 while the support widens to
/// cover the pixels collapsed by downscaling.
pub fn scale(kernel: &[f64], factor: u32) -> Result<Vec<f64>> {
    if factor == 0 {
        return Err(MotionError::InvalidArgument(
            "scale denominator cannot be 0".into(),
        ));
    }

    let mut scaled = Vec::with_capacity(kernel.len() * factor as usize);
    for &weight in kernel {
        scaled.extend(std::iter::repeat(weight / f64::from(factor)).take(factor as usize));
    }
    Ok(scaled)
}
