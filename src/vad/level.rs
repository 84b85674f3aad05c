//! Level meter: loudness of a frame of recent samples.

/// Number of recent samples the meter looks at per reading.
pub const LEVEL_FRAME_SAMPLES: usize = 2048;

/// Root-mean-square loudness of a frame of samples in [-1, 1].
///
/// An empty frame reads 0.0.
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = frame.iter().map(|s| s * s).sum();
    (sum_sq / frame.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_reads_zero() {
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn digital_silence_reads_zero() {
        assert_eq!(rms(&[0.0; 2048]), 0.0);
    }

    #[test]
    fn full_scale_square_wave_reads_one() {
        let frame: Vec<f32> = (0..2048).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        assert!((rms(&frame) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn constant_half_scale_reads_half() {
        assert!((rms(&[0.5; 1024]) - 0.5).abs() < 1e-6);
    }
}
