//! Per-channel LAB statistics and the transfer formula.
//!
//! Sums run in f64 over the read-back samples without touching them, so the
//! same buffer can be written out or re-checked afterwards.

use rayon::prelude::*;

use crate::config::DeviationCenter;

/// Below this a source deviation counts as zero and the channel is only shifted.
pub const MIN_STD_DEV: f32 = 1e-6;

/// Mean and sample standard deviation of the L, a, b channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LabStats {
    pub mean: [f32; 3],
    pub std_dev: [f32; 3],
}

impl LabStats {
    /// Statistics of interleaved 4-channel pixels, deviation about their own mean.
    pub fn compute(pixels: &[f32]) -> Self {
        let mean = channel_means(pixels);
        Self::from_parts(mean, channel_std_devs(pixels, mean))
    }

    /// Like [`compute`](Self::compute) but the deviation is measured about `center`.
    pub fn compute_about(pixels: &[f32], center: [f64; 3]) -> Self {
        Self::from_parts(channel_means(pixels), channel_std_devs(pixels, center))
    }

    fn from_parts(mean: [f64; 3], std_dev: [f64; 3]) -> Self {
        Self {
            mean: mean.map(|v| v as f32),
            std_dev: std_dev.map(|v| v as f32),
        }
    }

    pub(crate) fn mean_f64(&self) -> [f64; 3] {
        self.mean.map(f64::from)
    }
}

/// Arithmetic mean of the first three channels of interleaved RGBA-style pixels.
pub fn channel_means(pixels: &[f32]) -> [f64; 3] {
    let n = pixels.len() / 4;
    if n == 0 {
        return [0.0; 3];
    }
    let sum = pixels
        .par_chunks_exact(4)
        .fold(|| [0.0f64; 3], |acc, p| [acc[0] + p[0] as f64, acc[1] + p[1] as f64, acc[2] + p[2] as f64])
        .reduce(|| [0.0f64; 3], add3);
    sum.map(|s| s / n as f64)
}

/// Sample standard deviation (N - 1) about `center`; 0 when fewer than two pixels.
pub fn channel_std_devs(pixels: &[f32], center: [f64; 3]) -> [f64; 3] {
    let n = pixels.len() / 4;
    if n < 2 {
        return [0.0; 3];
    }
    let sq = pixels
        .par_chunks_exact(4)
        .fold(
            || [0.0f64; 3],
            |acc, p| {
                let d = [p[0] as f64 - center[0], p[1] as f64 - center[1], p[2] as f64 - center[2]];
                [acc[0] + d[0] * d[0], acc[1] + d[1] * d[1], acc[2] + d[2] * d[2]]
            },
        )
        .reduce(|| [0.0f64; 3], add3);
    sq.map(|s| (s / (n - 1) as f64).sqrt())
}

#[inline]
fn add3(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Source and target statistics for one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransferStats {
    pub source: LabStats,
    pub target: LabStats,
}

impl TransferStats {
    /// Compute both sides from read-back LAB pixels.
    pub fn compute(source: &[f32], target: &[f32], center: DeviationCenter) -> Self {
        let source = LabStats::compute(source);
        let target = match center {
            DeviationCenter::OwnMean => LabStats::compute(target),
            DeviationCenter::SourceMean => LabStats::compute_about(target, source.mean_f64()),
        };
        Self { source, target }
    }

    /// The twelve floats handed to the transfer kernel:
    /// source std, target std, source mean, target mean (L, a, b each).
    pub fn packed(&self) -> [f32; 12] {
        let mut out = [0.0; 12];
        out[0..3].copy_from_slice(&self.source.std_dev);
        out[3..6].copy_from_slice(&self.target.std_dev);
        out[6..9].copy_from_slice(&self.source.mean);
        out[9..12].copy_from_slice(&self.target.mean);
        out
    }

    /// Per-channel scale `target_std / source_std`, 1 for a flat source channel.
    pub fn scale(&self) -> [f32; 3] {
        std::array::from_fn(|c| {
            let src = self.source.std_dev[c];
            if src <= MIN_STD_DEV {
                1.0
            } else {
                self.target.std_dev[c] / src
            }
        })
    }

    /// `(p - src_mean) * scale + tgt_mean` on one LAB triplet.
    pub fn transfer_pixel(&self, lab: [f32; 3]) -> [f32; 3] {
        let scale = self.scale();
        std::array::from_fn(|c| (lab[c] - self.source.mean[c]) * scale[c] + self.target.mean[c])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn image(values: &[[f32; 3]]) -> Vec<f32> {
        values.iter().flat_map(|v| [v[0], v[1], v[2], 1.0]).collect()
    }

    #[test]
    fn constant_channel_has_zero_deviation() {
        let px = image(&[[42.5, -3.0, 7.25]; 16]);
        let s = LabStats::compute(&px);
        assert_eq!(s.mean, [42.5, -3.0, 7.25]);
        assert_eq!(s.std_dev, [0.0, 0.0, 0.0]);
        assert!(s.std_dev.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn two_by_two_matches_closed_form() {
        let values = [[10.0, 1.0, -4.0], [20.0, 3.0, -2.0], [30.0, 5.0, 0.0], [50.0, 7.0, 10.0]];
        let s = LabStats::compute(&image(&values));

        for c in 0..3 {
            let xs: Vec<f64> = values.iter().map(|v| v[c] as f64).collect();
            let mean = xs.iter().sum::<f64>() / 4.0;
            let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / 3.0;
            assert_abs_diff_eq!(s.mean[c] as f64, mean, epsilon = 1e-5);
            assert_abs_diff_eq!(s.std_dev[c] as f64, var.sqrt(), epsilon = 1e-5);
        }
        // L: mean 27.5, squared deviations 306.25 + 56.25 + 6.25 + 506.25 = 875
        assert_abs_diff_eq!(s.std_dev[0], (875.0f32 / 3.0).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn input_is_not_modified() {
        let px = image(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let copy = px.clone();
        let _ = LabStats::compute(&px);
        assert_eq!(px, copy);
    }

    #[test]
    fn tiny_images() {
        assert_eq!(LabStats::compute(&[]), LabStats::default());
        let one = LabStats::compute(&image(&[[5.0, 6.0, 7.0]]));
        assert_eq!(one.mean, [5.0, 6.0, 7.0]);
        assert_eq!(one.std_dev, [0.0; 3]);
    }

    #[test]
    fn deviation_center_choice() {
        let src = image(&[[0.0, 0.0, 0.0], [2.0, 2.0, 2.0]]);
        let tgt = image(&[[10.0, 10.0, 10.0], [12.0, 12.0, 12.0]]);

        let own = TransferStats::compute(&src, &tgt, DeviationCenter::OwnMean);
        assert_abs_diff_eq!(own.target.std_dev[0], 2.0f32.sqrt(), epsilon = 1e-6);

        // About the source mean (1.0): deviations 9 and 11.
        let legacy = TransferStats::compute(&src, &tgt, DeviationCenter::SourceMean);
        assert_abs_diff_eq!(legacy.target.std_dev[0], (81.0f32 + 121.0).sqrt(), epsilon = 1e-4);
        assert_eq!(legacy.target.mean, own.target.mean);
    }

    #[test]
    fn packed_order() {
        let stats = TransferStats {
            source: LabStats { mean: [7.0, 8.0, 9.0], std_dev: [1.0, 2.0, 3.0] },
            target: LabStats { mean: [10.0, 11.0, 12.0], std_dev: [4.0, 5.0, 6.0] },
        };
        assert_eq!(stats.packed(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn transfer_formula_and_flat_source() {
        let stats = TransferStats {
            source: LabStats { mean: [50.0, 0.0, 0.0], std_dev: [10.0, 0.0, 4.0] },
            target: LabStats { mean: [60.0, 5.0, -5.0], std_dev: [20.0, 3.0, 2.0] },
        };
        let out = stats.transfer_pixel([55.0, 1.0, 8.0]);
        assert_abs_diff_eq!(out[0], 70.0, epsilon = 1e-5);
        // flat source channel: scale 1
        assert_abs_diff_eq!(out[1], 6.0, epsilon = 1e-5);
        assert_abs_diff_eq!(out[2], -1.0, epsilon = 1e-5);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn single_thread_pool_agrees() {
        let px: Vec<f32> = (0..4096).map(|i| ((i * 37) % 101) as f32 * 0.5 - 20.0).collect();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        let serial = pool.install(|| LabStats::compute(&px));
        let parallel = LabStats::compute(&px);
        for c in 0..3 {
            assert_abs_diff_eq!(serial.mean[c], parallel.mean[c], epsilon = 1e-5);
            assert_abs_diff_eq!(serial.std_dev[c], parallel.std_dev[c], epsilon = 1e-5);
        }
    }
}
