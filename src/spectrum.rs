//! Real-input spectral transform over rustfft.
//!
//! Forward maps a real frame of length `N` to `N/2 + 1` complex bins;
//! inverse rebuilds the full spectrum by conjugate symmetry and scales by
//! `1/N`, making it the exact algebraic inverse up to float precision.
//! Plans and scratch are built once per frame size and reused.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

pub struct SpectralTransform {
    size: usize,
    fft_forward: Arc<dyn Fft<f32>>,
    fft_inverse: Arc<dyn Fft<f32>>,
    work: Vec<Complex<f32>>,
    fwd_scratch: Vec<Complex<f32>>,
    inv_scratch: Vec<Complex<f32>>,
}

impl SpectralTransform {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft_forward = planner.plan_fft_forward(size);
        let fft_inverse = planner.plan_fft_inverse(size);
        let fwd_scratch = vec![Complex::new(0.0, 0.0); fft_forward.get_inplace_scratch_len()];
        let inv_scratch = vec![Complex::new(0.0, 0.0); fft_inverse.get_inplace_scratch_len()];
        Self {
            size,
            fft_forward,
            fft_inverse,
            work: vec![Complex::new(0.0, 0.0); size],
            fwd_scratch,
            inv_scratch,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn num_bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Forward transform of a windowed real frame into `N/2 + 1` bins.
    pub fn forward(&mut self, frame: &[f32], bins: &mut [Complex<f32>]) {
        debug_assert_eq!(frame.len(), self.size);
        debug_assert_eq!(bins.len(), self.num_bins());
        for (w, &s) in self.work.iter_mut().zip(frame) {
            *w = Complex::new(s, 0.0);
        }
        self.fft_forward
            .process_with_scratch(&mut self.work, &mut self.fwd_scratch);
        bins.copy_from_slice(&self.work[..self.num_bins()]);
    }

    /// Inverse transform back to a real frame.
    pub fn inverse(&mut self, bins: &[Complex<f32>], frame: &mut [f32]) {
        debug_assert_eq!(bins.len(), self.num_bins());
        debug_assert_eq!(frame.len(), self.size);
        let half = self.size / 2;
        // DC and Nyquist bins carry no imaginary part for a real signal.
        self.work[0] = Complex::new(bins[0].re, 0.0);
        self.work[half] = Complex::new(bins[half].re, 0.0);
        for i in 1..half {
            self.work[i] = bins[i];
            self.work[self.size - i] = bins[i].conj();
        }
        self.fft_inverse
            .process_with_scratch(&mut self.work, &mut self.inv_scratch);
        let scale = 1.0 / self.size as f32;
        for (s, w) in frame.iter_mut().zip(&self.work) {
            *s = w.re * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip_reconstructs_frame() {
        let size = 512;
        let mut transform = SpectralTransform::new(size);
        let frame: Vec<f32> = (0..size)
            .map(|i| {
                let t = i as f32 / size as f32;
                (2.0 * std::f32::consts::PI * 13.0 * t).sin() * 0.6
                    + (2.0 * std::f32::consts::PI * 61.0 * t).cos() * 0.3
            })
            .collect();

        let mut bins = vec![Complex::new(0.0, 0.0); transform.num_bins()];
        let mut out = vec![0.0; size];
        transform.forward(&frame, &mut bins);
        transform.inverse(&bins, &mut out);

        for (a, b) in frame.iter().zip(&out) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
    }

    #[test]
    fn pure_tone_lands_in_one_bin() {
        let size = 256;
        let mut transform = SpectralTransform::new(size);
        let frame: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * 16.0 * i as f32 / size as f32).cos())
            .collect();

        let mut bins = vec![Complex::new(0.0, 0.0); transform.num_bins()];
        transform.forward(&frame, &mut bins);

        let mags: Vec<f32> = bins.iter().map(|c| c.norm()).collect();
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 16);
        // A bin-centered cosine leaks nothing into its neighbors.
        assert!(mags[14] < 1e-3 * mags[16]);
    }
}
