use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Analysis window applied before the forward transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Periodic Hann; overlap-adds to a constant at any hop `N / k` with `k >= 2`.
    #[default]
    Hann,
    Rectangular,
}

impl WindowKind {
    pub fn coefficients(self, size: usize) -> Vec<f32> {
        match self {
            WindowKind::Hann => hann_window(size),
            WindowKind::Rectangular => vec![1.0; size],
        }
    }

    /// Fail unless frames of `size` spaced `hop` apart overlap-add to a
    /// constant under this window.
    pub fn check_overlap_add(self, size: usize, hop: usize) -> Result<(), ConfigError> {
        if hop == 0 || size % hop != 0 {
            return Err(ConfigError::HopNotDivisor { hop, fft_size: size });
        }
        if self == WindowKind::Hann && hop > size / 2 {
            return Err(ConfigError::NoOverlap { hop, fft_size: size });
        }
        Ok(())
    }
}

/// Magnitude and phase of the non-negative frequency bins of one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralFrame {
    pub magnitudes: Vec<f32>,
    /// Radians in (-pi, pi]. Bins with an exactly-zero coefficient report 0.
    pub phases: Vec<f32>,
}

impl SpectralFrame {
    pub fn silent(bins: usize) -> Self {
        Self {
            magnitudes: vec![0.0; bins],
            phases: vec![0.0; bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.magnitudes.len()
    }
}

/// Fixed-size real FFT with preplanned forward and inverse passes.
///
/// All buffers are sized at construction; the `_into` variants do not
/// allocate.
pub struct SpectralTransform {
    size: usize,
    kind: WindowKind,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralTransform {
    pub fn new(size: usize, kind: WindowKind) -> Result<Self, ConfigError> {
        if size == 0 || size % 2 != 0 {
            return Err(ConfigError::InvalidFftSize(size));
        }

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        Ok(Self {
            size,
            kind,
            window: kind.coefficients(size),
            forward,
            inverse,
            buffer: vec![Complex::new(0.0, 0.0); size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of bins in a spectral frame: `size / 2 + 1`.
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    pub fn window_kind(&self) -> WindowKind {
        self.kind
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.size as f32
    }

    #[allow(dead_code)]
    pub fn forward(&mut self, window: &[f32]) -> Result<SpectralFrame, ConfigError> {
        let mut frame = SpectralFrame::silent(self.bins());
        self.forward_into(window, &mut frame)?;
        Ok(frame)
    }

    pub fn forward_into(
        &mut self,
        window: &[f32],
        frame: &mut SpectralFrame,
    ) -> Result<(), ConfigError> {
        if window.len() != self.size {
            return Err(ConfigError::length("analysis window", self.size, window.len()));
        }
        self.check_frame("spectral frame", frame.magnitudes.len(), frame.phases.len())?;

        for ((dst, &sample), &w) in self.buffer.iter_mut().zip(window).zip(&self.window) {
            *dst = Complex::new(sample * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = self.bins();
        for (i, c) in self.buffer[..bins].iter().enumerate() {
            frame.magnitudes[i] = c.norm();
            frame.phases[i] = phase_of(*c);
        }
        Ok(())
    }

    /// Rebuild a time-domain frame from a half spectrum.
    ///
    /// The result is the *windowed* frame: `inverse(forward(x)) == w * x`,
    /// which is exactly `x` for [`WindowKind::Rectangular`].
    #[allow(dead_code)]
    pub fn inverse(&mut self, magnitudes: &[f32], phases: &[f32]) -> Result<Vec<f32>, ConfigError> {
        let mut out = vec![0.0; self.size];
        self.inverse_into(magnitudes, phases, &mut out)?;
        Ok(out)
    }

    pub fn inverse_into(
        &mut self,
        magnitudes: &[f32],
        phases: &[f32],
        out: &mut [f32],
    ) -> Result<(), ConfigError> {
        self.check_frame("synthesis spectrum", magnitudes.len(), phases.len())?;
        if out.len() != self.size {
            return Err(ConfigError::length("synthesis frame", self.size, out.len()));
        }

        let n = self.size;
        let half = n / 2;
        for k in 0..=half {
            self.buffer[k] = Complex::from_polar(magnitudes[k], phases[k]);
        }
        // DC and Nyquist are real for a real signal.
        self.buffer[0].im = 0.0;
        self.buffer[half].im = 0.0;
        for k in 1..half {
            self.buffer[n - k] = self.buffer[k].conj();
        }

        self.inverse
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / n as f32;
        for (dst, c) in out.iter_mut().zip(&self.buffer) {
            *dst = c.re * scale;
        }
        Ok(())
    }

    fn check_frame(
        &self,
        what: &'static str,
        mags: usize,
        phases: usize,
    ) -> Result<(), ConfigError> {
        let bins = self.bins();
        if mags != bins {
            return Err(ConfigError::length(what, bins, mags));
        }
        if phases != bins {
            return Err(ConfigError::length(what, bins, phases));
        }
        Ok(())
    }
}

fn phase_of(c: Complex<f32>) -> f32 {
    if c.re == 0.0 && c.im == 0.0 {
        return 0.0;
    }
    let phase = c.arg();
    if phase <= -PI {
        PI
    } else {
        phase
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn silent_input_has_zero_spectrum() {
        let mut fft = SpectralTransform::new(4, WindowKind::Hann).unwrap();
        let frame = fft.forward(&[0.0; 4]).unwrap();
        assert_eq!(frame.magnitudes, vec![0.0; 3]);
        assert_eq!(frame.phases, vec![0.0; 3]);
    }

    #[test]
    fn rejects_bad_sizes() {
        assert_eq!(
            SpectralTransform::new(0, WindowKind::Hann).err(),
            Some(ConfigError::InvalidFftSize(0))
        );
        assert!(SpectralTransform::new(7, WindowKind::Rectangular).is_err());
    }

    #[test]
    fn rejects_wrong_lengths() {
        let mut fft = SpectralTransform::new(8, WindowKind::Hann).unwrap();
        assert!(matches!(
            fft.forward(&[0.0; 6]),
            Err(ConfigError::LengthMismatch { expected: 8, actual: 6, .. })
        ));
        assert!(fft.inverse(&[0.0; 4], &[0.0; 5]).is_err());
        assert!(fft.inverse(&[0.0; 5], &[0.0; 4]).is_err());
    }

    #[test]
    fn sine_peaks_in_its_bin() {
        let n = 64;
        let bin = 8;
        let mut fft = SpectralTransform::new(n, WindowKind::Rectangular).unwrap();
        let signal: Vec<f32> = (0..n)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / n as f32).sin())
            .collect();

        let frame = fft.forward(&signal).unwrap();
        assert_eq!(frame.bins(), n / 2 + 1);
        assert!((frame.magnitudes[bin] - n as f32 / 2.0).abs() < 1e-3);
        assert!((frame.phases[bin] + PI / 2.0).abs() < 1e-3);
        for (i, &m) in frame.magnitudes.iter().enumerate() {
            if i != bin {
                assert!(m < 1e-3, "leakage in bin {}: {}", i, m);
            }
        }
    }

    #[test]
    fn bin_frequency_scales_with_sample_rate() {
        let fft = SpectralTransform::new(1024, WindowKind::Hann).unwrap();
        assert_eq!(fft.bin_frequency(0, 44100), 0.0);
        assert!((fft.bin_frequency(512, 44100) - 22050.0).abs() < 1e-2);
    }

    #[test]
    fn hann_round_trip_returns_windowed_frame() {
        let n = 16;
        let mut fft = SpectralTransform::new(n, WindowKind::Hann).unwrap();
        let signal: Vec<f32> = (0..n).map(|i| (i as f32 * 0.37).cos()).collect();

        let frame = fft.forward(&signal).unwrap();
        let back = fft.inverse(&frame.magnitudes, &frame.phases).unwrap();
        for ((x, w), y) in signal.iter().zip(fft.window()).zip(&back) {
            assert!((x * w - y).abs() < 1e-4);
        }
    }

    #[test]
    fn periodic_hann_overlap_adds_to_one() {
        let n = 32;
        let window = WindowKind::Hann.coefficients(n);
        for i in 0..n / 2 {
            assert!((window[i] + window[i + n / 2] - 1.0).abs() < 1e-6);
        }
    }

    proptest! {
        #[test]
        fn rectangular_round_trip(
            half in 1usize..64,
            ref signal in proptest::collection::vec(-1.0f32..1.0, 128),
        ) {
            let n = half * 2;
            let signal = &signal[..n];
            let mut fft = SpectralTransform::new(n, WindowKind::Rectangular).unwrap();

            let frame = fft.forward(signal).unwrap();
            let back = fft.inverse(&frame.magnitudes, &frame.phases).unwrap();
            for (a, b) in signal.iter().zip(&back) {
                prop_assert!((a - b).abs() < 1e-4, "{} != {}", a, b);
            }
        }
    }
}
