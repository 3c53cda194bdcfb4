use rtrb::Producer;

use crate::audio::spectral::SpectralTransform;
use crate::error::ConfigError;

/// Overlap-add resynthesis of one hop at a time into the output queue.
///
/// Unity gain needs the window to overlap-add to a constant at this hop; the
/// analyzer checks [`WindowKind::check_overlap_add`] before enabling resynthesis.
///
/// [`WindowKind::check_overlap_add`]: crate::audio::spectral::WindowKind::check_overlap_add
pub struct Synthesizer {
    producer: Producer<f32>,
    hop: usize,
    frame: Vec<f32>,
    accum: Vec<f32>,
    /// `hop / sum(window)`, undoes the analysis window gain.
    ola_gain: f32,
    overruns: u64,
}

impl Synthesizer {
    pub fn new(
        producer: Producer<f32>,
        transform: &SpectralTransform,
        hop: usize,
    ) -> Result<Self, ConfigError> {
        let size = transform.size();
        if hop == 0 || hop > size {
            return Err(ConfigError::InvalidHopSize { hop, fft_size: size });
        }

        Ok(Self {
            producer,
            hop,
            frame: vec![0.0; size],
            accum: vec![0.0; size],
            ola_gain: ola_gain(transform.window(), hop),
            overruns: 0,
        })
    }

    /// Follow a window change on the transform.
    pub fn retune(&mut self, transform: &SpectralTransform) {
        self.ola_gain = ola_gain(transform.window(), self.hop);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.accum.fill(0.0);
    }

    /// Samples the output queue could not take.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Invert one spectrum, overlap-add it and emit the finished hop.
    pub fn push_hop(
        &mut self,
        transform: &mut SpectralTransform,
        magnitudes: &[f32],
        phases: &[f32],
    ) -> Result<(), ConfigError> {
        transform.inverse_into(magnitudes, phases, &mut self.frame)?;
        for (acc, sample) in self.accum.iter_mut().zip(&self.frame) {
            *acc += sample;
        }

        for &sample in &self.accum[..self.hop] {
            if self.producer.push(sample * self.ola_gain).is_err() {
                self.overruns += 1;
            }
        }

        self.accum.copy_within(self.hop.., 0);
        let tail = self.accum.len() - self.hop;
        self.accum[tail..].fill(0.0);
        Ok(())
    }
}

fn ola_gain(window: &[f32], hop: usize) -> f32 {
    let sum: f32 = window.iter().sum();
    if sum > 0.0 {
        hop as f32 / sum
    } else {
        0.0
    }
}
