use crate::audio::spectral::{SpectralFrame, SpectralTransform, WindowKind};
use crate::audio::waveform::WaveformReader;
use crate::config::check_smoothing;
use crate::error::ConfigError;
use crate::network::Weights;

use super::synthesis::Synthesizer;

/// UI-side half of the pipeline: waveform snapshot -> spectrum -> hidden layer.
///
/// Analysis is hop-driven: every `hop` new input samples produce exactly one
/// spectral frame, independent of how often [`Analyzer::update`] is called.
pub struct Analyzer {
    reader: WaveformReader,
    transform: SpectralTransform,
    weights: Weights,
    synth: Synthesizer,
    resynthesis: bool,
    hop: usize,
    window: Vec<f32>,
    frame: SpectralFrame,
    reconstructed: Vec<f32>,
    activations: Vec<f32>,
    smoothed: Vec<f32>,
    smoothing: f32,
    next_end: u64,
    frames_analyzed: u64,
    dropped_hops: u64,
}

/// What the display reads each frame.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisView<'a> {
    pub magnitudes: &'a [f32],
    pub phases: &'a [f32],
    pub activations: &'a [f32],
    pub smoothed: &'a [f32],
    pub frames_analyzed: u64,
}

impl AnalysisView<'_> {
    /// Index and value of the most active neuron.
    pub fn peak_neuron(&self) -> Option<(usize, f32)> {
        self.activations
            .iter()
            .copied()
            .enumerate()
            .fold(None, |best, (i, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((i, v)),
            })
    }
}

impl Analyzer {
    pub fn new(
        reader: WaveformReader,
        transform: SpectralTransform,
        weights: Weights,
        synth: Synthesizer,
        hop: usize,
        smoothing: f32,
    ) -> Result<Self, ConfigError> {
        let size = transform.size();
        if hop == 0 || hop > size {
            return Err(ConfigError::InvalidHopSize { hop, fft_size: size });
        }
        if reader.capacity() < size {
            return Err(ConfigError::CapacityTooSmall {
                capacity: reader.capacity(),
                fft_size: size,
            });
        }
        weights.expect_visible(transform.bins())?;
        check_smoothing(smoothing)?;

        let bins = transform.bins();
        let n_hidden = weights.n_hidden();
        Ok(Self {
            reader,
            transform,
            weights,
            synth,
            resynthesis: false,
            hop,
            window: vec![0.0; size],
            frame: SpectralFrame::silent(bins),
            reconstructed: vec![0.0; bins],
            activations: vec![0.0; n_hidden],
            smoothed: vec![0.0; n_hidden],
            smoothing,
            next_end: hop as u64,
            frames_analyzed: 0,
            dropped_hops: 0,
        })
    }

    /// Analyse every complete hop that has arrived since the last call.
    ///
    /// Hops whose window has already been overwritten in the ring are skipped.
    pub fn update(&mut self) -> Result<usize, ConfigError> {
        let written = self.reader.written();
        let size = self.transform.size() as u64;
        let hop = self.hop as u64;

        let oldest_end = written
            .saturating_sub(self.reader.capacity() as u64)
            .saturating_add(size);
        if written >= self.reader.capacity() as u64 && self.next_end < oldest_end {
            let skipped = (oldest_end - self.next_end).div_ceil(hop);
            self.next_end += skipped * hop;
            self.dropped_hops += skipped;
            log::warn!("Analysis fell behind, skipped {} hop(s)", skipped);
            if self.resynthesis {
                self.synth.reset();
            }
        }

        let mut hops = 0;
        let mut lost = 0;
        while self.next_end <= written {
            if self.analyze_hop()? {
                hops += 1;
            } else {
                lost += 1;
            }
        }
        if lost > 0 {
            log::warn!("Input overwritten during analysis, skipped {} hop(s)", lost);
        }
        Ok(hops)
    }

    /// Analyse the window ending at `next_end` and advance by one hop.
    ///
    /// Returns `false` when part of the window was overwritten before it
    /// could be copied; that hop is counted as dropped instead.
    fn analyze_hop(&mut self) -> Result<bool, ConfigError> {
        let end = self.next_end;
        let valid = self.reader.snapshot_ending_at(end, &mut self.window);
        self.next_end += self.hop as u64;

        let expected = (self.transform.size() as u64).min(end) as usize;
        if valid < expected {
            self.dropped_hops += 1;
            if self.resynthesis {
                self.synth.reset();
            }
            return Ok(false);
        }
        self.analyze_current()?;
        Ok(true)
    }

    fn analyze_current(&mut self) -> Result<(), ConfigError> {
        self.transform.forward_into(&self.window, &mut self.frame)?;
        self.weights
            .activate_into(&self.frame.magnitudes, &mut self.activations)?;

        if self.frames_analyzed == 0 {
            self.smoothed.copy_from_slice(&self.activations);
        } else {
            let alpha = 1.0 - self.smoothing;
            for (s, &a) in self.smoothed.iter_mut().zip(&self.activations) {
                *s = alpha * a + (1.0 - alpha) * *s;
            }
        }
        self.frames_analyzed += 1;

        if self.resynthesis {
            self.weights
                .reconstruct_into(&self.activations, &mut self.reconstructed)?;
            self.synth
                .push_hop(&mut self.transform, &self.reconstructed, &self.frame.phases)?;
        }
        Ok(())
    }

    pub fn view(&self) -> AnalysisView<'_> {
        AnalysisView {
            magnitudes: &self.frame.magnitudes,
            phases: &self.frame.phases,
            activations: &self.activations,
            smoothed: &self.smoothed,
            frames_analyzed: self.frames_analyzed,
        }
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn transform(&self) -> &SpectralTransform {
        &self.transform
    }

    pub fn resynthesis(&self) -> bool {
        self.resynthesis
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }

    pub fn dropped_hops(&self) -> u64 {
        self.dropped_hops
    }

    pub fn output_overruns(&self) -> u64 {
        self.synth.overruns()
    }

    /// Swap in a new layer; its input width must match the transform.
    pub fn set_weights(&mut self, weights: Weights) -> Result<(), ConfigError> {
        weights.expect_visible(self.transform.bins())?;
        if weights.n_hidden() != self.activations.len() {
            self.activations = vec![0.0; weights.n_hidden()];
            self.smoothed = vec![0.0; weights.n_hidden()];
            self.frames_analyzed = 0;
        }
        self.weights = weights;
        self.synth.reset();
        Ok(())
    }

    pub fn set_smoothing(&mut self, smoothing: f32) -> Result<(), ConfigError> {
        check_smoothing(smoothing)?;
        self.smoothing = smoothing;
        Ok(())
    }

    pub fn set_window(&mut self, kind: WindowKind) -> Result<(), ConfigError> {
        if kind == self.transform.window_kind() {
            return Ok(());
        }
        if self.resynthesis {
            kind.check_overlap_add(self.transform.size(), self.hop)?;
        }
        self.transform = SpectralTransform::new(self.transform.size(), kind)?;
        self.synth.retune(&self.transform);
        Ok(())
    }

    pub fn set_resynthesis(&mut self, enabled: bool) -> Result<(), ConfigError> {
        if enabled {
            self.transform
                .window_kind()
                .check_overlap_add(self.transform.size(), self.hop)?;
        }
        if enabled && !self.resynthesis {
            self.synth.reset();
        }
        self.resynthesis = enabled;
        Ok(())
    }
}
