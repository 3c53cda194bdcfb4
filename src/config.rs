use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::spectral::WindowKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Frames per audio callback.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// Channel of the interleaved input that feeds the analysis.
    #[serde(default)]
    pub input_channel: usize,
    /// Waveform ring size in samples; defaults to four FFT windows.
    #[serde(default)]
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default)]
    pub window: WindowKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_neurons")]
    pub neurons: usize,
    /// JSON weight file; random weights when absent.
    #[serde(default)]
    pub weights: Option<PathBuf>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub tied: bool,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub resynthesis: bool,
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Display frames per second, i.e. how often the analysis is pumped.
    #[serde(default = "default_fps")]
    pub fps: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            buffer_size: default_buffer_size(),
            channels: default_channels(),
            input_channel: 0,
            capacity: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            hop_size: default_hop_size(),
            window: WindowKind::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            neurons: default_neurons(),
            weights: None,
            seed: default_seed(),
            tied: false,
            smoothing: default_smoothing(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            resynthesis: false,
            gain: default_gain(),
            fps: default_fps(),
        }
    }
}

pub(crate) fn default_sample_rate() -> u32 { 44100 }
pub(crate) fn default_buffer_size() -> usize { 512 }
pub(crate) fn default_channels() -> usize { 1 }
pub(crate) fn default_fft_size() -> usize { 1024 }
pub(crate) fn default_hop_size() -> usize { 512 }
pub(crate) fn default_neurons() -> usize { 64 }
pub(crate) fn default_seed() -> u64 { 1 }
pub(crate) fn default_smoothing() -> f32 { 0.85 }
pub(crate) fn default_gain() -> f32 { 1.0 }
pub(crate) fn default_fps() -> u32 { 60 }

impl Config {
    pub fn waveform_capacity(&self) -> usize {
        self.audio
            .capacity
            .unwrap_or(self.analysis.fft_size * 4)
    }

    /// Number of spectral bins, i.e. the visible layer width.
    pub fn bins(&self) -> usize {
        self.analysis.fft_size / 2 + 1
    }

    /// Check every dimension before any audio is processed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fft_size = self.analysis.fft_size;
        if fft_size == 0 || fft_size % 2 != 0 {
            return Err(ConfigError::InvalidFftSize(fft_size));
        }

        let hop = self.analysis.hop_size;
        if hop == 0 || hop > fft_size {
            return Err(ConfigError::InvalidHopSize { hop, fft_size });
        }
        if self.output.resynthesis {
            self.analysis.window.check_overlap_add(fft_size, hop)?;
        }

        let capacity = self.waveform_capacity();
        if capacity < fft_size {
            return Err(ConfigError::CapacityTooSmall { capacity, fft_size });
        }

        if self.audio.channels == 0 || self.audio.input_channel >= self.audio.channels {
            return Err(ConfigError::InvalidChannel {
                channel: self.audio.input_channel,
                channels: self.audio.channels,
            });
        }
        if self.audio.buffer_size == 0 {
            return Err(ConfigError::OutOfRange {
                name: "buffer_size",
                range: ">= 1",
                value: 0.0,
            });
        }
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::OutOfRange {
                name: "sample_rate",
                range: ">= 1",
                value: 0.0,
            });
        }
        if self.output.fps == 0 {
            return Err(ConfigError::OutOfRange {
                name: "fps",
                range: ">= 1",
                value: 0.0,
            });
        }

        if self.network.neurons == 0 {
            return Err(ConfigError::NoNeurons);
        }
        check_smoothing(self.network.smoothing)?;
        check_gain(self.output.gain)?;
        Ok(())
    }
}

pub fn check_smoothing(value: f32) -> Result<(), ConfigError> {
    if !(0.0..1.0).contains(&value) {
        return Err(ConfigError::OutOfRange {
            name: "smoothing",
            range: "[0, 1)",
            value,
        });
    }
    Ok(())
}

pub fn check_gain(value: f32) -> Result<(), ConfigError> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(ConfigError::OutOfRange {
            name: "gain",
            range: "[0, inf)",
            value,
        });
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bins(), 513);
        assert_eq!(config.waveform_capacity(), 4096);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            fft_size = 256
            window = "rectangular"

            [network]
            neurons = 8
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.fft_size, 256);
        assert_eq!(config.analysis.hop_size, 512);
        assert_eq!(config.analysis.window, WindowKind::Rectangular);
        assert_eq!(config.network.neurons, 8);
        assert_eq!(config.audio.sample_rate, 44100);
        // Hop larger than the window is caught at validation.
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidHopSize { hop: 512, fft_size: 256 })
        );
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let mut config = Config::default();
        config.analysis.fft_size = 1023;
        assert_eq!(config.validate(), Err(ConfigError::InvalidFftSize(1023)));

        let mut config = Config::default();
        config.audio.capacity = Some(100);
        assert!(matches!(config.validate(), Err(ConfigError::CapacityTooSmall { .. })));

        let mut config = Config::default();
        config.audio.channels = 2;
        config.audio.input_channel = 2;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidChannel { .. })));

        let mut config = Config::default();
        config.analysis.hop_size = 300;
        assert!(config.validate().is_ok());
        config.output.resynthesis = true;
        assert!(matches!(config.validate(), Err(ConfigError::HopNotDivisor { .. })));
    }

    #[test]
    fn hann_resynthesis_needs_overlap() {
        let mut config = Config::default();
        config.analysis.hop_size = config.analysis.fft_size;
        config.output.resynthesis = true;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NoOverlap { hop: 1024, fft_size: 1024 })
        );

        config.analysis.window = WindowKind::Rectangular;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_controls() {
        let mut config = Config::default();
        config.network.smoothing = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.gain = -0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.network.neurons = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoNeurons));
    }

    #[test]
    fn missing_file_yields_none() {
        assert!(load_config(Path::new("/nonexistent/neurogram.toml")).is_none());
    }
}
