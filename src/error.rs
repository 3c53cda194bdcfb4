use std::path::PathBuf;

use thiserror::Error;

/// Dimension and parameter mismatches detected while building the pipeline.
///
/// These are fatal to setup: the shell refuses to start audio processing
/// when any of them is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("FFT size must be a non-zero even number, got {0}")]
    InvalidFftSize(usize),

    #[error("hop size {hop} must be in 1..={fft_size}")]
    InvalidHopSize { hop: usize, fft_size: usize },

    #[error("resynthesis needs the hop size ({hop}) to divide the FFT size ({fft_size})")]
    HopNotDivisor { hop: usize, fft_size: usize },

    #[error("Hann resynthesis needs hop {hop} <= half the FFT size ({fft_size})")]
    NoOverlap { hop: usize, fft_size: usize },

    #[error("waveform capacity {capacity} is smaller than the FFT size {fft_size}")]
    CapacityTooSmall { capacity: usize, fft_size: usize },

    #[error("input channel {channel} out of range for {channels} channel(s)")]
    InvalidChannel { channel: usize, channels: usize },

    #[error("{what}: expected length {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{what}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("neuron count must be at least 1")]
    NoNeurons,

    #[error("weights loaded from {} have a fixed layer width", .0.display())]
    FixedWeights(PathBuf),

    #[error("{name} must be in {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f32,
    },
}

impl ConfigError {
    pub fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            actual,
        }
    }
}

/// Failures while reading or writing a weight file.
#[derive(Error, Debug)]
pub enum WeightsError {
    #[error("failed to read weights from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write weights to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed weight file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialise weights for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("row {row} of {what} has {actual} columns, expected {expected}")]
    RaggedRow {
        what: &'static str,
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Shape(#[from] ConfigError),
}

/// A console line that does not parse as a command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("`{0}` needs a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for `{command}`")]
    InvalidValue { command: String, value: String },
}

/// Anything that stops the shell from starting.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Weights(#[from] WeightsError),
}
