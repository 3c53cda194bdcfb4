use clap::Parser;
use std::path::PathBuf;

use crate::audio::spectral::WindowKind;

#[derive(Parser, Debug)]
#[command(name = "neurogram", about = "Real-time spectrum to neural activation pipeline")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG) replayed through the pipeline
    pub input: Option<PathBuf>,

    /// Config file (defaults to neurogram.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the per-frame activation trace as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the resynthesised audio as WAV (enables resynthesis)
    #[arg(long)]
    pub resynth: Option<PathBuf>,

    /// FFT size in samples (even)
    #[arg(long, default_value_t = 1024)]
    pub fft_size: usize,

    /// Samples between analysis frames
    #[arg(long, default_value_t = 512)]
    pub hop_size: usize,

    /// Frames per audio callback
    #[arg(long, default_value_t = 512)]
    pub buffer_size: usize,

    /// Analysis window
    #[arg(long, value_enum, default_value_t = WindowKind::Hann)]
    pub window: WindowKind,

    /// Hidden layer width
    #[arg(short, long, default_value_t = 64)]
    pub neurons: usize,

    /// JSON weight file (random weights when omitted)
    #[arg(short, long)]
    pub weights: Option<PathBuf>,

    /// Seed for random weights
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Tie W' to the transpose of W for random weights
    #[arg(long)]
    pub tied: bool,

    /// Display smoothing of activations (0.0-1.0)
    #[arg(long, default_value_t = 0.85)]
    pub smoothing: f32,

    /// Display frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Save the initial weights to this JSON file
    #[arg(long)]
    pub export_weights: Option<PathBuf>,

    /// Use the default audio devices instead of an input file
    #[arg(long)]
    pub live: bool,

    /// Seconds to run in live mode
    #[arg(long, default_value_t = 10.0)]
    pub duration: f32,
}
