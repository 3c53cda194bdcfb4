pub mod decode;
pub mod spectral;
pub mod waveform;
