//! Host-facing entry points.
//!
//! [`App::on_setup`] builds the pipeline and hands back three owned halves:
//! the UI-side [`App`] and the two audio callbacks. A driver decides which
//! thread each half runs on; nothing here dispatches through traits.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use rtrb::{Consumer, RingBuffer};

use super::analysis::{AnalysisView, Analyzer};
use super::events::{ControlEvent, InputEvent};
use super::synthesis::Synthesizer;
use crate::audio::spectral::{SpectralTransform, WindowKind};
use crate::audio::waveform::{waveform_buffer, WaveformWriter};
use crate::config::{check_gain, Config};
use crate::error::{ConfigError, SetupError};
use crate::network::{WeightSource, Weights};

/// Lock-free state shared by the audio callbacks and the UI.
struct AudioShared {
    gain: AtomicU32,
    underruns: AtomicU64,
    rejected_blocks: AtomicU64,
}

impl AudioShared {
    fn new(gain: f32) -> Self {
        Self {
            gain: AtomicU32::new(gain.to_bits()),
            underruns: AtomicU64::new(0),
            rejected_blocks: AtomicU64::new(0),
        }
    }

    fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }
}

/// Everything a driver needs after setup.
pub struct Session {
    pub app: App,
    pub input: AudioInput,
    pub output: AudioOutput,
}

/// Audio-input callback half. Allocation-free.
pub struct AudioInput {
    writer: WaveformWriter,
    channels: usize,
    channel: usize,
    shared: Arc<AudioShared>,
}

impl AudioInput {
    /// Record the analysed channel of an interleaved input block.
    ///
    /// Blocks whose channel count differs from the configured one are dropped.
    pub fn on_audio_input(&mut self, buffer: &[f32], channels: usize) {
        if channels != self.channels {
            self.shared.rejected_blocks.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.writer.write(buffer, self.channel);
    }
}

/// Audio-output callback half. Allocation-free.
///
/// Plays resynthesised samples once `prefill` of them are queued; writes
/// silence before that and after an underrun until the queue refills.
pub struct AudioOutput {
    consumer: Consumer<f32>,
    shared: Arc<AudioShared>,
    prefill: usize,
    primed: bool,
}

impl AudioOutput {
    /// Fill an interleaved output block, copying the mono signal to every channel.
    pub fn on_audio_output(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        if !self.primed {
            if self.consumer.slots() < self.prefill {
                buffer.fill(0.0);
                return;
            }
            self.primed = true;
        }

        let gain = self.shared.gain();
        let mut frames = buffer.chunks_mut(channels);
        for frame in frames.by_ref() {
            match self.consumer.pop() {
                Ok(sample) => frame.fill(sample * gain),
                Err(_) => {
                    frame.fill(0.0);
                    self.primed = false;
                    self.shared.underruns.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
        for frame in frames {
            frame.fill(0.0);
        }
    }
}

/// UI-side shell: owns the analyser and routes GUI and input events.
pub struct App {
    config: Config,
    analyzer: Analyzer,
    shared: Arc<AudioShared>,
    viewport: (u32, u32),
    frames: u64,
    reported_underruns: u64,
    reported_rejected: u64,
}

/// Samples queued before output starts: one hop, one display frame and one
/// callback block, so a display-rate producer can keep a block-rate consumer fed.
pub fn output_prefill(config: &Config) -> usize {
    let per_frame = (config.audio.sample_rate as usize).div_ceil(config.output.fps as usize);
    config.analysis.hop_size + per_frame + config.audio.buffer_size
}

impl App {
    /// Validate the configuration and build the pipeline.
    ///
    /// Any dimension mismatch is returned here; no audio half exists until
    /// setup succeeds.
    pub fn on_setup(mut config: Config) -> Result<Session, SetupError> {
        config.validate()?;

        let fft_size = config.analysis.fft_size;
        let hop = config.analysis.hop_size;
        let (writer, reader) = waveform_buffer(config.waveform_capacity(), config.audio.channels)?;
        let transform = SpectralTransform::new(fft_size, config.analysis.window)?;

        let weights = match &config.network.weights {
            Some(path) => Weights::load(path)?,
            None => Weights::random(
                transform.bins(),
                config.network.neurons,
                config.network.seed,
                config.network.tied,
            )?,
        };
        weights.expect_visible(transform.bins())?;
        if weights.n_hidden() != config.network.neurons {
            log::info!(
                "Weight file defines {} neurons (config asked for {})",
                weights.n_hidden(),
                config.network.neurons
            );
            config.network.neurons = weights.n_hidden();
        }

        let prefill = output_prefill(&config);
        let (producer, consumer) = RingBuffer::new(prefill * 2 + fft_size);
        let synth = Synthesizer::new(producer, &transform, hop)?;
        let mut analyzer = Analyzer::new(
            reader,
            transform,
            weights,
            synth,
            hop,
            config.network.smoothing,
        )?;
        analyzer.set_resynthesis(config.output.resynthesis)?;

        let shared = Arc::new(AudioShared::new(config.output.gain));

        log::info!(
            "Pipeline ready: {} Hz, {} ch (ch {}), FFT {} / hop {} ({:?}), {} bins -> {} neurons",
            config.audio.sample_rate,
            config.audio.channels,
            config.audio.input_channel,
            fft_size,
            hop,
            config.analysis.window,
            fft_size / 2 + 1,
            config.network.neurons
        );

        let input = AudioInput {
            writer,
            channels: config.audio.channels,
            channel: config.audio.input_channel,
            shared: Arc::clone(&shared),
        };
        let output = AudioOutput {
            consumer,
            shared: Arc::clone(&shared),
            prefill,
            primed: false,
        };
        let app = App {
            config,
            analyzer,
            shared,
            viewport: (0, 0),
            frames: 0,
            reported_underruns: 0,
            reported_rejected: 0,
        };

        Ok(Session { app, input, output })
    }

    /// Pump the analysis once per display frame. Returns the hops analysed.
    pub fn on_update_frame(&mut self) -> usize {
        self.frames += 1;
        let hops = match self.analyzer.update() {
            Ok(hops) => hops,
            Err(err) => {
                log::error!("Analysis failed: {}", err);
                0
            }
        };

        let underruns = self.shared.underruns.load(Ordering::Relaxed);
        if underruns > self.reported_underruns {
            log::warn!("Output underran {} time(s)", underruns - self.reported_underruns);
            self.reported_underruns = underruns;
        }
        let rejected = self.shared.rejected_blocks.load(Ordering::Relaxed);
        if rejected > self.reported_rejected {
            log::warn!(
                "Dropped {} input block(s) with the wrong channel count",
                rejected - self.reported_rejected
            );
            self.reported_rejected = rejected;
        }
        hops
    }

    /// Current spectrum and activations for the renderer.
    pub fn on_draw_frame(&self) -> AnalysisView<'_> {
        self.analyzer.view()
    }

    pub fn on_gui_event(&mut self, event: ControlEvent) -> Result<(), ConfigError> {
        let result = self.apply_control(&event);
        match &result {
            Ok(()) => log::info!("Applied {:?}", event),
            Err(err) => log::warn!("Ignoring {:?}: {}", event, err),
        }
        result
    }

    fn apply_control(&mut self, event: &ControlEvent) -> Result<(), ConfigError> {
        match *event {
            ControlEvent::Neurons(neurons) => {
                if let WeightSource::File(path) = self.analyzer.weights().source() {
                    return Err(ConfigError::FixedWeights(path.clone()));
                }
                let weights = Weights::random(
                    self.analyzer.transform().bins(),
                    neurons,
                    self.config.network.seed,
                    self.config.network.tied,
                )?;
                self.analyzer.set_weights(weights)?;
                self.config.network.neurons = neurons;
            }
            ControlEvent::Smoothing(smoothing) => {
                self.analyzer.set_smoothing(smoothing)?;
                self.config.network.smoothing = smoothing;
            }
            ControlEvent::OutputGain(gain) => {
                check_gain(gain)?;
                self.shared.set_gain(gain);
                self.config.output.gain = gain;
            }
            ControlEvent::Resynthesis(enabled) => {
                self.analyzer.set_resynthesis(enabled)?;
                self.config.output.resynthesis = enabled;
            }
            ControlEvent::Window(kind) => {
                self.analyzer.set_window(kind)?;
                self.config.analysis.window = kind;
            }
        }
        Ok(())
    }

    pub fn on_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::KeyPressed('r') => {
                let enabled = !self.analyzer.resynthesis();
                let _ = self.on_gui_event(ControlEvent::Resynthesis(enabled));
            }
            InputEvent::KeyPressed('w') => {
                let next = match self.analyzer.transform().window_kind() {
                    WindowKind::Hann => WindowKind::Rectangular,
                    WindowKind::Rectangular => WindowKind::Hann,
                };
                let _ = self.on_gui_event(ControlEvent::Window(next));
            }
            InputEvent::KeyPressed(key) | InputEvent::KeyReleased(key) => {
                log::trace!("key {:?}", key);
            }
            InputEvent::MouseMoved { .. }
            | InputEvent::MouseDragged { .. }
            | InputEvent::MousePressed { .. }
            | InputEvent::MouseReleased { .. } => {
                log::trace!("{:?}", event);
            }
            InputEvent::WindowResized { width, height } => {
                log::debug!("Viewport resized to {}x{}", width, height);
                self.viewport = (width, height);
            }
            InputEvent::FilesDropped { paths, .. } => {
                for path in paths {
                    self.load_dropped(&path);
                }
            }
            InputEvent::Message(message) => log::info!("Message: {}", message),
        }
    }

    fn load_dropped(&mut self, path: &Path) {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            log::debug!("Ignoring dropped file {}", path.display());
            return;
        }
        let result = Weights::load(path)
            .map_err(SetupError::from)
            .and_then(|weights| self.analyzer.set_weights(weights).map_err(SetupError::from));
        match result {
            Ok(()) => self.config.network.neurons = self.analyzer.weights().n_hidden(),
            Err(err) => log::warn!("Could not use dropped weights: {}", err),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn small_config() -> Config {
        let mut config = Config::default();
        config.audio.sample_rate = 8000;
        config.audio.buffer_size = 16;
        config.analysis.fft_size = 32;
        config.analysis.hop_size = 16;
        config.network.neurons = 6;
        config.output.fps = 100;
        config
    }

    #[test]
    fn setup_refuses_mismatched_weights() {
        let path = std::env::temp_dir()
            .join(format!("neurogram-shell-{}.json", std::process::id()));
        Weights::random(9, 4, 1, true).unwrap().save(&path).unwrap();

        let mut config = small_config();
        config.network.weights = Some(path.clone());
        let err = App::on_setup(config).err().unwrap();
        assert!(matches!(err, SetupError::Config(ConfigError::LengthMismatch { .. })));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn setup_refuses_invalid_config() {
        let mut config = small_config();
        config.analysis.fft_size = 31;
        assert!(matches!(
            App::on_setup(config).err(),
            Some(SetupError::Config(ConfigError::InvalidFftSize(31)))
        ));
    }

    #[test]
    fn input_flows_to_activations() {
        let Session { mut app, mut input, .. } = App::on_setup(small_config()).unwrap();
        let block: Vec<f32> = (0..16).map(|i| (i as f32 * 0.7).sin()).collect();
        for _ in 0..4 {
            input.on_audio_input(&block, 1);
        }

        assert_eq!(app.on_update_frame(), 4);
        let view = app.on_draw_frame();
        assert_eq!(view.magnitudes.len(), 17);
        assert_eq!(view.activations.len(), 6);
        assert!(view.activations.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn wrong_channel_count_is_dropped() {
        let Session { mut app, mut input, .. } = App::on_setup(small_config()).unwrap();
        input.on_audio_input(&[0.5; 32], 2);
        assert_eq!(app.on_update_frame(), 0);
        assert_eq!(app.shared.rejected_blocks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn output_is_silent_until_prefilled() {
        let mut config = small_config();
        config.output.resynthesis = true;
        let Session { mut app, mut input, mut output } = App::on_setup(config.clone()).unwrap();
        let prefill = output_prefill(&config);

        let mut out = vec![1.0f32; 32];
        output.on_audio_output(&mut out, 2);
        assert!(out.iter().all(|&s| s == 0.0));

        let block = [0.25f32; 16];
        let blocks = prefill.div_ceil(16) + 2;
        for _ in 0..blocks {
            input.on_audio_input(&block, 1);
            app.on_update_frame();
        }

        out.fill(9.0);
        output.on_audio_output(&mut out, 2);
        for frame in out.chunks(2) {
            assert_eq!(frame[0], frame[1]);
            assert!(frame[0].is_finite() && frame[0] != 9.0);
        }
        assert_eq!(app.shared.underruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn gui_events_reconfigure_pipeline() {
        let Session { mut app, .. } = App::on_setup(small_config()).unwrap();

        app.on_gui_event(ControlEvent::Neurons(3)).unwrap();
        assert_eq!(app.on_draw_frame().activations.len(), 3);
        assert_eq!(app.config().network.neurons, 3);

        app.on_gui_event(ControlEvent::Smoothing(0.2)).unwrap();
        assert_eq!(app.analyzer().smoothing(), 0.2);
        assert!(app.on_gui_event(ControlEvent::Smoothing(1.5)).is_err());

        app.on_gui_event(ControlEvent::OutputGain(0.5)).unwrap();
        assert_eq!(app.shared.gain(), 0.5);
        assert!(app.on_gui_event(ControlEvent::OutputGain(f32::NAN)).is_err());

        app.on_gui_event(ControlEvent::Window(WindowKind::Rectangular)).unwrap();
        assert_eq!(app.analyzer().transform().window_kind(), WindowKind::Rectangular);

        assert_eq!(app.on_gui_event(ControlEvent::Neurons(0)), Err(ConfigError::NoNeurons));
    }

    #[test]
    fn neuron_count_is_fixed_for_loaded_weights() {
        let path = std::env::temp_dir()
            .join(format!("neurogram-fixed-{}.json", std::process::id()));
        Weights::random(17, 5, 2, false).unwrap().save(&path).unwrap();

        let mut config = small_config();
        config.network.weights = Some(path.clone());
        let Session { mut app, .. } = App::on_setup(config).unwrap();
        assert_eq!(app.config().network.neurons, 5);
        assert!(matches!(
            app.on_gui_event(ControlEvent::Neurons(8)),
            Err(ConfigError::FixedWeights(_))
        ));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn input_events_dispatch() {
        let Session { mut app, .. } = App::on_setup(small_config()).unwrap();

        app.on_input(InputEvent::KeyPressed('r'));
        assert!(app.analyzer().resynthesis());
        app.on_input(InputEvent::KeyPressed('r'));
        assert!(!app.analyzer().resynthesis());

        app.on_input(InputEvent::KeyPressed('w'));
        assert_eq!(app.analyzer().transform().window_kind(), WindowKind::Rectangular);

        app.on_input(InputEvent::WindowResized { width: 800, height: 600 });
        assert_eq!(app.viewport(), (800, 600));

        let path = std::env::temp_dir()
            .join(format!("neurogram-drop-{}.json", std::process::id()));
        Weights::random(17, 2, 4, true).unwrap().save(&path).unwrap();
        app.on_input(InputEvent::FilesDropped {
            paths: vec![PathBuf::from("notes.txt"), path.clone()],
            x: 0,
            y: 0,
        });
        assert_eq!(app.on_draw_frame().activations.len(), 2);
        assert_eq!(app.config().network.neurons, 2);
        std::fs::remove_file(&path).unwrap();
    }
}
