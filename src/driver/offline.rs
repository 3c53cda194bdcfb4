//! Replays a decoded file through the shell with simulated audio and display
//! clocks, so every callback runs in the same order a device would drive it.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::BufWriter;
use std::path::Path;

use crate::app::{App, Session};
use crate::audio::decode::{self, AudioData};
use crate::config::Config;
use crate::network::Matrix;

#[derive(Debug, Serialize)]
pub struct TraceFrame {
    pub time: f32,
    pub activations: Vec<f32>,
    pub smoothed: Vec<f32>,
    pub peak_neuron: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Trace {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub hop_size: usize,
    pub neurons: usize,
    pub frames: Vec<TraceFrame>,
}

#[derive(Debug, Default)]
pub struct Report {
    pub display_frames: u64,
    pub analysed_hops: u64,
    /// Mean over every displayed spectrum, activated as one batch.
    pub mean_activation: f32,
    /// Neuron that peaked on the most display frames.
    pub dominant_neuron: Option<usize>,
}

pub struct OfflineRun<'a> {
    pub input: &'a Path,
    pub trace: Option<&'a Path>,
    pub resynth: Option<&'a Path>,
}

pub fn run(mut config: Config, paths: &OfflineRun<'_>) -> Result<Report> {
    let audio = decode::decode_audio(paths.input)?;
    if audio.sample_rate != config.audio.sample_rate || audio.channels != config.audio.channels {
        log::info!(
            "Using file format {} Hz / {} ch instead of configured {} Hz / {} ch",
            audio.sample_rate,
            audio.channels,
            config.audio.sample_rate,
            config.audio.channels
        );
        config.audio.sample_rate = audio.sample_rate;
        config.audio.channels = audio.channels;
    }
    if paths.resynth.is_some() {
        config.output.resynthesis = true;
    }

    let session = App::on_setup(config).context("Pipeline setup failed")?;
    drive(session, &audio, paths)
}

fn drive(session: Session, audio: &AudioData, paths: &OfflineRun<'_>) -> Result<Report> {
    let Session {
        mut app,
        mut input,
        mut output,
    } = session;

    let config = app.config().clone();
    let channels = audio.channels;
    let sample_rate = config.audio.sample_rate as f64;
    let block = config.audio.buffer_size * channels;
    let frame_period = sample_rate / config.output.fps as f64;

    // Trailing silence flushes the analysis window and the output queue.
    let tail = (config.analysis.fft_size + crate::app::shell::output_prefill(&config)) * channels;
    let mut samples = audio.samples.clone();
    samples.resize(samples.len() + tail, 0.0);

    let mut wav = match paths.resynth {
        Some(path) => Some(decode::wav_writer(path, config.audio.sample_rate, channels)?),
        None => None,
    };

    let mut trace = Trace {
        sample_rate: config.audio.sample_rate,
        fft_size: config.analysis.fft_size,
        hop_size: config.analysis.hop_size,
        neurons: config.network.neurons,
        frames: Vec::new(),
    };
    let mut report = Report::default();
    let bins = config.bins();
    let mut spectra: Vec<f32> = Vec::new();
    let mut peak_counts = vec![0u64; config.network.neurons];

    let pb = ProgressBar::new(samples.len().div_ceil(block) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut out_block = vec![0.0f32; block];
    let mut clock = 0u64;
    let mut next_frame = frame_period;

    for (i, chunk) in samples.chunks(block).enumerate() {
        input.on_audio_input(chunk, channels);
        clock += (chunk.len() / channels) as u64;

        while clock as f64 >= next_frame {
            report.analysed_hops += app.on_update_frame() as u64;
            report.display_frames += 1;
            next_frame += frame_period;

            let view = app.on_draw_frame();
            if view.frames_analyzed == 0 {
                continue;
            }
            spectra.extend_from_slice(view.magnitudes);
            let peak = view.peak_neuron().map(|(index, _)| index);
            if let Some(index) = peak {
                if index >= peak_counts.len() {
                    peak_counts.resize(index + 1, 0);
                }
                peak_counts[index] += 1;
            }
            if paths.trace.is_some() {
                trace.frames.push(TraceFrame {
                    time: (clock as f64 / sample_rate) as f32,
                    activations: view.activations.to_vec(),
                    smoothed: view.smoothed.to_vec(),
                    peak_neuron: peak,
                });
            }
        }

        let out = &mut out_block[..chunk.len()];
        output.on_audio_output(out, channels);
        if let Some(writer) = wav.as_mut() {
            for &sample in out.iter() {
                writer.write_sample(sample)?;
            }
        }
        pb.set_position(i as u64 + 1);
    }
    pb.finish_with_message("Analysis complete");

    if let Some(writer) = wav {
        writer.finalize().context("Failed to finalize WAV output")?;
        if let Some(path) = paths.resynth {
            log::info!("Resynthesised audio written to {}", path.display());
        }
    }

    if let Some(path) = paths.trace {
        trace.neurons = app.config().network.neurons;
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create trace file: {}", path.display()))?;
        serde_json::to_writer(BufWriter::new(file), &trace)
            .with_context(|| format!("Failed to write trace: {}", path.display()))?;
        log::info!(
            "Activation trace ({} frames) written to {}",
            trace.frames.len(),
            path.display()
        );
    }

    if !spectra.is_empty() {
        let frames = Matrix::from_vec(spectra.len() / bins, bins, spectra)?;
        let batch = app.analyzer().weights().activate_batch(&frames)?;
        let values = batch.as_slice();
        report.mean_activation =
            (values.iter().map(|&a| a as f64).sum::<f64>() / values.len() as f64) as f32;
    }
    report.dominant_neuron = peak_counts
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(_, count)| **count)
        .map(|(index, _)| index);

    log::info!(
        "{} display frames, {} hops analysed, mean activation {:.3}, dominant neuron {:?}",
        report.display_frames,
        report.analysed_hops,
        report.mean_activation,
        report.dominant_neuron
    );
    let dropped = app.analyzer().dropped_hops();
    let overruns = app.analyzer().output_overruns();
    if dropped > 0 || overruns > 0 {
        log::warn!("{} hop(s) dropped, {} output overrun(s)", dropped, overruns);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_file(name: &str, seconds: f32) -> std::path::PathBuf {
        let path = std::env::temp_dir()
            .join(format!("neurogram-{}-{}.wav", name, std::process::id()));
        let mut writer = decode::wav_writer(&path, 8000, 1).unwrap();
        let frames = (8000.0 * seconds) as usize;
        for i in 0..frames {
            let t = i as f32 / 8000.0;
            writer
                .write_sample((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5)
                .unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.audio.buffer_size = 64;
        config.analysis.fft_size = 256;
        config.analysis.hop_size = 128;
        config.network.neurons = 8;
        config.output.fps = 50;
        config
    }

    #[test]
    fn writes_trace_for_every_display_frame() {
        let input = tone_file("trace-in", 0.5);
        let trace_path = input.with_extension("json");

        let report = run(
            small_config(),
            &OfflineRun {
                input: &input,
                trace: Some(&trace_path),
                resynth: None,
            },
        )
        .unwrap();

        assert!(report.display_frames >= 25);
        assert!(report.analysed_hops >= 4000 / 128);
        assert!((0.0..=1.0).contains(&report.mean_activation));
        assert!(report.dominant_neuron.is_some());

        let trace: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&trace_path).unwrap()).unwrap();
        assert_eq!(trace["fft_size"], 256);
        assert_eq!(trace["neurons"], 8);
        let frames = trace["frames"].as_array().unwrap();
        assert!(!frames.is_empty());
        assert_eq!(frames[0]["activations"].as_array().unwrap().len(), 8);

        // The batched mean agrees with the per-frame activations in the trace.
        let values: Vec<f64> = frames
            .iter()
            .flat_map(|f| f["activations"].as_array().unwrap().clone())
            .map(|v| v.as_f64().unwrap())
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert!((mean - report.mean_activation as f64).abs() < 1e-4);

        std::fs::remove_file(&input).unwrap();
        std::fs::remove_file(&trace_path).unwrap();
    }

    #[test]
    fn resynthesis_writes_wav_of_same_layout() {
        let input = tone_file("resynth-in", 0.25);
        let output =
            input.with_file_name(format!("neurogram-resynth-out-{}.wav", std::process::id()));

        run(
            small_config(),
            &OfflineRun {
                input: &input,
                trace: None,
                resynth: Some(&output),
            },
        )
        .unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.spec().channels, 1);
        assert!(reader.len() >= 2000);

        std::fs::remove_file(&input).unwrap();
        std::fs::remove_file(&output).unwrap();
    }
}
