//! Default-device driver: the audio halves become cpal callbacks, the UI half
//! is pumped from this thread at the configured frame rate. Lines typed on
//! stdin are dispatched as GUI and input events.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use crate::app::events::Command;
use crate::app::{App, Session};
use crate::error::CommandError;
use crate::config::Config;

pub fn run(config: Config, duration: Duration) -> Result<()> {
    let host = cpal::default_host();
    let input_device = host
        .default_input_device()
        .context("No default input device")?;
    let output_device = host
        .default_output_device()
        .context("No default output device")?;
    log::info!(
        "Input device: {}, output device: {}",
        input_device.name().unwrap_or_else(|_| "Unknown".to_string()),
        output_device.name().unwrap_or_else(|_| "Unknown".to_string())
    );

    let stream_config = cpal::StreamConfig {
        channels: config.audio.channels as u16,
        sample_rate: cpal::SampleRate(config.audio.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(config.audio.buffer_size as u32),
    };
    let channels = config.audio.channels;
    let fps = config.output.fps;

    let Session {
        mut app,
        mut input,
        mut output,
    } = App::on_setup(config).context("Pipeline setup failed")?;

    let input_stream = input_device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                input.on_audio_input(data, channels);
            },
            |err| log::error!("Input stream error: {}", err),
            None,
        )
        .context("Failed to open input stream")?;
    let output_stream = output_device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                output.on_audio_output(data, channels);
            },
            |err| log::error!("Output stream error: {}", err),
            None,
        )
        .context("Failed to open output stream")?;

    input_stream.play().context("Failed to start input stream")?;
    output_stream.play().context("Failed to start output stream")?;
    log::info!("Running for {:.1}s", duration.as_secs_f32());
    let commands = spawn_console();

    let frame = Duration::from_secs_f64(1.0 / fps as f64);
    let start = Instant::now();
    let mut last_report = start;
    while start.elapsed() < duration {
        let tick = Instant::now();
        for line in commands.try_iter() {
            dispatch(&mut app, &line);
        }
        app.on_update_frame();

        if last_report.elapsed() >= Duration::from_secs(1) {
            report(&app);
            last_report = Instant::now();
        }

        if let Some(rest) = frame.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    drop(input_stream);
    drop(output_stream);
    log::info!(
        "Stopped after {} frames, {} hops dropped, {} output overruns",
        app.frames(),
        app.analyzer().dropped_hops(),
        app.analyzer().output_overruns()
    );
    Ok(())
}

/// Forward stdin lines to the UI loop. The reader thread ends with stdin.
fn spawn_console() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn dispatch(app: &mut App, line: &str) {
    match line.parse::<Command>() {
        Ok(Command::Control(event)) => {
            // Refusals are logged by the shell.
            let _ = app.on_gui_event(event);
        }
        Ok(Command::Input(event)) => app.on_input(event),
        Err(CommandError::Empty) => {}
        Err(err) => log::warn!("{}", err),
    }
}

fn report(app: &App) {
    let view = app.on_draw_frame();
    let mean = if view.smoothed.is_empty() {
        0.0
    } else {
        view.smoothed.iter().sum::<f32>() / view.smoothed.len() as f32
    };
    let loudest = view
        .magnitudes
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(bin, _)| bin);
    let frequency = app
        .analyzer()
        .transform()
        .bin_frequency(loudest, app.config().audio.sample_rate);
    match view.peak_neuron() {
        Some((index, value)) => log::info!(
            "frame {}: loudest {:.0} Hz, mean activation {:.3}, peak neuron {} ({:.3})",
            view.frames_analyzed,
            frequency,
            mean,
            index,
            value
        ),
        None => log::info!("frame {}: no activations yet", view.frames_analyzed),
    }
}
