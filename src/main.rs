mod app;
mod audio;
mod cli;
mod config;
mod driver;
mod error;
mod network;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use cli::Cli;
use config::Config;
use driver::offline::{self, OfflineRun};
use network::Weights;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Explicit --config path, or auto-detect neurogram.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("neurogram.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("neurogram").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("neurogram").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });

    let mut config = match config_path {
        Some(ref path) => match config::load_config(path) {
            Some(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            None => {
                log::warn!("Failed to load config from {}", path.display());
                Config::default()
            }
        },
        None => Config::default(),
    };
    apply_cli(&mut config, &cli);
    config.validate().context("Invalid configuration")?;

    if let Some(ref path) = cli.export_weights {
        let weights = match config.network.weights {
            Some(ref source) => Weights::load(source)?,
            None => Weights::random(
                config.bins(),
                config.network.neurons,
                config.network.seed,
                config.network.tied,
            )?,
        };
        weights.save(path)?;
        log::info!(
            "Exported {}x{} weights to {}",
            weights.n_hidden(),
            weights.n_visible(),
            path.display()
        );
    }

    if cli.live {
        #[cfg(feature = "live")]
        {
            let duration = std::time::Duration::from_secs_f32(cli.duration.max(0.0));
            return driver::live::run(config, duration);
        }

        #[cfg(not(feature = "live"))]
        {
            anyhow::bail!(
                "Live audio requires the 'live' feature. \
                 Rebuild with: cargo build --features live"
            );
        }
    }

    let input = match cli.input {
        Some(ref input) => input,
        None if cli.export_weights.is_some() => return Ok(()),
        None => anyhow::bail!("Input audio file is required (or pass --live)"),
    };
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("neurogram - spectrum to neural activation pipeline");
    log::info!("Input: {}", input.display());

    offline::run(
        config,
        &OfflineRun {
            input,
            trace: cli.output.as_deref(),
            resynth: cli.resynth.as_deref(),
        },
    )?;

    log::info!("Done!");
    Ok(())
}

/// CLI values override the config file only when changed from their defaults.
fn apply_cli(config: &mut Config, cli: &Cli) {
    if cli.fft_size != config::default_fft_size() {
        config.analysis.fft_size = cli.fft_size;
    }
    if cli.hop_size != config::default_hop_size() {
        config.analysis.hop_size = cli.hop_size;
    }
    if cli.buffer_size != config::default_buffer_size() {
        config.audio.buffer_size = cli.buffer_size;
    }
    if cli.window != Default::default() {
        config.analysis.window = cli.window;
    }
    if cli.neurons != config::default_neurons() {
        config.network.neurons = cli.neurons;
    }
    if cli.seed != config::default_seed() {
        config.network.seed = cli.seed;
    }
    if cli.smoothing != config::default_smoothing() {
        config.network.smoothing = cli.smoothing;
    }
    if cli.fps != config::default_fps() {
        config.output.fps = cli.fps;
    }
    if cli.tied {
        config.network.tied = true;
    }
    if cli.weights.is_some() {
        config.network.weights = cli.weights.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_keep_file_values() {
        let mut config = Config::default();
        config.analysis.fft_size = 2048;
        config.network.neurons = 10;

        let cli = Cli::parse_from(["neurogram", "song.wav"]);
        apply_cli(&mut config, &cli);
        assert_eq!(config.analysis.fft_size, 2048);
        assert_eq!(config.network.neurons, 10);
    }

    #[test]
    fn explicit_cli_values_win() {
        let mut config = Config::default();
        config.network.neurons = 10;

        let cli = Cli::parse_from([
            "neurogram",
            "--neurons",
            "32",
            "--window",
            "rectangular",
            "--tied",
            "--weights",
            "layer.json",
        ]);
        apply_cli(&mut config, &cli);
        assert_eq!(config.network.neurons, 32);
        assert_eq!(config.analysis.window, audio::spectral::WindowKind::Rectangular);
        assert!(config.network.tied);
        assert_eq!(config.network.weights, Some(PathBuf::from("layer.json")));
    }
}
