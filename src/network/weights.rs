//! Single hidden layer over a magnitude spectrum.
//!
//! `W` maps visible (spectral bins) to hidden units, `W'` maps back. The
//! layer is frozen: nothing in the pipeline updates it.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::matrix::Matrix;
use crate::error::{ConfigError, WeightsError};

/// On-disk layout of a weight file.
#[derive(Debug, Serialize, Deserialize)]
pub struct WeightFile {
    pub w: Vec<Vec<f32>>,
    /// Absent means tied weights: `W' = W^T`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w_prime: Option<Vec<Vec<f32>>>,
    pub hidden_bias: Vec<f32>,
    pub visible_bias: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeightSource {
    Random { seed: u64 },
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Weights {
    /// `n_hidden x n_visible`
    w: Matrix,
    /// `n_visible x n_hidden`
    w_prime: Matrix,
    hb: Vec<f32>,
    /// `1 x n_hidden`, broadcast over batch rows.
    hbt: Matrix,
    vb: Vec<f32>,
    tied: bool,
    source: WeightSource,
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Weights {
    /// Xavier-uniform weights and zero biases from a fixed seed.
    pub fn random(
        n_visible: usize,
        n_hidden: usize,
        seed: u64,
        tied: bool,
    ) -> Result<Self, ConfigError> {
        if n_hidden == 0 {
            return Err(ConfigError::NoNeurons);
        }
        if n_visible == 0 {
            return Err(ConfigError::length("visible units", 1, 0));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let limit = (6.0 / (n_visible + n_hidden) as f32).sqrt();
        let mut draw = |len: usize| -> Vec<f32> {
            (0..len).map(|_| rng.random_range(-limit..limit)).collect()
        };

        let w = Matrix::from_vec(n_hidden, n_visible, draw(n_hidden * n_visible))?;
        let w_prime = if tied {
            None
        } else {
            Some(Matrix::from_vec(n_visible, n_hidden, draw(n_visible * n_hidden))?)
        };

        let mut weights = Self::from_parts(w, w_prime, vec![0.0; n_hidden], vec![0.0; n_visible])?;
        weights.source = WeightSource::Random { seed };
        Ok(weights)
    }

    /// Assemble from explicit matrices; `None` for `w_prime` ties it to `W^T`.
    pub fn from_parts(
        w: Matrix,
        w_prime: Option<Matrix>,
        hidden_bias: Vec<f32>,
        visible_bias: Vec<f32>,
    ) -> Result<Self, ConfigError> {
        let n_hidden = w.rows();
        let n_visible = w.cols();
        if n_hidden == 0 {
            return Err(ConfigError::NoNeurons);
        }
        if hidden_bias.len() != n_hidden {
            return Err(ConfigError::length("hidden bias", n_hidden, hidden_bias.len()));
        }
        if visible_bias.len() != n_visible {
            return Err(ConfigError::length("visible bias", n_visible, visible_bias.len()));
        }

        let tied = w_prime.is_none();
        let w_prime = match w_prime {
            Some(m) => {
                m.expect_shape("W'", n_visible, n_hidden)?;
                m
            }
            None => w.transpose(),
        };
        let hbt = Matrix::from_vec(1, n_hidden, hidden_bias.clone())?;

        Ok(Self {
            w,
            w_prime,
            hb: hidden_bias,
            hbt,
            vb: visible_bias,
            tied,
            source: WeightSource::Random { seed: 0 },
        })
    }

    pub fn load(path: &Path) -> Result<Self, WeightsError> {
        let content = std::fs::read_to_string(path).map_err(|source| WeightsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: WeightFile = serde_json::from_str(&content).map_err(|source| WeightsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let w = Matrix::from_rows("W", &file.w)?;
        let w_prime = file
            .w_prime
            .as_deref()
            .map(|rows| Matrix::from_rows("W'", rows))
            .transpose()?;

        let mut weights = Self::from_parts(w, w_prime, file.hidden_bias, file.visible_bias)?;
        weights.source = WeightSource::File(path.to_path_buf());
        log::info!(
            "Loaded weights from {} ({} visible, {} hidden{})",
            path.display(),
            weights.n_visible(),
            weights.n_hidden(),
            if weights.tied { ", tied" } else { "" }
        );
        Ok(weights)
    }

    pub fn save(&self, path: &Path) -> Result<(), WeightsError> {
        let file = WeightFile {
            w: self.w.to_rows(),
            w_prime: (!self.tied).then(|| self.w_prime.to_rows()),
            hidden_bias: self.hb.clone(),
            visible_bias: self.vb.clone(),
        };
        let json = serde_json::to_string(&file).map_err(|source| WeightsError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| WeightsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn n_visible(&self) -> usize {
        self.w.cols()
    }

    pub fn n_hidden(&self) -> usize {
        self.w.rows()
    }

    #[allow(dead_code)]
    pub fn is_tied(&self) -> bool {
        self.tied
    }

    pub fn source(&self) -> &WeightSource {
        &self.source
    }

    #[allow(dead_code)]
    pub fn w(&self) -> &Matrix {
        &self.w
    }

    #[allow(dead_code)]
    pub fn w_prime(&self) -> &Matrix {
        &self.w_prime
    }

    /// Fail unless the layer accepts spectra with `bins` bins.
    pub fn expect_visible(&self, bins: usize) -> Result<(), ConfigError> {
        if self.n_visible() != bins {
            return Err(ConfigError::length("weight input dimension", bins, self.n_visible()));
        }
        Ok(())
    }

    /// `sigmoid(W . magnitudes + hb)`
    #[allow(dead_code)]
    pub fn activate(&self, magnitudes: &[f32]) -> Result<Vec<f32>, ConfigError> {
        let mut out = vec![0.0; self.n_hidden()];
        self.activate_into(magnitudes, &mut out)?;
        Ok(out)
    }

    pub fn activate_into(&self, magnitudes: &[f32], out: &mut [f32]) -> Result<(), ConfigError> {
        if magnitudes.len() != self.n_visible() {
            return Err(ConfigError::length("magnitudes", self.n_visible(), magnitudes.len()));
        }
        if out.len() != self.n_hidden() {
            return Err(ConfigError::length("activation layer", self.n_hidden(), out.len()));
        }

        self.w.mul_vec_into(magnitudes, out);
        for (v, b) in out.iter_mut().zip(&self.hb) {
            *v = sigmoid(*v + b);
        }
        Ok(())
    }

    /// Activate every row of a `batch x n_visible` matrix in parallel.
    pub fn activate_batch(&self, frames: &Matrix) -> Result<Matrix, ConfigError> {
        if frames.cols() != self.n_visible() {
            return Err(ConfigError::length("batch row", self.n_visible(), frames.cols()));
        }

        let n_hidden = self.n_hidden();
        let mut out = Matrix::zeros(frames.rows(), n_hidden);
        let bias = self.hbt.row(0);
        out.as_mut_slice()
            .par_chunks_mut(n_hidden)
            .zip(frames.as_slice().par_chunks(self.n_visible()))
            .for_each(|(dst, x)| {
                self.w.mul_vec_into(x, dst);
                for (v, b) in dst.iter_mut().zip(bias) {
                    *v = sigmoid(*v + b);
                }
            });
        Ok(out)
    }

    /// Project hidden activations back to a non-negative magnitude spectrum:
    /// `max(0, W' . h + vb)`.
    #[allow(dead_code)]
    pub fn reconstruct(&self, hidden: &[f32]) -> Result<Vec<f32>, ConfigError> {
        let mut out = vec![0.0; self.n_visible()];
        self.reconstruct_into(hidden, &mut out)?;
        Ok(out)
    }

    pub fn reconstruct_into(&self, hidden: &[f32], out: &mut [f32]) -> Result<(), ConfigError> {
        if hidden.len() != self.n_hidden() {
            return Err(ConfigError::length("hidden activations", self.n_hidden(), hidden.len()));
        }
        if out.len() != self.n_visible() {
            return Err(ConfigError::length("reconstructed spectrum", self.n_visible(), out.len()));
        }

        self.w_prime.mul_vec_into(hidden, out);
        for (v, b) in out.iter_mut().zip(&self.vb) {
            *v = (*v + b).max(0.0);
        }
        Ok(())
    }
}
