use crate::error::{ConfigError, WeightsError};

/// Dense row-major `f32` matrix, sized once and never resized.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, ConfigError> {
        if data.len() != rows * cols {
            return Err(ConfigError::length("matrix data", rows * cols, data.len()));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from nested rows, rejecting ragged input.
    pub fn from_rows(what: &'static str, rows: &[Vec<f32>]) -> Result<Self, WeightsError> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != cols {
                return Err(WeightsError::RaggedRow {
                    what,
                    row,
                    expected: cols,
                    actual: values.len(),
                });
            }
            data.extend_from_slice(values);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[allow(dead_code)]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        self.data.chunks(self.cols.max(1)).map(<[f32]>::to_vec).collect()
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    pub fn expect_shape(
        &self,
        what: &'static str,
        rows: usize,
        cols: usize,
    ) -> Result<(), ConfigError> {
        if self.rows != rows || self.cols != cols {
            return Err(ConfigError::ShapeMismatch {
                what,
                expected_rows: rows,
                expected_cols: cols,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    /// `out = self . x`. Lengths are checked by the caller.
    #[inline]
    pub fn mul_vec_into(&self, x: &[f32], out: &mut [f32]) {
        debug_assert_eq!(x.len(), self.cols);
        debug_assert_eq!(out.len(), self.rows);
        for (dst, row) in out.iter_mut().zip(self.data.chunks_exact(self.cols)) {
            *dst = row.iter().zip(x).map(|(w, v)| w * v).sum();
        }
    }
}
