pub mod matrix;
pub mod weights;

pub use matrix::Matrix;
pub use weights::{WeightSource, Weights};
