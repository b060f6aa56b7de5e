//! Gradient-based optimization.

pub mod adam;
pub mod body;
pub mod learning_rate;

pub use crate::backend::{AutodiffBackend, Backend};
pub use adam::*;
pub use body::*;
pub use burn::{config::Config, tensor::Tensor};
pub use learning_rate::*;
