//! Parametric body state.

pub mod export;
pub mod model;
pub mod property;

pub use crate::backend::{AutodiffBackend, Backend};
pub use burn::tensor::Tensor;
pub use export::*;
pub use model::*;

use std::fmt;

/// Trainable and fixed parameters of `N` body instances.
///
/// Rotations being optimized are kept in the continuous 6D representation
/// (see [`Self::get_body_pose`]), while the fixed ones are rotation matrices.
#[derive(Clone)]
pub struct BodyParameters<B: Backend> {
    /// `[N, J, 6]` (Trainable)
    pub body_pose: Tensor<B, 3>,
    /// `[N, S]` (Trainable)
    pub betas: Tensor<B, 2>,
    /// `[N, E]`
    pub expression: Tensor<B, 2>,
    /// `[N, 1, 6]` (Trainable)
    pub global_orient: Tensor<B, 3>,
    /// `[N, 1, 3, 3]`
    pub jaw_pose: Tensor<B, 4>,
    /// `[N, H, 3, 3]`
    pub left_hand_pose: Tensor<B, 4>,
    /// `[N, H, 3, 3]`
    pub right_hand_pose: Tensor<B, 4>,
    /// `[N, 1]`
    pub scale: Tensor<B, 2>,
    /// `[N, 3]` (Trainable)
    pub transl: Tensor<B, 2>,
}

impl<B: Backend> fmt::Debug for BodyParameters<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct(&format!("BodyParameters<{}>", B::name()))
            .field("body_pose.dims()", &self.body_pose.dims())
            .field("betas.dims()", &self.betas.dims())
            .field("expression.dims()", &self.expression.dims())
            .field("global_orient.dims()", &self.global_orient.dims())
            .field("jaw_pose.dims()", &self.jaw_pose.dims())
            .field("left_hand_pose.dims()", &self.left_hand_pose.dims())
            .field("right_hand_pose.dims()", &self.right_hand_pose.dims())
            .field("scale.dims()", &self.scale.dims())
            .field("transl.dims()", &self.transl.dims())
            .finish()
    }
}
