//! Image evidence collaborators.
//!
//! The differentiable renderer and the normal predictor are external.
//! The fitter owns neither of them and only invokes the contracts below.

pub use crate::backend::{AutodiffBackend, Backend};
pub use burn::tensor::{Int, Tensor};

use crate::error::Error;
use std::fmt;

/// A differentiable mesh renderer producing normal maps and silhouettes.
///
/// It is called on an autodiff backend during optimization, so gradients flow
/// from the outputs back to `vertices`.
pub trait BodyRenderer<B: Backend> {
    /// ## Shapes
    ///
    /// * `vertices` - `[N, V, 3]` in render space
    /// * `faces` - `[N, F, 3]`
    fn render(
        &self,
        vertices: Tensor<B, 3>,
        faces: Tensor<B, 3, Int>,
    ) -> Result<RenderOutput<B>, Error>;
}

/// A frozen network predicting clothed normal maps from the image.
///
/// It runs on an inner backend, so no gradient is ever tracked.
pub trait NormalPredictor<B: Backend> {
    fn predict(
        &self,
        input: PredictorInput<B>,
    ) -> Result<PredictedNormals<B>, Error>;
}

#[derive(Clone)]
pub struct RenderOutput<B: Backend> {
    /// `[N, H, W]`
    pub mask_back: Tensor<B, 3>,
    /// `[N, H, W]`
    pub mask_front: Tensor<B, 3>,
    /// `[N, 3, H, W]` in `[-1, 1]`
    pub normal_back: Tensor<B, 4>,
    /// `[N, 3, H, W]` in `[-1, 1]`
    pub normal_front: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct PredictorInput<B: Backend> {
    /// `[N, 3, H, W]`
    pub image: Tensor<B, 4>,
    /// `[N, H, W]`
    pub mask: Tensor<B, 3>,
    /// `[N, 3, H, W]` rendered from the current body
    pub normal_back_prior: Tensor<B, 4>,
    /// `[N, 3, H, W]` rendered from the current body
    pub normal_front_prior: Tensor<B, 4>,
}

#[derive(Clone)]
pub struct PredictedNormals<B: Backend> {
    /// `[N, 3, H, W]` in `[-1, 1]`
    pub normal_back: Tensor<B, 4>,
    /// `[N, 3, H, W]` in `[-1, 1]`
    pub normal_front: Tensor<B, 4>,
}

/// The final evidence of a fit, kept for downstream consumers.
#[derive(Clone, Debug)]
pub struct Evidence<B: Backend> {
    pub predicted: PredictedNormals<B>,
    pub rendered: RenderOutput<B>,
}

impl<B: Backend> RenderOutput<B> {
    /// Checking the output against the expected `[N, H, W]`.
    pub fn validate(
        &self,
        body_count: usize,
        image_size: [usize; 2],
    ) -> Result<&Self, Error> {
        let [h, w] = image_size;
        let mask_dims = [body_count, h, w];
        let normal_dims = [body_count, 3, h, w];

        for (name, dims) in [
            ("mask_back", self.mask_back.dims()),
            ("mask_front", self.mask_front.dims()),
        ] {
            if dims != mask_dims {
                return Err(Error::Validation(
                    format!("{name}.dims() ({dims:?})"),
                    format!("{mask_dims:?}"),
                ));
            }
        }
        for (name, dims) in [
            ("normal_back", self.normal_back.dims()),
            ("normal_front", self.normal_front.dims()),
        ] {
            if dims != normal_dims {
                return Err(Error::Validation(
                    format!("{name}.dims() ({dims:?})"),
                    format!("{normal_dims:?}"),
                ));
            }
        }

        Ok(self)
    }
}

impl<AB: AutodiffBackend> RenderOutput<AB> {
    /// Dropping the autodiff graph.
    pub fn valid(&self) -> RenderOutput<AB::InnerBackend> {
        RenderOutput {
            mask_back: self.mask_back.to_owned().inner(),
            mask_front: self.mask_front.to_owned().inner(),
            normal_back: self.normal_back.to_owned().inner(),
            normal_front: self.normal_front.to_owned().inner(),
        }
    }
}

impl<B: Backend> PredictedNormals<B> {
    /// Lifting the prediction into an autodiff backend as constants.
    pub fn lift<AB: AutodiffBackend<InnerBackend = B>>(self) -> PredictedNormals<AB> {
        PredictedNormals {
            normal_back: Tensor::from_inner(self.normal_back),
            normal_front: Tensor::from_inner(self.normal_front),
        }
    }
}

impl<B: Backend> fmt::Debug for RenderOutput<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct(&format!("RenderOutput<{}>", B::name()))
            .field("mask_back.dims()", &self.mask_back.dims())
            .field("mask_front.dims()", &self.mask_front.dims())
            .field("normal_back.dims()", &self.normal_back.dims())
            .field("normal_front.dims()", &self.normal_front.dims())
            .finish()
    }
}

impl<B: Backend> fmt::Debug for PredictedNormals<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct(&format!("PredictedNormals<{}>", B::name()))
            .field("normal_back.dims()", &self.normal_back.dims())
            .field("normal_front.dims()", &self.normal_front.dims())
            .finish()
    }
}
