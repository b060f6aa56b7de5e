//! Body fitting to single-image evidence.

pub mod align;
pub mod body;
#[cfg(test)]
pub(crate) mod mock;

pub use crate::backend::{AutodiffBackend, Backend};
pub use align::*;
pub use burn::{
    config::Config,
    tensor::{Int, Tensor},
};

use crate::{
    backend::{wgpu_device, WgpuDevice},
    body::{BodyModel, BodyParameters, ParameterRecord},
    cache::{CachedFit, FitCache, FitKey, StoreOutcome},
    error::Error,
    evidence::{BodyRenderer, Evidence, NormalPredictor},
    loss::{LossAggregator, LossBreakdown, LossWeightsConfig},
    mesh::Mesh,
    optimize::{AdamConfig, LearningRateConfig},
};
use std::fmt;

#[derive(Config, Copy, Debug, PartialEq)]
pub struct FitterConfig {
    #[config(default = "AdamConfig::new()")]
    pub adam: AdamConfig,

    /// Overlap ratio below it marks a sample as occluded.
    #[config(default = "0.98")]
    pub body_overlap_threshold: f64,

    /// Overlap ratio above it marks a sample as loosely clothed.
    #[config(default = "0.5")]
    pub cloth_overlap_threshold: f64,

    /// The index of the discrete accelerator, see [`FitterConfig::device`].
    #[config(default = "0")]
    pub device_index: usize,

    /// Skipping the diagnostic images.
    #[config(default = false)]
    pub is_visualization_suppressed: bool,

    #[config(default = "50")]
    pub iteration_count: u64,

    /// The patience is overridden by [`FitterConfig::patience`].
    #[config(default = "LearningRateConfig::new()")]
    pub learning_rate: LearningRateConfig,

    /// Number of non-improving iterations before the learning rate decays.
    #[config(default = "5")]
    pub patience: u64,

    #[config(default = "LossWeightsConfig::new()")]
    pub weights: LossWeightsConfig,
}

/// Body fitter with its collaborators.
///
/// ## Collaborators
///
/// * `body_model` - [`BodyModel`] on the autodiff backend
/// * `renderer` - [`BodyRenderer`] on the autodiff backend
/// * `predictor` - [`NormalPredictor`] on the inner backend
/// * `cache` - [`FitCache`] on the inner backend
#[derive(Clone, Debug)]
pub struct BodyFitter<M, R, P, C> {
    pub config: FitterConfig,
    pub body_model: M,
    pub renderer: R,
    pub predictor: P,
    pub cache: C,
}

/// The evidence of one image.
#[derive(Clone)]
pub struct FitInput<B: Backend> {
    pub key: FitKey,
    /// `[N, 3, H, W]`
    pub image: Tensor<B, 4>,
    /// `[N, H, W]`
    pub mask: Tensor<B, 3>,
    /// Detected landmarks as `(x, y, confidence)`.
    ///
    /// `[N, L, 3]`
    pub landmarks: Tensor<B, 3>,
    /// Pairs of `(landmark index, joint index)` to compare.
    pub landmark_pairs: Vec<[usize; 2]>,
    /// Initial estimates.
    pub parameters: BodyParameters<B>,
    /// `[N, F, 3]`
    pub faces: Tensor<B, 3, Int>,
    pub reference: Option<ReferenceBody>,
}

/// How the result of a fit was obtained.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FitPath {
    Optimized,
    Reused,
}

#[derive(Clone, Debug)]
pub struct FitOutcome<B: Backend> {
    pub path: FitPath,
    /// Exported meshes in render space.
    pub meshes: Vec<Mesh>,
    pub records: Vec<ParameterRecord>,
    /// The optimized parameters, absent when reused.
    pub parameters: Option<BodyParameters<B>>,
    /// Evidence of the exported meshes.
    pub evidence: Evidence<B>,
    /// Per-iteration loss breakdowns.
    pub losses: Vec<LossBreakdown>,
    /// Silhouette differences of the exported meshes (front | back).
    ///
    /// `[N, H, 2W]`, absent when visualization is suppressed or reused.
    pub diagnostics: Option<Tensor<B, 3>>,
    /// Store outcomes per body.
    pub stored: Vec<StoreOutcome>,
    pub reference: Option<ReferenceOutcome<B>>,
}

/// Stages of [`BodyFitter::fit`].
enum FitStage<B: Backend> {
    CheckCache,
    Reuse(CachedFit),
    Optimize,
    Export(FitOutcome<B>),
    ReferenceAlign(FitOutcome<B>),
    Done(FitOutcome<B>),
}

impl<M, R, P, C> BodyFitter<M, R, P, C> {
    pub fn new(
        config: FitterConfig,
        body_model: M,
        renderer: R,
        predictor: P,
        cache: C,
    ) -> Self {
        Self {
            config,
            body_model,
            renderer,
            predictor,
            cache,
        }
    }

    /// Fitting the bodies of one image.
    ///
    /// ## Details
    ///
    /// The stages are `CheckCache -> (Reuse | Optimize) -> Export ->
    /// ReferenceAlign -> Done`.
    /// The inputs are validated before any stage runs.
    /// Nothing is exported when the optimization diverges.
    pub fn fit<AB: AutodiffBackend>(
        &self,
        input: FitInput<AB::InnerBackend>,
    ) -> Result<FitOutcome<AB::InnerBackend>, Error>
    where
        M: BodyModel<AB>,
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
        C: FitCache<AB::InnerBackend>,
    {
        input.validate()?;

        let body_count = input.parameters.body_count();
        let device = input.mask.device();

        log::info!(target: "body_fit::fitter", "fit > {:?} ({body_count} bodies)", input.key);

        let mut stage = FitStage::CheckCache;
        loop {
            stage = match stage {
                FitStage::CheckCache => {
                    match self.cache.lookup(&input.key, body_count, &device)? {
                        Some(cached) => FitStage::Reuse(cached),
                        None => FitStage::Optimize,
                    }
                },
                FitStage::Reuse(cached) => {
                    log::info!(target: "body_fit::fitter", "fit > reuse");
                    FitStage::Export(self.reuse::<AB>(&input, cached)?)
                },
                FitStage::Optimize => {
                    log::info!(target: "body_fit::fitter", "fit > optimize");
                    FitStage::Export(self.optimize::<AB>(&input)?)
                },
                FitStage::Export(mut outcome) => {
                    outcome.stored = self.cache.store(
                        &input.key,
                        &CachedFit {
                            meshes: outcome.meshes.to_owned(),
                            records: outcome.records.to_owned(),
                        },
                    )?;
                    log::info!(
                        target: "body_fit::fitter",
                        "fit > export {:?}",
                        outcome.stored,
                    );
                    FitStage::ReferenceAlign(outcome)
                },
                FitStage::ReferenceAlign(mut outcome) => {
                    if let Some(reference) = &input.reference {
                        log::info!(target: "body_fit::fitter", "fit > align reference");
                        outcome.reference =
                            Some(self.align::<AB>(&input, &outcome, reference)?);
                    }
                    FitStage::Done(outcome)
                },
                FitStage::Done(outcome) => {
                    log::info!(target: "body_fit::fitter", "fit > done {:?}", outcome.path);
                    return Ok(outcome);
                },
            };
        }
    }

    /// The aggregator with the thresholds of the config.
    pub fn aggregator(&self) -> LossAggregator {
        LossAggregator::new(
            self.config.weights,
            self.config.cloth_overlap_threshold,
            self.config.body_overlap_threshold,
        )
    }

    /// The learning rate config with the patience of the config.
    pub fn learning_rate(&self) -> LearningRateConfig {
        self.config.learning_rate.with_patience(self.config.patience)
    }
}

impl<B: Backend> FitInput<B> {
    /// Number of body instances, `N`.
    #[inline]
    pub fn body_count(&self) -> usize {
        self.parameters.body_count()
    }

    /// `[H, W]`
    #[inline]
    pub fn image_size(&self) -> [usize; 2] {
        let [_, h, w] = self.mask.dims();
        [h, w]
    }

    /// Checking the batch dimension and shapes of every input.
    pub fn validate(&self) -> Result<&Self, Error> {
        self.parameters.validate()?;

        let n = self.body_count();
        if n == 0 {
            return Err(Error::Validation("body count (0)".into(), "positive".into()));
        }
        let [h, w] = self.image_size();

        let expect = |name: &str, actual: &[usize], expected: &[usize]| {
            if actual == expected {
                Ok(())
            } else {
                Err(Error::Validation(
                    format!("{name}.dims() ({actual:?})"),
                    format!("{expected:?}"),
                ))
            }
        };
        expect("image", &self.image.dims()[..], &[n, 3, h, w])?;
        expect("mask", &self.mask.dims()[..], &[n, h, w])?;
        let [_, l, _] = self.landmarks.dims();
        expect("landmarks", &self.landmarks.dims()[..], &[n, l, 3])?;
        let [_, f, _] = self.faces.dims();
        expect("faces", &self.faces.dims()[..], &[n, f, 3])?;

        if let Some([landmark, _]) =
            self.landmark_pairs.iter().find(|[landmark, _]| *landmark >= l)
        {
            return Err(Error::Validation(
                format!("landmark index ({landmark})"),
                format!("less than {l}"),
            ));
        }

        Ok(self)
    }
}

impl<B: Backend> fmt::Debug for FitInput<B> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct(&format!("FitInput<{}>", B::name()))
            .field("key", &self.key)
            .field("image.dims()", &self.image.dims())
            .field("mask.dims()", &self.mask.dims())
            .field("landmarks.dims()", &self.landmarks.dims())
            .field("landmark_pairs.len()", &self.landmark_pairs.len())
            .field("parameters", &self.parameters)
            .field("faces.dims()", &self.faces.dims())
            .field("reference", &self.reference)
            .finish()
    }
}

impl FitterConfig {
    /// The accelerator selected by [`FitterConfig::device_index`].
    ///
    /// The fitter itself runs on the device of its input tensors,
    /// so callers create the inputs on this device.
    #[inline]
    pub fn device(&self) -> WgpuDevice {
        wgpu_device(self.device_index)
    }
}

impl Default for FitterConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
