//! Optimizing and reusing fitted bodies.

pub use super::*;

use crate::{
    evidence::{PredictedNormals, PredictorInput, RenderOutput},
    function::{project_landmarks, AxisFlip, TensorIntExtension},
    loss::{LandmarkEvidence, LossInput, LossTerms},
    optimize::BodyOptimizer,
};

/// The evaluation of the current bodies against the evidence.
#[derive(Clone, Debug)]
pub struct BodyEvaluation<B: Backend> {
    pub predicted: PredictedNormals<B>,
    pub rendered: RenderOutput<B>,
    pub terms: LossTerms<B>,
    /// `[N, V, 3]` in render space
    pub vertices: Tensor<B, 3>,
}

/// The evidence lifted into the autodiff backend as constants.
#[derive(Clone, Debug)]
pub(super) struct BodyContext<AB: AutodiffBackend> {
    faces: Tensor<AB, 3, Int>,
    /// `(landmark indices, joint indices)`, absent without pairs
    indices: Option<(Tensor<AB, 1, Int>, Tensor<AB, 1, Int>)>,
    landmarks: Tensor<AB, 3>,
    mask: Tensor<AB, 3>,
}

impl<M, R, P, C> BodyFitter<M, R, P, C> {
    /// Optimizing the trainable parameters for the configured iterations.
    pub(super) fn optimize<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
    ) -> Result<FitOutcome<AB::InnerBackend>, Error>
    where
        M: BodyModel<AB>,
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
    {
        let device = input.mask.device();
        let context = BodyContext::<AB>::new(input, &device);
        let mut parameters =
            BodyParameters::<AB>::from_inner(input.parameters.to_owned()).require_grad();
        let mut optimizer = BodyOptimizer::<AB>::new(&self.config.adam, &self.learning_rate());

        log::info!(
            target: "body_fit::fitter",
            "optimize > {} iterations on {} trainable parameters ({})",
            self.config.iteration_count,
            parameters.trainable_count(),
            parameters.trainable_size_readable(),
        );

        let mut losses = Vec::with_capacity(self.config.iteration_count as usize);
        for iteration in 0..self.config.iteration_count {
            let evaluation = self.evaluate_body(input, &context, &parameters)?;
            let breakdown = Self::check_divergence(iteration, &evaluation.terms)?;

            log::debug!(
                target: "body_fit::fitter",
                "optimize > iteration {iteration}: {breakdown}",
            );

            losses.push(breakdown);
            optimizer.step(&mut parameters, evaluation.terms.total());
        }

        // The final parameters are evaluated once more for a consistent export.
        let evaluation = self.evaluate_body(input, &context, &parameters)?;
        Self::check_divergence(self.config.iteration_count, &evaluation.terms)?;

        let parameters = parameters.valid();
        let BodyEvaluation {
            predicted,
            rendered,
            terms,
            vertices,
        } = evaluation;

        Ok(FitOutcome {
            path: FitPath::Optimized,
            meshes: Mesh::from_batch(vertices.inner(), input.faces.to_owned())?,
            records: parameters.to_records()?,
            parameters: Some(parameters),
            evidence: Evidence {
                predicted: PredictedNormals {
                    normal_back: predicted.normal_back.inner(),
                    normal_front: predicted.normal_front.inner(),
                },
                rendered: rendered.valid(),
            },
            losses,
            diagnostics: (!self.config.is_visualization_suppressed)
                .then(|| terms.overlap.mask_difference.inner()),
            stored: vec![],
            reference: None,
        })
    }

    /// Re-rendering the cached meshes for their evidence.
    pub(super) fn reuse<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        cached: CachedFit,
    ) -> Result<FitOutcome<AB::InnerBackend>, Error>
    where
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
    {
        let device = input.mask.device();
        let (vertices, faces) = Mesh::to_batch::<AB>(&cached.meshes, &device)?;
        let rendered = self.render::<AB>(input, vertices, faces)?.valid();
        let predicted = self.predict(input, &rendered)?;

        Ok(FitOutcome {
            path: FitPath::Reused,
            meshes: cached.meshes,
            records: cached.records,
            parameters: None,
            evidence: Evidence {
                predicted,
                rendered,
            },
            losses: vec![],
            diagnostics: None,
            stored: vec![],
            reference: None,
        })
    }

    /// Posing, rendering and predicting, then aggregating the loss terms.
    pub(super) fn evaluate_body<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        context: &BodyContext<AB>,
        parameters: &BodyParameters<AB>,
    ) -> Result<BodyEvaluation<AB>, Error>
    where
        M: BodyModel<AB>,
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
    {
        let posed = parameters.pose(&self.body_model)?;

        let vertices = AxisFlip::RENDER_FROM_BODY.apply(posed.vertices);
        let rendered = self.render::<AB>(input, vertices.to_owned(), context.faces.to_owned())?;
        let predicted = self.predict(input, &rendered.valid())?.lift::<AB>();

        let landmarks = match &context.indices {
            Some((landmark_indices, joint_indices)) => {
                let [_, joint_count, _] = posed.joints.dims();
                if let Some([_, joint]) =
                    input.landmark_pairs.iter().find(|[_, joint]| *joint >= joint_count)
                {
                    return Err(Error::Validation(
                        format!("joint index ({joint})"),
                        format!("less than {joint_count}"),
                    ));
                }

                let joints = AxisFlip::LANDMARK_FROM_BODY
                    .apply(posed.joints)
                    .select(1, joint_indices.to_owned());
                Some(LandmarkEvidence {
                    projected: project_landmarks(joints),
                    target: context.landmarks.to_owned().select(1, landmark_indices.to_owned()),
                })
            },
            None => None,
        };

        let terms = self.aggregator().evaluate(LossInput {
            landmarks,
            mask: context.mask.to_owned(),
            predicted: predicted.to_owned(),
            rendered: rendered.to_owned(),
        });

        Ok(BodyEvaluation {
            predicted,
            rendered,
            terms,
            vertices,
        })
    }

    /// Rendering and validating the output.
    pub(super) fn render<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        vertices: Tensor<AB, 3>,
        faces: Tensor<AB, 3, Int>,
    ) -> Result<RenderOutput<AB>, Error>
    where
        R: BodyRenderer<AB>,
    {
        let [n, _, _] = vertices.dims();
        let rendered = self.renderer.render(vertices, faces)?;
        rendered.validate(n, input.image_size())?;

        Ok(rendered)
    }

    /// Predicting the clothed normals of the first rendered bodies
    /// with the rendered normals as priors.
    pub(super) fn predict<B: Backend>(
        &self,
        input: &FitInput<B>,
        rendered: &RenderOutput<B>,
    ) -> Result<PredictedNormals<B>, Error>
    where
        P: NormalPredictor<B>,
    {
        let [n, _, _, _] = rendered.normal_front.dims();
        let [h, w] = input.image_size();
        if n > input.body_count() {
            return Err(Error::Validation(
                format!("rendered body count ({n})"),
                format!("at most {}", input.body_count()),
            ));
        }

        let predicted = self.predictor.predict(PredictorInput {
            image: input.image.to_owned().slice([0..n, 0..3, 0..h, 0..w]),
            mask: input.mask.to_owned().slice([0..n, 0..h, 0..w]),
            normal_back_prior: rendered.normal_back.to_owned(),
            normal_front_prior: rendered.normal_front.to_owned(),
        })?;

        let dims = [n, 3, h, w];
        for (name, actual) in [
            ("normal_back", predicted.normal_back.dims()),
            ("normal_front", predicted.normal_front.dims()),
        ] {
            if actual != dims {
                return Err(Error::Collaborator(format!(
                    "The predicted {name} has dims {actual:?}, but {dims:?} were expected"
                )));
            }
        }

        Ok(predicted)
    }

    /// Checking that the total loss is finite.
    pub(super) fn check_divergence<B: Backend>(
        iteration: u64,
        terms: &LossTerms<B>,
    ) -> Result<LossBreakdown, Error> {
        let breakdown = terms.breakdown()?;
        if !breakdown.total.is_finite() {
            log::warn!(
                target: "body_fit::fitter",
                "optimize > diverged at iteration {iteration}: {breakdown}",
            );

            return Err(Error::Divergence {
                iteration,
                loss: breakdown.total,
            });
        }

        Ok(breakdown)
    }
}

impl<AB: AutodiffBackend> BodyContext<AB> {
    fn new(
        input: &FitInput<AB::InnerBackend>,
        device: &AB::Device,
    ) -> Self {
        let indices = (!input.landmark_pairs.is_empty()).then(|| {
            let (landmarks, joints): (Vec<_>, Vec<_>) = input
                .landmark_pairs
                .iter()
                .map(|&[landmark, joint]| (landmark, joint))
                .unzip();
            (
                Tensor::from_indices(&landmarks, device),
                Tensor::from_indices(&joints, device),
            )
        });

        Self {
            faces: Tensor::from_inner(input.faces.to_owned()),
            indices,
            landmarks: Tensor::from_inner(input.landmarks.to_owned()),
            mask: Tensor::from_inner(input.mask.to_owned()),
        }
    }
}
