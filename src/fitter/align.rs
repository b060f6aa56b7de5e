//! Reference body alignment.

pub use super::*;

use crate::loss::{LossInput, LossTerms};
use std::slice;

/// A known reference mesh to align onto the evidence of the first body.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceBody {
    /// The mesh in render space.
    pub mesh: Mesh,
    pub variant: ReferenceVariant,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReferenceVariant {
    /// Optimizing a scale and a translation of the mesh.
    ScaleTranslation {
        /// The scale of the reference parameters.
        scale: f32,
        /// The translation of the reference parameters.
        translation: [f32; 3],
    },
    /// Centering the mesh at its bounds without optimization.
    Centered {
        /// The first landmark of the reference, whose x replaces the centre.
        root_landmark: [f32; 3],
    },
}

#[derive(Clone, Debug)]
pub struct ReferenceOutcome<B: Backend> {
    /// The aligned mesh in render space.
    pub mesh: Mesh,
    /// Evidence of the aligned mesh.
    pub evidence: Evidence<B>,
    /// Per-iteration loss breakdowns, empty without optimization.
    pub losses: Vec<LossBreakdown>,
    pub stored: StoreOutcome,
}

impl ReferenceBody {
    /// The mesh centered at its bounds, with x at the root landmark of
    /// [`ReferenceVariant::Centered`].
    pub fn centered(&self) -> Result<Mesh, Error> {
        let ReferenceVariant::Centered { root_landmark } = self.variant else {
            return Err(Error::Validation(
                format!("reference variant ({:?})", self.variant),
                "Centered".into(),
            ));
        };

        let mut mesh = self.mesh.to_owned();
        if let Some((min, max)) = mesh.bounds() {
            let center = [
                root_landmark[0],
                (min[1] + max[1]) / 2.0,
                (min[2] + max[2]) / 2.0,
            ];
            mesh.translate(center.map(|value| -value));
        }
        Ok(mesh)
    }

    /// The initial `(scale, translation)` relative to the fitted record.
    ///
    /// ## Details
    ///
    /// * `scale = scale_fitted / scale_reference`
    /// * `translation = (transl_fitted - translation_reference / scale_reference) * scale_fitted`
    pub fn initial_scale_translation(
        scale: f32,
        translation: [f32; 3],
        record: &ParameterRecord,
    ) -> Result<(f32, [f32; 3]), Error> {
        if scale == 0.0 || !scale.is_finite() {
            return Err(Error::Validation(
                format!("reference scale ({scale})"),
                "finite and nonzero".into(),
            ));
        }
        let (Some(&scale_fitted), [x, y, z]) = (record.scale.first(), record.transl.as_slice())
        else {
            return Err(Error::Validation(
                format!(
                    "fitted scale and translation ({:?}, {:?})",
                    record.scale, record.transl
                ),
                "[1] and [3] values".into(),
            ));
        };

        let transl_fitted = [*x, *y, *z];
        Ok((
            scale_fitted / scale,
            std::array::from_fn(|axis| {
                (transl_fitted[axis] - translation[axis] / scale) * scale_fitted
            }),
        ))
    }
}

impl<M, R, P, C> BodyFitter<M, R, P, C> {
    /// Aligning the reference mesh, skipped if it is already stored.
    pub(super) fn align<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        outcome: &FitOutcome<AB::InnerBackend>,
        reference: &ReferenceBody,
    ) -> Result<ReferenceOutcome<AB::InnerBackend>, Error>
    where
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
        C: FitCache<AB::InnerBackend>,
    {
        let (mesh, losses) = match self.cache.lookup_reference(&input.key)? {
            Some(mesh) => {
                log::info!(target: "body_fit::fitter", "align > reuse");
                (mesh, vec![])
            },
            None => match reference.variant {
                ReferenceVariant::ScaleTranslation { scale, translation } => {
                    let record = outcome.records.first().ok_or_else(|| {
                        Error::Validation("fitted records (0)".into(), "positive".into())
                    })?;
                    let (scale, translation) =
                        ReferenceBody::initial_scale_translation(scale, translation, record)?;
                    self.align_scale_translation::<AB>(input, &reference.mesh, scale, translation)?
                },
                ReferenceVariant::Centered { .. } => (reference.centered()?, vec![]),
            },
        };
        let stored = self.cache.store_reference(&input.key, &mesh)?;

        let device = input.mask.device();
        let (vertices, faces) = Mesh::to_batch::<AB>(slice::from_ref(&mesh), &device)?;
        let rendered = self.render::<AB>(input, vertices, faces)?.valid();
        let predicted = self.predict(input, &rendered)?;

        Ok(ReferenceOutcome {
            mesh,
            evidence: Evidence {
                predicted,
                rendered,
            },
            losses,
            stored,
        })
    }

    /// Optimizing `vertices * scale + translation` on the normal and
    /// silhouette terms of the first body.
    fn align_scale_translation<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        mesh: &Mesh,
        scale: f32,
        translation: [f32; 3],
    ) -> Result<(Mesh, Vec<LossBreakdown>), Error>
    where
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
    {
        let device = input.mask.device();
        let [h, w] = input.image_size();
        let (vertices_reference, faces) = Mesh::to_batch::<AB>(slice::from_ref(mesh), &device)?;
        let [_, v, _] = vertices_reference.dims();
        let [_, f, _] = faces.dims();
        let mask = Tensor::<AB, 3>::from_inner(input.mask.to_owned().slice([0..1, 0..h, 0..w]));

        // [1]
        let mut scale = Tensor::<AB, 1>::from_inner(Tensor::from_floats([scale], &device))
            .require_grad();
        // [1, 3]
        let mut translation =
            Tensor::<AB, 2>::from_inner(Tensor::from_floats([translation], &device))
                .require_grad();
        let mut optimizer_scale = self.config.adam.init::<AB::InnerBackend, 1>();
        let mut optimizer_translation = self.config.adam.init::<AB::InnerBackend, 2>();
        let mut learning_rate = self.learning_rate().init();

        let place = |scale: &Tensor<AB, 1>, translation: &Tensor<AB, 2>| {
            vertices_reference.to_owned() * scale.to_owned().reshape([1, 1, 1]).expand([1, v, 3])
                + translation.to_owned().reshape([1, 1, 3]).expand([1, v, 3])
        };

        log::info!(
            target: "body_fit::fitter",
            "align > {} iterations",
            self.config.iteration_count,
        );

        let mut losses = Vec::with_capacity(self.config.iteration_count as usize);
        for iteration in 0..self.config.iteration_count {
            let terms = self.evaluate_reference::<AB>(
                input,
                mask.to_owned(),
                place(&scale, &translation),
                faces.to_owned(),
            )?;
            let breakdown = Self::check_divergence(iteration, &terms)?;
            let metric = breakdown.total as f64;

            log::debug!(
                target: "body_fit::fitter",
                "align > iteration {iteration}: {breakdown}",
            );

            losses.push(breakdown);
            let grads = terms.total().backward();
            scale = optimizer_scale.step(*learning_rate, scale, &grads);
            translation = optimizer_translation.step(*learning_rate, translation, &grads);
            learning_rate.update(metric);
        }

        let mesh = Mesh::from_tensors(
            place(&scale, &translation).inner().reshape([v, 3]),
            faces.inner().reshape([f, 3]),
        )?;

        Ok((mesh, losses))
    }

    fn evaluate_reference<AB: AutodiffBackend>(
        &self,
        input: &FitInput<AB::InnerBackend>,
        mask: Tensor<AB, 3>,
        vertices: Tensor<AB, 3>,
        faces: Tensor<AB, 3, Int>,
    ) -> Result<LossTerms<AB>, Error>
    where
        R: BodyRenderer<AB>,
        P: NormalPredictor<AB::InnerBackend>,
    {
        let rendered = self.render::<AB>(input, vertices, faces)?;
        let predicted = self.predict(input, &rendered.valid())?.lift::<AB>();

        Ok(self.aggregator().evaluate(LossInput {
            landmarks: None,
            mask,
            predicted,
            rendered,
        }))
    }
}
