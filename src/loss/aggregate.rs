//! Loss aggregation with overlap-driven per-sample weights.

pub use super::*;

use crate::{
    evidence::{PredictedNormals, RenderOutput},
    function::TensorFloatExtension,
};
use burn::config::Config;

/// Keeping the landmark distance differentiable at zero.
pub const DISTANCE_EPSILON: f64 = 1e-12;

#[derive(Config, Copy, Debug, PartialEq)]
pub struct LossWeightsConfig {
    /// Joint weight of samples in loose clothing.
    #[config(default = "50.0")]
    pub joint_loose: f64,

    /// Joint weight of the other samples.
    #[config(default = "5.0")]
    pub joint_tight: f64,

    /// Landmarks of occluded samples at or below it are ignored.
    #[config(default = "0.95")]
    pub landmark_confidence_occluded: f64,

    #[config(default = "1.0")]
    pub normal: f64,

    /// Silhouette weight of the samples that are not occluded.
    #[config(default = "1.0")]
    pub silhouette: f64,
}

/// Computing [`LossTerms`] from the evidence of one iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LossAggregator {
    pub body_overlap_threshold: f64,
    pub cloth_overlap_threshold: f64,
    pub weights: LossWeightsConfig,
}

#[derive(Clone, Debug)]
pub struct LossInput<B: Backend> {
    /// Absent when fitting without landmarks.
    pub landmarks: Option<LandmarkEvidence<B>>,
    /// Target silhouette.
    ///
    /// `[N, H, W]`
    pub mask: Tensor<B, 3>,
    pub predicted: PredictedNormals<B>,
    pub rendered: RenderOutput<B>,
}

#[derive(Clone, Debug)]
pub struct LandmarkEvidence<B: Backend> {
    /// Projected body joints.
    ///
    /// `[N, L, 2]`
    pub projected: Tensor<B, 3>,
    /// Detected landmarks as `(x, y, confidence)`.
    ///
    /// `[N, L, 3]`
    pub target: Tensor<B, 3>,
}

impl LossAggregator {
    pub fn new(
        weights: LossWeightsConfig,
        cloth_overlap_threshold: f64,
        body_overlap_threshold: f64,
    ) -> Self {
        Self {
            body_overlap_threshold,
            cloth_overlap_threshold,
            weights,
        }
    }

    /// Computing the loss terms.
    ///
    /// ## Details
    ///
    /// * Silhouette: `|mask_rendered - mask_target|` over front and back.
    /// * Normal: `|normal_rendered - normal_predicted|` over front and back,
    ///   masked by [`Overlap::mask_valid`].
    /// * Joint: confidence-weighted distances between the detected and
    ///   projected landmarks.
    ///
    /// The weights are derived from [`Overlap::flags`] without branching
    /// on samples.
    pub fn evaluate<B: Backend>(
        &self,
        input: LossInput<B>,
    ) -> LossTerms<B> {
        let LossInput {
            landmarks,
            mask,
            predicted,
            rendered,
        } = input;
        let [n, h, w] = mask.dims();
        let device = mask.device();

        let overlap = Overlap::evaluate(
            &rendered,
            mask.to_owned(),
            self.cloth_overlap_threshold,
            self.body_overlap_threshold,
        );
        // [N]
        let is_loose = overlap.flags.cloth.to_owned().float();
        let is_occluded = overlap.flags.body.to_owned().float();

        let mask_rendered =
            Tensor::cat(vec![rendered.mask_front, rendered.mask_back], 2);
        let mask_target = Tensor::cat(vec![mask.to_owned(), mask], 2);
        let silhouette = LossTerm {
            value: (mask_rendered - mask_target).abs_safe().mean_per_sample(),
            weight: self.silhouette_weight(is_occluded.to_owned()),
        };

        let normal_rendered =
            Tensor::cat(vec![rendered.normal_front, rendered.normal_back], 3);
        let normal_predicted =
            Tensor::cat(vec![predicted.normal_front, predicted.normal_back], 3);
        let mask_valid = overlap
            .mask_valid
            .to_owned()
            .unsqueeze_dim::<4>(1)
            .expand([n, 3, h, 2 * w]);
        let normal = LossTerm {
            value: ((normal_rendered - normal_predicted).abs_safe() * mask_valid)
                .mean_per_sample(),
            weight: Tensor::full([n], self.weights.normal, &device),
        };

        let joint = landmarks.map(|landmarks| {
            let [n, l, _] = landmarks.target.dims();
            let position = landmarks.target.to_owned().slice([0..n, 0..l, 0..2]);
            let confidence = self.landmark_confidence(
                landmarks.target.slice([0..n, 0..l, 2..3]).reshape([n, l]),
                is_occluded.to_owned(),
            );
            let distance = (position - landmarks.projected)
                .powf_scalar(2.0)
                .sum_dim(2)
                .add_scalar(DISTANCE_EPSILON)
                .sqrt()
                .reshape([n, l]);

            LossTerm {
                value: (distance * confidence).mean_dim(1).reshape([n]),
                weight: self.joint_weight(is_loose),
            }
        });

        LossTerms {
            joint,
            normal,
            overlap,
            silhouette,
        }
    }

    /// `[N] -> [N]`
    ///
    /// `is_loose` is `1.0` for samples in loose clothing, else `0.0`.
    pub fn joint_weight<B: Backend>(
        &self,
        is_loose: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let LossWeightsConfig {
            joint_loose,
            joint_tight,
            ..
        } = self.weights;

        is_loose
            .mul_scalar(joint_loose - joint_tight)
            .add_scalar(joint_tight)
    }

    /// `[N, L] -> [N, L]`
    ///
    /// Confidences of occluded samples are zeroed unless they are above
    /// [`LossWeightsConfig::landmark_confidence_occluded`].
    pub fn landmark_confidence<B: Backend>(
        &self,
        confidence: Tensor<B, 2>,
        is_occluded: Tensor<B, 1>,
    ) -> Tensor<B, 2> {
        let [n, l] = confidence.dims();
        let is_occluded = is_occluded.unsqueeze_dim::<2>(1).expand([n, l]);
        let is_confident = confidence
            .to_owned()
            .greater_elem(self.weights.landmark_confidence_occluded)
            .float();

        // c * (1 - o) + c * k * o
        confidence * (is_occluded * is_confident.sub_scalar(1.0)).add_scalar(1.0)
    }

    /// `[N] -> [N]`
    ///
    /// `is_occluded` is `1.0` for occluded samples, else `0.0`.
    pub fn silhouette_weight<B: Backend>(
        &self,
        is_occluded: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        is_occluded
            .neg()
            .add_scalar(1.0)
            .mul_scalar(self.weights.silhouette)
    }
}

impl Default for LossWeightsConfig {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Default for LossAggregator {
    #[inline]
    fn default() -> Self {
        Self::new(Default::default(), 0.5, 0.98)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::overlap::tests::rendered_square;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::TensorData,
    };

    type B = NdArray<f32>;

    fn cat_rendered(outputs: Vec<RenderOutput<B>>) -> RenderOutput<B> {
        let cat = |select: fn(&RenderOutput<B>) -> Tensor<B, 4>| {
            Tensor::cat(outputs.iter().map(select).collect(), 0)
        };
        let cat_mask = |select: fn(&RenderOutput<B>) -> Tensor<B, 3>| {
            Tensor::cat(outputs.iter().map(select).collect(), 0)
        };
        RenderOutput {
            mask_back: cat_mask(|o| o.mask_back.to_owned()),
            mask_front: cat_mask(|o| o.mask_front.to_owned()),
            normal_back: cat(|o| o.normal_back.to_owned()),
            normal_front: cat(|o| o.normal_front.to_owned()),
        }
    }

    fn predicted_from(rendered: &RenderOutput<B>) -> PredictedNormals<B> {
        PredictedNormals {
            normal_back: rendered.normal_back.to_owned(),
            normal_front: rendered.normal_front.to_owned(),
        }
    }

    /// Landmarks at the given confidences, projected with an offset of
    /// `offset` along x.
    fn landmarks(
        confidences: &[f32],
        offset: f32,
        device: &<B as Backend>::Device,
    ) -> LandmarkEvidence<B> {
        let l = confidences.len();
        let target = confidences
            .iter()
            .enumerate()
            .flat_map(|(index, &confidence)| [index as f32 * 0.1, 0.5, confidence])
            .collect::<Vec<_>>();
        let target = Tensor::<B, 3>::from_data(TensorData::new(target, [1, l, 3]), device);
        let projected = target.to_owned().slice([0..1, 0..l, 0..2])
            + Tensor::<B, 3>::from_floats([[[offset, 0.0]]], device).expand([1, l, 2]);

        LandmarkEvidence {
            projected,
            target,
        }
    }

    #[test]
    fn joint_weight_follows_cloth_flags() {
        let device = Default::default();
        // Sample 0 matches the target, sample 1 is far smaller than it.
        let rendered = cat_rendered(vec![
            rendered_square(1, [8, 8], 4, &device),
            rendered_square(1, [8, 8], 2, &device),
        ]);
        let mask = rendered_square(2, [8, 8], 4, &device).mask_front;
        let target = landmarks(&[0.9, 0.8], 0.0, &device);

        let terms = LossAggregator::default().evaluate(LossInput {
            landmarks: Some(LandmarkEvidence {
                projected: Tensor::cat(vec![target.projected.to_owned(); 2], 0),
                target: Tensor::cat(vec![target.target.to_owned(); 2], 0),
            }),
            mask,
            predicted: predicted_from(&rendered),
            rendered,
        });

        terms
            .joint
            .unwrap()
            .weight
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 1>::from_floats([5.0, 50.0], &device).into_data(),
                6,
            );
        terms
            .silhouette
            .weight
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 1>::from_floats([1.0, 1.0], &device).into_data(),
                6,
            );
    }

    #[test]
    fn occluded_sample_relies_on_confident_landmarks() {
        let device = Default::default();
        let rendered = rendered_square(1, [8, 8], 0, &device);
        let mask = rendered_square(1, [8, 8], 4, &device).mask_front;

        let terms = LossAggregator::default().evaluate(LossInput {
            landmarks: Some(landmarks(&[0.5, 0.96, 0.95, 1.0], 1.0, &device)),
            mask,
            predicted: predicted_from(&rendered),
            rendered,
        });
        let breakdown = terms.breakdown().unwrap();

        assert_eq!(breakdown.occluded, vec![true]);
        assert!(breakdown.total.is_finite());
        terms
            .silhouette
            .weight
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 1>::from_floats([0.0], &device).into_data(),
                6,
            );
        // Unit distances weighted by [0.0, 0.96, 0.0, 1.0]
        terms
            .joint
            .unwrap()
            .value
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 1>::from_floats([0.49], &device).into_data(),
                4,
            );
    }

    #[test]
    fn landmark_confidence_of_occluded_samples() {
        let device = Default::default();
        let confidence = Tensor::<B, 2>::from_floats(
            [[0.5, 0.96, 0.95, 1.0], [0.5, 0.96, 0.95, 1.0]],
            &device,
        );
        let is_occluded = Tensor::<B, 1>::from_floats([1.0, 0.0], &device);

        LossAggregator::default()
            .landmark_confidence(confidence, is_occluded)
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 2>::from_floats(
                    [[0.0, 0.96, 0.0, 1.0], [0.5, 0.96, 0.95, 1.0]],
                    &device,
                )
                .into_data(),
                6,
            );
    }

    #[test]
    fn perfect_match_has_zero_total() {
        let device = Default::default();
        let rendered = rendered_square(1, [8, 8], 4, &device);
        let mask = rendered.mask_front.to_owned();

        let terms = LossAggregator::default().evaluate(LossInput {
            landmarks: Some(landmarks(&[0.9, 0.9, 0.9], 0.0, &device)),
            mask,
            predicted: predicted_from(&rendered),
            rendered,
        });
        let breakdown = terms.breakdown().unwrap();

        assert_eq!(breakdown.loose, vec![false]);
        assert_eq!(breakdown.occluded, vec![false]);
        assert_eq!(breakdown.silhouette, 0.0);
        assert_eq!(breakdown.normal, 0.0);
        assert!(breakdown.total.abs() < 1e-4, "{breakdown}");
    }

    #[test]
    fn perfect_match_has_zero_gradient() {
        type AB = Autodiff<B>;

        let device = Default::default();
        let square = rendered_square(1, [8, 8], 4, &device);
        let mask = Tensor::<AB, 3>::from_inner(square.mask_front.to_owned());
        let predicted = PredictedNormals::<B> {
            normal_back: square.normal_back.to_owned(),
            normal_front: square.normal_front.to_owned(),
        }
        .lift::<AB>();
        let rendered = RenderOutput::<AB> {
            mask_back: Tensor::from_inner(square.mask_back).require_grad(),
            mask_front: Tensor::from_inner(square.mask_front).require_grad(),
            normal_back: Tensor::from_inner(square.normal_back).require_grad(),
            normal_front: Tensor::from_inner(square.normal_front).require_grad(),
        };

        let terms = LossAggregator::default().evaluate(LossInput {
            landmarks: None,
            mask,
            predicted,
            rendered: rendered.to_owned(),
        });
        let grads = terms.total().backward();

        let masks = [
            rendered.mask_back.grad(&grads).unwrap(),
            rendered.mask_front.grad(&grads).unwrap(),
        ];
        let normals = [
            rendered.normal_back.grad(&grads).unwrap(),
            rendered.normal_front.grad(&grads).unwrap(),
        ];
        let magnitudes = masks
            .into_iter()
            .map(|grad| grad.flatten::<1>(0, 2))
            .chain(normals.into_iter().map(|grad| grad.flatten::<1>(0, 3)))
            .map(|grad| to_host(grad).unwrap());
        for magnitude in magnitudes {
            assert!(magnitude.iter().all(|&value| value == 0.0), "{magnitude:?}");
        }
    }

    #[test]
    fn normal_difference_is_masked() {
        let device = Default::default();
        let rendered = rendered_square(1, [8, 8], 4, &device);
        let mask = rendered.mask_front.to_owned();
        // The prediction disagrees by 1.0 on every pixel.
        let predicted = PredictedNormals {
            normal_back: rendered.normal_back.to_owned().add_scalar(1.0),
            normal_front: rendered.normal_front.to_owned().add_scalar(1.0),
        };

        let terms = LossAggregator::default().evaluate(LossInput {
            landmarks: None,
            mask,
            predicted,
            rendered,
        });

        assert!(terms.joint.is_none());
        // 16 valid pixels of 64 in each view
        terms
            .normal
            .value
            .into_data()
            .assert_approx_eq(
                &Tensor::<B, 1>::from_floats([0.25], &device).into_data(),
                6,
            );
    }
}
