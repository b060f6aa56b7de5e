//! Mock collaborators.

use crate::{
    backend::Backend,
    body::{property::tests::identity_parameters, BodyModel, BodyModelInput, BodyModelOutput},
    cache::FitKey,
    error::Error,
    evidence::{BodyRenderer, NormalPredictor, PredictedNormals, PredictorInput, RenderOutput},
    fitter::FitInput,
    function::{project_landmarks, AxisFlip},
};
use burn::tensor::{Int, Tensor};

pub(crate) const IMAGE_SIZE: [usize; 2] = [8, 8];
pub(crate) const SQUARE_SIZE: usize = 4;
pub(crate) const TEMPLATE: [[f32; 3]; 4] = [
    [0.0, 0.0, 0.0],
    [0.5, 0.0, 0.0],
    [0.0, 0.5, 0.0],
    [0.0, 0.0, 0.5],
];
pub(crate) const FACES: [[i32; 3]; 4] = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];

/// A tetrahedron rotated by the global orientation and shifted by
/// `0.1 * betas[0]`. The joints are its vertices.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MockBodyModel;

/// A fixed square silhouette shaded by the mean vertex.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct MockRenderer {
    pub is_diverging: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) enum MockPredictor {
    /// Returning the priors.
    #[default]
    Echo,
    /// Returning uniform normals.
    Uniform(f32),
}

impl<B: Backend> BodyModel<B> for MockBodyModel {
    fn evaluate(
        &self,
        input: BodyModelInput<B>,
    ) -> Result<BodyModelOutput<B>, Error> {
        let [n, _] = input.betas.dims();
        let v = TEMPLATE.len();
        let device = input.betas.device();

        let template = Tensor::<B, 2>::from_floats(TEMPLATE, &device)
            .reshape([1, v, 3])
            .expand([n, v, 3]);
        let rotation = input.global_orient.reshape([n, 3, 3]).swap_dims(1, 2);
        let shift = input
            .betas
            .slice([0..n, 0..1])
            .reshape([n, 1, 1])
            .expand([n, v, 3])
            .mul_scalar(0.1);
        let vertices = template.matmul(rotation) + shift;

        Ok(BodyModelOutput {
            joints: vertices.to_owned(),
            landmarks: vertices.to_owned(),
            vertices,
        })
    }
}

impl<B: Backend> BodyRenderer<B> for MockRenderer {
    fn render(
        &self,
        vertices: Tensor<B, 3>,
        _faces: Tensor<B, 3, Int>,
    ) -> Result<RenderOutput<B>, Error> {
        let [n, _, _] = vertices.dims();
        let [h, w] = IMAGE_SIZE;
        let device = vertices.device();

        let mask = square_mask::<B>(n, &device);
        let coverage = mask.to_owned().unsqueeze_dim::<4>(1).expand([n, 3, h, w]);
        let background = coverage.to_owned().sub_scalar(1.0);
        let mut shade = vertices
            .mean_dim(1)
            .reshape([n, 3, 1, 1])
            .expand([n, 3, h, w])
            .tanh();
        if self.is_diverging {
            shade = shade.add_scalar(f64::NAN);
        }

        Ok(RenderOutput {
            mask_back: mask.to_owned(),
            mask_front: mask,
            normal_back: shade.to_owned().neg() * coverage.to_owned() + background.to_owned(),
            normal_front: shade * coverage + background,
        })
    }
}

impl<B: Backend> NormalPredictor<B> for MockPredictor {
    fn predict(
        &self,
        input: PredictorInput<B>,
    ) -> Result<PredictedNormals<B>, Error> {
        Ok(match *self {
            Self::Echo => PredictedNormals {
                normal_back: input.normal_back_prior,
                normal_front: input.normal_front_prior,
            },
            Self::Uniform(value) => PredictedNormals {
                normal_back: input.normal_back_prior.zeros_like().add_scalar(value),
                normal_front: input.normal_front_prior.zeros_like().add_scalar(value),
            },
        })
    }
}

/// `[N, H, W]` with a square at `[1, 1]`
pub(crate) fn square_mask<B: Backend>(
    body_count: usize,
    device: &B::Device,
) -> Tensor<B, 3> {
    let [h, w] = IMAGE_SIZE;
    let s = SQUARE_SIZE;
    Tensor::zeros([body_count, h, w], device).slice_assign(
        [0..body_count, 1..1 + s, 1..1 + s],
        Tensor::ones([body_count, s, s], device),
    )
}

/// The evidence of identity bodies, with landmarks at their projected joints.
pub(crate) fn fit_input<B: Backend>(
    name: &str,
    body_count: usize,
    device: &B::Device,
) -> FitInput<B> {
    let [h, w] = IMAGE_SIZE;
    let parameters = identity_parameters::<B>(body_count, 2, device);

    let joints = parameters.pose(&MockBodyModel).unwrap().joints;
    let [_, l, _] = joints.dims();
    let landmarks = Tensor::cat(
        vec![
            project_landmarks(AxisFlip::LANDMARK_FROM_BODY.apply(joints)),
            Tensor::ones([body_count, l, 1], device),
        ],
        2,
    );
    let faces = Tensor::<B, 2, Int>::from_ints(FACES, device)
        .reshape([1, FACES.len(), 3])
        .expand([body_count, FACES.len(), 3]);

    FitInput {
        key: FitKey::new(name, "mock"),
        image: Tensor::zeros([body_count, 3, h, w], device),
        mask: square_mask(body_count, device),
        landmarks,
        landmark_pairs: (0..l).map(|index| [index, index]).collect(),
        parameters,
        faces,
        reference: None,
    }
}
