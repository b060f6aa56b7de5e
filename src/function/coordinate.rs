//! Coordinate conventions.
//!
//! Three spaces meet in body fitting:
//!
//! - *Body space*: the output of the body model after translation and scaling.
//! - *Render space*: the space the renderer consumes. It is also the storage
//!   space of exported meshes, so cached meshes can be re-rendered as they are.
//! - *Landmark space*: the space where 3D joints are projected to 2D landmarks
//!   by `(xy + 1) / 2`.

use burn::tensor::{backend::Backend, Int, Tensor};

/// A per-axis sign flip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisFlip(pub [f32; 3]);

impl AxisFlip {
    /// Body space to landmark space.
    pub const LANDMARK_FROM_BODY: Self = Self([1.0, 1.0, -1.0]);
    /// Body space to render (and storage) space.
    pub const RENDER_FROM_BODY: Self = Self([1.0, -1.0, -1.0]);

    /// Applying the flip on the last dimension of `[..., 3]` points.
    pub fn apply<B: Backend, const D: usize>(
        &self,
        points: Tensor<B, D>,
    ) -> Tensor<B, D> {
        let dims = points.dims();
        let mut signs_dims = [1_usize; D];
        signs_dims[D - 1] = 3;

        let signs = Tensor::<B, 1>::from_floats(self.0, &points.device())
            .reshape(signs_dims)
            .expand(dims);
        points * signs
    }

    /// Applying the flip on host points.
    pub fn apply_point(
        &self,
        point: [f32; 3],
    ) -> [f32; 3] {
        [
            point[0] * self.0[0],
            point[1] * self.0[1],
            point[2] * self.0[2],
        ]
    }

    /// The inverse flip, which is the flip itself.
    #[inline]
    pub const fn inverse(&self) -> Self {
        *self
    }
}

/// Face winding order.
pub struct FaceWinding;

impl FaceWinding {
    /// Reversing the winding order of `[..., 3]` faces, `(a, b, c) -> (a, c, b)`.
    pub fn flip<B: Backend>(faces: Tensor<B, 3, Int>) -> Tensor<B, 3, Int> {
        let [n, f, _] = faces.dims();
        Tensor::cat(
            vec![
                faces.to_owned().slice([0..n, 0..f, 0..1]),
                faces.to_owned().slice([0..n, 0..f, 2..3]),
                faces.slice([0..n, 0..f, 1..2]),
            ],
            2,
        )
    }
}

/// Projecting landmark-space joints onto the normalized image plane.
///
/// `[N, L, 3] -> [N, L, 2]`
pub fn project_landmarks<B: Backend>(joints: Tensor<B, 3>) -> Tensor<B, 3> {
    let [n, l, _] = joints.dims();
    joints.slice([0..n, 0..l, 0..2]).add_scalar(1.0).mul_scalar(0.5)
}
