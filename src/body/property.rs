//! Body parameters property implementation.

pub use super::*;

use crate::{
    error::Error,
    function::{rotation_6d_to_matrix, rotation_matrix_to_6d},
};
use humansize::{format_size, BINARY};

/// Outer property value getters
impl<B: Backend> BodyParameters<B> {
    /// Body pose. (Outer value)
    ///
    /// The shape is `[N, J, 3, 3]`.
    ///
    /// They are rotation matrices converted from [`Self::body_pose`].
    #[inline]
    pub fn get_body_pose(&self) -> Tensor<B, 4> {
        Self::make_rotations(self.body_pose.to_owned())
    }

    /// Global orientation. (Outer value)
    ///
    /// The shape is `[N, 1, 3, 3]`.
    #[inline]
    pub fn get_global_orient(&self) -> Tensor<B, 4> {
        Self::make_rotations(self.global_orient.to_owned())
    }
}

/// Outer property value makers
impl<B: Backend> BodyParameters<B> {
    /// `[N, K, 6] -> [N, K, 3, 3]`
    pub fn make_rotations(rotations_6d: Tensor<B, 3>) -> Tensor<B, 4> {
        let [n, k, _] = rotations_6d.dims();
        rotation_6d_to_matrix(rotations_6d.reshape([n * k, 6])).reshape([n, k, 3, 3])
    }

    /// `[N, K, 3, 3] -> [N, K, 6]`
    pub fn make_inner_rotations(matrices: Tensor<B, 4>) -> Tensor<B, 3> {
        let [n, k, _, _] = matrices.dims();
        rotation_matrix_to_6d(matrices.reshape([n * k, 3, 3])).reshape([n, k, 6])
    }
}

/// Outer property value setters
impl<B: Backend> BodyParameters<B> {
    /// Setting values for [`BodyParameters::get_body_pose`]
    pub fn set_body_pose(
        &mut self,
        matrices: Tensor<B, 4>,
    ) -> &mut Self {
        self.body_pose = Self::make_inner_rotations(matrices);
        self
    }

    /// Setting values for [`BodyParameters::get_global_orient`]
    pub fn set_global_orient(
        &mut self,
        matrices: Tensor<B, 4>,
    ) -> &mut Self {
        self.global_orient = Self::make_inner_rotations(matrices);
        self
    }
}

/// Autodiff conversions
impl<AB: AutodiffBackend> BodyParameters<AB> {
    /// Tracking the gradients of the trainable parameters.
    pub fn require_grad(mut self) -> Self {
        self.body_pose = self.body_pose.require_grad();
        self.betas = self.betas.require_grad();
        self.global_orient = self.global_orient.require_grad();
        self.transl = self.transl.require_grad();
        self
    }

    /// Dropping the autodiff graph.
    pub fn valid(&self) -> BodyParameters<AB::InnerBackend> {
        BodyParameters {
            body_pose: self.body_pose.to_owned().inner(),
            betas: self.betas.to_owned().inner(),
            expression: self.expression.to_owned().inner(),
            global_orient: self.global_orient.to_owned().inner(),
            jaw_pose: self.jaw_pose.to_owned().inner(),
            left_hand_pose: self.left_hand_pose.to_owned().inner(),
            right_hand_pose: self.right_hand_pose.to_owned().inner(),
            scale: self.scale.to_owned().inner(),
            transl: self.transl.to_owned().inner(),
        }
    }

    /// Lifting the parameters into the autodiff backend without tracking.
    pub fn from_inner(parameters: BodyParameters<AB::InnerBackend>) -> Self {
        Self {
            body_pose: Tensor::from_inner(parameters.body_pose),
            betas: Tensor::from_inner(parameters.betas),
            expression: Tensor::from_inner(parameters.expression),
            global_orient: Tensor::from_inner(parameters.global_orient),
            jaw_pose: Tensor::from_inner(parameters.jaw_pose),
            left_hand_pose: Tensor::from_inner(parameters.left_hand_pose),
            right_hand_pose: Tensor::from_inner(parameters.right_hand_pose),
            scale: Tensor::from_inner(parameters.scale),
            transl: Tensor::from_inner(parameters.transl),
        }
    }
}

/// Attribute getters
impl<B: Backend> BodyParameters<B> {
    /// Number of body instances, `N`.
    #[inline]
    pub fn body_count(&self) -> usize {
        self.transl.dims()[0]
    }

    /// The device.
    #[inline]
    pub fn device(&self) -> B::Device {
        self.transl.device()
    }

    /// Number of trainable scalars.
    #[inline]
    pub fn trainable_count(&self) -> usize {
        self.body_pose.shape().num_elements()
            + self.betas.shape().num_elements()
            + self.global_orient.shape().num_elements()
            + self.transl.shape().num_elements()
    }

    /// Readable size of the trainable parameters.
    #[inline]
    pub fn trainable_size_readable(&self) -> String {
        format_size(
            self.trainable_count() * std::mem::size_of::<B::FloatElem>(),
            BINARY.decimal_places(1),
        )
    }

    /// Checking that every parameter shares the batch dimension
    /// and has the expected trailing dimensions.
    pub fn validate(&self) -> Result<&Self, Error> {
        let n = self.body_count();

        let expect = |name: &str, actual: usize, expected: usize| {
            if actual == expected {
                Ok(())
            } else {
                Err(Error::Validation(
                    format!("{name} ({actual})"),
                    expected.to_string(),
                ))
            }
        };

        let [body_pose_n, _, body_pose_6] = self.body_pose.dims();
        expect("body_pose.dims()[0]", body_pose_n, n)?;
        expect("body_pose.dims()[2]", body_pose_6, 6)?;
        expect("betas.dims()[0]", self.betas.dims()[0], n)?;
        expect("expression.dims()[0]", self.expression.dims()[0], n)?;
        let [global_orient_n, global_orient_1, global_orient_6] = self.global_orient.dims();
        expect("global_orient.dims()[0]", global_orient_n, n)?;
        expect("global_orient.dims()[1]", global_orient_1, 1)?;
        expect("global_orient.dims()[2]", global_orient_6, 6)?;
        for (name, dims) in [
            ("jaw_pose", self.jaw_pose.dims()),
            ("left_hand_pose", self.left_hand_pose.dims()),
            ("right_hand_pose", self.right_hand_pose.dims()),
        ] {
            expect(&format!("{name}.dims()[0]"), dims[0], n)?;
            expect(&format!("{name}.dims()[2]"), dims[2], 3)?;
            expect(&format!("{name}.dims()[3]"), dims[3], 3)?;
        }
        let [scale_n, scale_1] = self.scale.dims();
        expect("scale.dims()[0]", scale_n, n)?;
        expect("scale.dims()[1]", scale_1, 1)?;
        expect("transl.dims()[1]", self.transl.dims()[1], 3)?;

        Ok(self)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;

    const IDENTITY: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    pub(crate) fn identity_parameters<B: Backend>(
        body_count: usize,
        joint_count: usize,
        device: &B::Device,
    ) -> BodyParameters<B> {
        let identity = |k: usize| {
            Tensor::<B, 2>::from_floats(IDENTITY, device)
                .reshape([1, 1, 3, 3])
                .expand([body_count, k, 3, 3])
        };
        let mut parameters = BodyParameters {
            body_pose: Tensor::zeros([body_count, joint_count, 6], device),
            betas: Tensor::zeros([body_count, 10], device),
            expression: Tensor::zeros([body_count, 10], device),
            global_orient: Tensor::zeros([body_count, 1, 6], device),
            jaw_pose: identity(1),
            left_hand_pose: identity(2),
            right_hand_pose: identity(2),
            scale: Tensor::ones([body_count, 1], device),
            transl: Tensor::zeros([body_count, 3], device),
        };
        parameters
            .set_body_pose(identity(joint_count))
            .set_global_orient(identity(1));
        parameters
    }

    #[test]
    fn set_outer_property() {
        let device = Default::default();
        let parameters = identity_parameters::<NdArray<f32>>(2, 4, &device);

        assert_eq!(parameters.body_count(), 2);
        assert_eq!(parameters.body_pose.dims(), [2, 4, 6]);
        assert_eq!(parameters.get_body_pose().dims(), [2, 4, 3, 3]);
        assert_eq!(parameters.trainable_count(), 2 * 4 * 6 + 2 * 10 + 2 * 6 + 2 * 3);

        let identity = Tensor::<NdArray<f32>, 2>::from_floats(IDENTITY, &device)
            .reshape([1, 1, 3, 3])
            .expand([2, 1, 3, 3]);
        parameters
            .get_global_orient()
            .into_data()
            .assert_approx_eq(&identity.into_data(), 6);
        assert!(parameters.validate().is_ok());
    }

    #[test]
    fn validate_mismatched_batch() {
        let device = Default::default();
        let mut parameters = identity_parameters::<NdArray<f32>>(2, 4, &device);
        parameters.betas = Tensor::zeros([3, 10], &device);

        let error = parameters.validate().unwrap_err();
        assert!(matches!(error, Error::Validation(..)), "{error}");
    }
}
