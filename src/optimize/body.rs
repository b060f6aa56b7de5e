//! Optimizer of the trainable body parameters.

pub use super::*;

use crate::body::BodyParameters;
use burn::tensor::ElementConversion;

/// Optimizer for pose, shape, orientation and translation.
///
/// The state is created per fit and discarded afterwards.
#[derive(Clone, Debug)]
pub struct BodyOptimizer<AB: AutodiffBackend> {
    /// Shared learning rate for all trainable parameters.
    pub learning_rate: LearningRate,
    /// Optimizer for [`BodyParameters::betas`].
    pub optimizer_betas: Adam<AB::InnerBackend, 2>,
    /// Optimizer for [`BodyParameters::body_pose`].
    pub optimizer_body_pose: Adam<AB::InnerBackend, 3>,
    /// Optimizer for [`BodyParameters::global_orient`].
    pub optimizer_global_orient: Adam<AB::InnerBackend, 3>,
    /// Optimizer for [`BodyParameters::transl`].
    pub optimizer_transl: Adam<AB::InnerBackend, 2>,
}

impl<AB: AutodiffBackend> BodyOptimizer<AB> {
    pub fn new(
        adam: &AdamConfig,
        learning_rate: &LearningRateConfig,
    ) -> Self {
        Self {
            learning_rate: learning_rate.init(),
            optimizer_betas: adam.init(),
            optimizer_body_pose: adam.init(),
            optimizer_global_orient: adam.init(),
            optimizer_transl: adam.init(),
        }
    }

    /// Back-propagating the scalar loss, updating the trainable parameters in
    /// place, and then updating the learning rate with the loss value.
    pub fn step(
        &mut self,
        parameters: &mut BodyParameters<AB>,
        loss: Tensor<AB, 1>,
    ) -> &mut Self {
        let metric = loss.to_owned().into_scalar().elem::<f64>();
        let grads = loss.backward();
        let learning_rate = *self.learning_rate;

        parameters.betas = self.optimizer_betas.step(
            learning_rate,
            parameters.betas.to_owned(),
            &grads,
        );
        parameters.body_pose = self.optimizer_body_pose.step(
            learning_rate,
            parameters.body_pose.to_owned(),
            &grads,
        );
        parameters.global_orient = self.optimizer_global_orient.step(
            learning_rate,
            parameters.global_orient.to_owned(),
            &grads,
        );
        parameters.transl = self.optimizer_transl.step(
            learning_rate,
            parameters.transl.to_owned(),
            &grads,
        );

        self.learning_rate.update(metric);

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::property::tests::identity_parameters;
    use burn::backend::{Autodiff, NdArray};

    type AB = Autodiff<NdArray<f32>>;

    #[test]
    fn step_moves_translation_only_with_gradient() {
        let device = Default::default();
        let mut parameters = identity_parameters::<AB>(1, 2, &device).require_grad();
        let mut optimizer =
            BodyOptimizer::<AB>::new(&AdamConfig::default(), &LearningRateConfig::default());

        // Pulling x of the translation towards 1.
        let loss = (parameters.transl.to_owned().slice([0..1, 0..1]) - 1.0)
            .powf_scalar(2.0)
            .sum();
        let body_pose = parameters.body_pose.to_owned().inner();
        optimizer.step(&mut parameters, loss);

        let transl = parameters.transl.to_owned().inner();
        transl.into_data().assert_approx_eq(
            &Tensor::<NdArray<f32>, 2>::from_floats([[0.01, 0.0, 0.0]], &device).into_data(),
            5,
        );
        parameters
            .body_pose
            .inner()
            .into_data()
            .assert_approx_eq(&body_pose.into_data(), 6);
        assert_eq!(optimizer.optimizer_transl.time(), 1);
        assert_eq!(optimizer.optimizer_body_pose.time(), 0);
    }
}
