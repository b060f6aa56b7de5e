//! Body model collaborator.

pub use super::*;

use crate::error::Error;

/// A parametric body model, e.g., SMPL-X.
///
/// The implementation is frozen; gradients only flow through its inputs.
pub trait BodyModel<B: Backend> {
    fn evaluate(
        &self,
        input: BodyModelInput<B>,
    ) -> Result<BodyModelOutput<B>, Error>;
}

#[derive(Clone, Debug)]
pub struct BodyModelInput<B: Backend> {
    /// `[N, S]`
    pub betas: Tensor<B, 2>,
    /// `[N, J, 3, 3]`
    pub body_pose: Tensor<B, 4>,
    /// `[N, E]`
    pub expression: Tensor<B, 2>,
    /// `[N, 1, 3, 3]`
    pub global_orient: Tensor<B, 4>,
    /// `[N, 1, 3, 3]`
    pub jaw_pose: Tensor<B, 4>,
    /// `[N, H, 3, 3]`
    pub left_hand_pose: Tensor<B, 4>,
    /// `[N, H, 3, 3]`
    pub right_hand_pose: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct BodyModelOutput<B: Backend> {
    /// `[N, K, 3]`
    pub joints: Tensor<B, 3>,
    /// `[N, L, 3]`
    pub landmarks: Tensor<B, 3>,
    /// `[N, V, 3]`
    pub vertices: Tensor<B, 3>,
}

/// The posed body in body space, translated and scaled.
#[derive(Clone, Debug)]
pub struct PosedBody<B: Backend> {
    /// `[N, K, 3]`
    pub joints: Tensor<B, 3>,
    /// `[N, V, 3]`
    pub vertices: Tensor<B, 3>,
}

impl<B: Backend> BodyParameters<B> {
    /// Evaluating the body model and placing the outputs,
    /// `(x + transl) * scale`.
    pub fn pose<M: BodyModel<B>>(
        &self,
        model: &M,
    ) -> Result<PosedBody<B>, Error> {
        let output = model.evaluate(BodyModelInput {
            betas: self.betas.to_owned(),
            body_pose: self.get_body_pose(),
            expression: self.expression.to_owned(),
            global_orient: self.get_global_orient(),
            jaw_pose: self.jaw_pose.to_owned(),
            left_hand_pose: self.left_hand_pose.to_owned(),
            right_hand_pose: self.right_hand_pose.to_owned(),
        })?;

        let n = self.body_count();
        let place = |points: Tensor<B, 3>| -> Result<Tensor<B, 3>, Error> {
            let [points_n, count, _] = points.dims();
            if points_n != n {
                return Err(Error::Collaborator(format!(
                    "The body model returned {points_n} bodies, but {n} were expected"
                )));
            }
            let transl = self.transl.to_owned().unsqueeze_dim::<3>(1).expand([n, count, 3]);
            let scale = self.scale.to_owned().unsqueeze_dim::<3>(1).expand([n, count, 3]);
            Ok((points + transl) * scale)
        };

        Ok(PosedBody {
            joints: place(output.joints)?,
            vertices: place(output.vertices)?,
        })
    }
}
