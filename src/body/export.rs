//! Body parameters export implementation.

pub use super::*;

use crate::{error::Error, function::axis_angle_from_matrix};
use burn::record::Record;

/// The persisted parameters of one body instance.
///
/// Rotations are stored as axis-angle vectors.
#[derive(Clone, Debug, PartialEq, Record)]
pub struct ParameterRecord {
    /// `[S]`
    pub betas: Vec<f32>,
    /// `[J * 3]`
    pub body_pose: Vec<f32>,
    /// `[E]`
    pub expression: Vec<f32>,
    /// `[3]`
    pub global_orient: Vec<f32>,
    /// `[3]`
    pub jaw_pose: Vec<f32>,
    /// `[H * 3]`
    pub left_hand_pose: Vec<f32>,
    /// `[H * 3]`
    pub right_hand_pose: Vec<f32>,
    /// `[1]`
    pub scale: Vec<f32>,
    /// `[3]`
    pub transl: Vec<f32>,
}

/// Parameters exporters
impl<B: Backend> BodyParameters<B> {
    /// Exporting one record per body instance.
    pub fn to_records(&self) -> Result<Vec<ParameterRecord>, Error> {
        let n = self.body_count();

        let betas = per_body(to_host(self.betas.to_owned())?, n);
        let body_pose = per_body(axis_angles(self.get_body_pose())?, n);
        let expression = per_body(to_host(self.expression.to_owned())?, n);
        let global_orient = per_body(axis_angles(self.get_global_orient())?, n);
        let jaw_pose = per_body(axis_angles(self.jaw_pose.to_owned())?, n);
        let left_hand_pose = per_body(axis_angles(self.left_hand_pose.to_owned())?, n);
        let right_hand_pose = per_body(axis_angles(self.right_hand_pose.to_owned())?, n);
        let scale = per_body(to_host(self.scale.to_owned())?, n);
        let transl = per_body(to_host(self.transl.to_owned())?, n);

        Ok((0..n)
            .map(|index| ParameterRecord {
                betas: betas[index].to_owned(),
                body_pose: body_pose[index].to_owned(),
                expression: expression[index].to_owned(),
                global_orient: global_orient[index].to_owned(),
                jaw_pose: jaw_pose[index].to_owned(),
                left_hand_pose: left_hand_pose[index].to_owned(),
                right_hand_pose: right_hand_pose[index].to_owned(),
                scale: scale[index].to_owned(),
                transl: transl[index].to_owned(),
            })
            .collect())
    }
}

/// Copying the tensor values to the host in row-major order.
pub fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>, Error> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|error| Error::TensorData(format!("{error:?}")))
}

/// `[N, K, 3, 3] -> [N * K * 3]`
fn axis_angles<B: Backend>(matrices: Tensor<B, 4>) -> Result<Vec<f32>, Error> {
    Ok(to_host(matrices)?
        .chunks_exact(9)
        .flat_map(|m| axis_angle_from_matrix(&std::array::from_fn(|i| m[i])))
        .collect())
}

fn per_body(
    values: Vec<f32>,
    body_count: usize,
) -> Vec<Vec<f32>> {
    let size = values.len() / body_count.max(1);
    (0..body_count)
        .map(|index| values[index * size..(index + 1) * size].to_vec())
        .collect()
}
