//! Rotation representations.

use burn::tensor::{backend::Backend, Tensor};

/// The lower bound of vector norms in the Gram-Schmidt process.
pub const NORM_EPSILON: f64 = 1e-12;

/// Converting the continuous 6D representation into rotation matrices.
///
/// ## Shapes
///
/// * `rotations_6d` - `[M, 6]`, viewed as row-major `[M, 3, 2]`
/// * `output` - `[M, 3, 3]`
///
/// ## Details
///
/// The two columns are orthonormalized by Gram-Schmidt, and the third column
/// is their cross product, so the output is always a proper rotation.
pub fn rotation_6d_to_matrix<B: Backend>(rotations_6d: Tensor<B, 2>) -> Tensor<B, 3> {
    let count = rotations_6d.dims()[0];
    let columns = rotations_6d.reshape([count, 3, 2]);

    // [M, 3]
    let a_1 = columns.to_owned().slice([0..count, 0..3, 0..1]).reshape([count, 3]);
    let a_2 = columns.slice([0..count, 0..3, 1..2]).reshape([count, 3]);

    let b_1 = normalize(a_1);
    let dot = b_1.to_owned().mul(a_2.to_owned()).sum_dim(1).expand([count, 3]);
    let b_2 = normalize(a_2 - b_1.to_owned() * dot);
    let b_3 = cross(b_1.to_owned(), b_2.to_owned());

    Tensor::stack::<3>(vec![b_1, b_2, b_3], 2)
}

/// Converting rotation matrices into the continuous 6D representation.
///
/// ## Shapes
///
/// * `matrices` - `[M, 3, 3]`
/// * `output` - `[M, 6]`
pub fn rotation_matrix_to_6d<B: Backend>(matrices: Tensor<B, 3>) -> Tensor<B, 2> {
    let count = matrices.dims()[0];
    matrices.slice([0..count, 0..3, 0..2]).reshape([count, 6])
}

/// Logarithm map of a row-major rotation matrix.
///
/// The output is an axis scaled by the rotation angle in radians.
pub fn axis_angle_from_matrix(m: &[f32; 9]) -> [f32; 3] {
    let m = m.map(|v| v as f64);
    let trace = m[0] + m[4] + m[8];
    let cos = ((trace - 1.0) / 2.0).clamp(-1.0, 1.0);
    let angle = cos.acos();

    // (m21 - m12, m02 - m20, m10 - m01)
    let skew = [m[7] - m[5], m[2] - m[6], m[3] - m[1]];

    let axis_angle = if angle < 1e-6 {
        // First order: log(R) ~ (R - R^T) / 2
        skew.map(|v| v / 2.0)
    } else if std::f64::consts::PI - angle < 1e-4 {
        // The skew part vanishes, so the axis comes from the symmetric part.
        let diagonal = [m[0], m[4], m[8]];
        let major = (0..3)
            .max_by(|&a, &b| diagonal[a].total_cmp(&diagonal[b]))
            .unwrap_or_default();
        let mut axis = [0.0; 3];
        axis[major] = ((diagonal[major] + 1.0) / 2.0).max(0.0).sqrt();
        for other in (0..3).filter(|&i| i != major) {
            let symmetric = (m[major * 3 + other] + m[other * 3 + major]) / 2.0;
            axis[other] = symmetric / (2.0 * axis[major]).max(f64::EPSILON);
        }
        let norm = axis.iter().map(|v| v * v).sum::<f64>().sqrt().max(f64::EPSILON);
        axis.map(|v| v / norm * angle)
    } else {
        let factor = angle / (2.0 * angle.sin());
        skew.map(|v| v * factor)
    };

    axis_angle.map(|v| v as f32)
}

/// `[M, 3] -> [M, 3]`
fn normalize<B: Backend>(vectors: Tensor<B, 2>) -> Tensor<B, 2> {
    let dims = vectors.dims();
    let norms = vectors
        .to_owned()
        .powf_scalar(2.0)
        .sum_dim(1)
        .sqrt()
        .clamp_min(NORM_EPSILON)
        .expand(dims);
    vectors.div(norms)
}

/// `([M, 3], [M, 3]) -> [M, 3]`
fn cross<B: Backend>(
    lhs: Tensor<B, 2>,
    rhs: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let count = lhs.dims()[0];
    let axis = |tensor: &Tensor<B, 2>, index: usize| {
        tensor.to_owned().slice([0..count, index..index + 1])
    };
    let (l_x, l_y, l_z) = (axis(&lhs, 0), axis(&lhs, 1), axis(&lhs, 2));
    let (r_x, r_y, r_z) = (axis(&rhs, 0), axis(&rhs, 1), axis(&rhs, 2));

    Tensor::cat(
        vec![
            l_y.to_owned() * r_z.to_owned() - l_z.to_owned() * r_y.to_owned(),
            l_z * r_x.to_owned() - l_x.to_owned() * r_z,
            l_x * r_y - l_y * r_x,
        ],
        1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn rotation_6d_to_matrix_identity() {
        let device = Default::default();
        let rotations_6d =
            Tensor::<NdArray<f32>, 2>::from_floats([[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]], &device);

        let output = rotation_6d_to_matrix(rotations_6d);
        let target = Tensor::<NdArray<f32>, 3>::from_floats(
            [[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]],
            &device,
        );

        output.into_data().assert_approx_eq(&target.into_data(), 6);
    }

    #[test]
    fn rotation_6d_to_matrix_orthonormal() {
        let device = Default::default();
        let rotations_6d = Tensor::<NdArray<f32>, 2>::from_floats(
            [[0.3, -1.2, 2.0, 0.5, -0.7, 0.9], [4.0, 0.1, 0.0, 3.0, 1.0, -2.0]],
            &device,
        );

        let matrices = rotation_6d_to_matrix(rotations_6d);
        let gram = matrices.to_owned().swap_dims(1, 2).matmul(matrices);
        let identity = Tensor::<NdArray<f32>, 3>::from_floats(
            [
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            ],
            &device,
        );

        gram.into_data().assert_approx_eq(&identity.into_data(), 4);
    }

    #[test]
    fn rotation_matrix_to_6d_inverts() {
        let device = Default::default();
        let rotations_6d = Tensor::<NdArray<f32>, 2>::from_floats(
            [[0.0, -1.0, 1.0, 0.0, 0.0, 0.0]],
            &device,
        );

        let output = rotation_matrix_to_6d(rotation_6d_to_matrix(rotations_6d.to_owned()));

        output.into_data().assert_approx_eq(&rotations_6d.into_data(), 6);
    }

    #[test]
    fn axis_angle_from_matrix_quarter_turn() {
        // 90 degrees about z
        let m = [0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let output = axis_angle_from_matrix(&m);

        assert!(output[0].abs() < 1e-6);
        assert!(output[1].abs() < 1e-6);
        assert!((output[2] - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn axis_angle_from_matrix_degenerate() {
        let identity = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        assert_eq!(axis_angle_from_matrix(&identity), [0.0, 0.0, 0.0]);

        // 180 degrees about x
        let half_turn = [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0];
        let output = axis_angle_from_matrix(&half_turn);
        assert!((output[0].abs() - std::f32::consts::PI).abs() < 1e-5);
        assert!(output[1].abs() < 1e-6);
        assert!(output[2].abs() < 1e-6);
    }
}
