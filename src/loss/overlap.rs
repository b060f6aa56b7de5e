//! Overlap ratios between the target silhouette and the rendered body.

pub use super::*;

use crate::{evidence::RenderOutput, function::TensorFloatExtension};

/// Per-sample overlap between the target mask and the rendered evidence.
#[derive(Clone, Debug)]
pub struct Overlap<B: Backend> {
    /// `Σ(mask_target ∧ rendered_foreground) / Σ rendered_foreground`
    ///
    /// `[N]`, `0.0` for an empty rendered foreground.
    pub body_overlap: Tensor<B, 1>,
    /// `Σ|mask_rendered - mask_target| / Σ mask_target`
    ///
    /// `[N]`, `0.0` for an empty target mask.
    pub cloth_overlap: Tensor<B, 1>,
    /// `|mask_rendered - mask_target|` (front | back)
    ///
    /// `[N, H, 2W]`
    pub mask_difference: Tensor<B, 3>,
    /// `mask_target * rendered_foreground` (front | back)
    ///
    /// `[N, H, 2W]`
    pub mask_valid: Tensor<B, 3>,
    pub flags: OverlapFlags<B>,
}

/// Per-sample confidence flags.
#[derive(Clone, Debug)]
pub struct OverlapFlags<B: Backend> {
    /// Low agreement with the rendered foreground, i.e., heavy occlusion
    /// or out-of-frame bodies.
    ///
    /// `[N]`
    pub body: Tensor<B, 1, Bool>,
    /// High disagreement between the masks, i.e., loose clothing.
    ///
    /// `[N]`
    pub cloth: Tensor<B, 1, Bool>,
}

impl<B: Backend> Overlap<B> {
    /// Computing the overlap of the rendered evidence.
    ///
    /// ## Details
    ///
    /// The rendered foreground is where the rendered normal map differs from
    /// the background value sampled at the corner `[0, 0]` of the first front
    /// normal map. It is used instead of the rendered masks since those may
    /// be dilated by the silhouette renderer.
    ///
    /// The outputs are not differentiable.
    pub fn evaluate(
        rendered: &RenderOutput<B>,
        mask_target: Tensor<B, 3>,
        cloth_overlap_threshold: f64,
        body_overlap_threshold: f64,
    ) -> Self {
        let [n, h, w] = mask_target.dims();

        // [N, H, 2W]
        let mask_rendered = Tensor::cat(
            vec![
                rendered.mask_front.to_owned().detach(),
                rendered.mask_back.to_owned().detach(),
            ],
            2,
        );
        let mask_target =
            Tensor::cat(vec![mask_target.to_owned(), mask_target], 2).detach();
        let mask_difference = (mask_rendered - mask_target.to_owned()).abs();

        let cloth_overlap = mask_difference
            .to_owned()
            .sum_per_sample()
            .div_or(mask_target.to_owned().sum_per_sample(), 0.0);

        let background = rendered
            .normal_front
            .to_owned()
            .detach()
            .slice([0..1, 0..1, 0..1, 0..1])
            .into_scalar();
        let foreground = |normal: &Tensor<B, 4>| {
            normal
                .to_owned()
                .detach()
                .slice([0..n, 0..1, 0..h, 0..w])
                .reshape([n, h, w])
                .equal_elem(background)
                .bool_not()
                .float()
        };
        // [N, H, 2W]
        let foreground = Tensor::cat(
            vec![
                foreground(&rendered.normal_front),
                foreground(&rendered.normal_back),
            ],
            2,
        );
        let mask_valid = mask_target * foreground.to_owned();

        let foreground_size = foreground.sum_per_sample();
        let body_overlap = mask_valid
            .to_owned()
            .sum_per_sample()
            .div_or(foreground_size.to_owned(), 0.0);

        // An empty rendered foreground is fully occluded at any threshold.
        let is_empty = foreground_size.equal_elem(0.0);
        let flags = OverlapFlags {
            body: body_overlap
                .to_owned()
                .lower_elem(body_overlap_threshold)
                .float()
                .add(is_empty.float())
                .greater_elem(0.0),
            cloth: cloth_overlap.to_owned().greater_elem(cloth_overlap_threshold),
        };

        Self {
            body_overlap,
            cloth_overlap,
            mask_difference,
            mask_valid,
            flags,
        }
    }
}

impl<B: Backend> OverlapFlags<B> {
    /// Copying the flags to the host as `(cloth, body)`.
    pub fn to_host(&self) -> Result<(Vec<bool>, Vec<bool>), Error> {
        let to_flags = |flags: &Tensor<B, 1, Bool>| -> Result<Vec<bool>, Error> {
            Ok(to_host(flags.to_owned().float())?
                .into_iter()
                .map(|flag| flag > 0.5)
                .collect())
        };
        Ok((to_flags(&self.cloth)?, to_flags(&self.body)?))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    /// A rendered square of `size` pixels at the top-left of an empty
    /// `[H, W]` canvas, with background normals `-1.0`.
    pub(crate) fn rendered_square(
        body_count: usize,
        image_size: [usize; 2],
        size: usize,
        device: &<B as Backend>::Device,
    ) -> RenderOutput<B> {
        let [h, w] = image_size;
        let mut mask = Tensor::<B, 3>::zeros([body_count, h, w], device);
        if size > 0 {
            mask = mask.slice_assign(
                [0..body_count, 1..1 + size, 1..1 + size],
                Tensor::ones([body_count, size, size], device),
            );
        }
        let normal = mask
            .to_owned()
            .mul_scalar(2.0)
            .sub_scalar(1.0)
            .unsqueeze_dim::<4>(1)
            .expand([body_count, 3, h, w]);
        RenderOutput {
            mask_back: mask.to_owned(),
            mask_front: mask,
            normal_back: normal.to_owned(),
            normal_front: normal,
        }
    }

    fn cat_rendered(
        lhs: RenderOutput<B>,
        rhs: RenderOutput<B>,
    ) -> RenderOutput<B> {
        RenderOutput {
            mask_back: Tensor::cat(vec![lhs.mask_back, rhs.mask_back], 0),
            mask_front: Tensor::cat(vec![lhs.mask_front, rhs.mask_front], 0),
            normal_back: Tensor::cat(vec![lhs.normal_back, rhs.normal_back], 0),
            normal_front: Tensor::cat(vec![lhs.normal_front, rhs.normal_front], 0),
        }
    }

    #[test]
    fn evaluate_perfect_match() {
        let device = Default::default();
        let rendered = rendered_square(1, [8, 8], 4, &device);
        let mask_target = rendered.mask_front.to_owned();

        let overlap = Overlap::evaluate(&rendered, mask_target, 0.5, 0.98);

        overlap.cloth_overlap.into_data().assert_approx_eq(
            &Tensor::<B, 1>::from_floats([0.0], &device).into_data(),
            6,
        );
        overlap.body_overlap.into_data().assert_approx_eq(
            &Tensor::<B, 1>::from_floats([1.0], &device).into_data(),
            6,
        );
        let (cloth, body) = overlap.flags.to_host().unwrap();
        assert_eq!(cloth, vec![false]);
        assert_eq!(body, vec![false]);
    }

    #[test]
    fn evaluate_loose_clothing() {
        let device = Default::default();
        // The target silhouette is 4 times larger than the body.
        let rendered = rendered_square(1, [8, 8], 2, &device);
        let mask_target = rendered_square(1, [8, 8], 4, &device).mask_front;

        let overlap = Overlap::evaluate(&rendered, mask_target, 0.5, 0.98);

        // (12 + 12) / (16 + 16)
        overlap.cloth_overlap.into_data().assert_approx_eq(
            &Tensor::<B, 1>::from_floats([0.75], &device).into_data(),
            6,
        );
        overlap.body_overlap.into_data().assert_approx_eq(
            &Tensor::<B, 1>::from_floats([1.0], &device).into_data(),
            6,
        );
        let (cloth, body) = overlap.flags.to_host().unwrap();
        assert_eq!(cloth, vec![true]);
        assert_eq!(body, vec![false]);
    }

    #[test]
    fn evaluate_empty_render_is_occluded() {
        let device = Default::default();
        // Every pixel equals the background value.
        let rendered = rendered_square(2, [8, 8], 0, &device);
        let mask_target = rendered_square(2, [8, 8], 4, &device).mask_front;

        let overlap = Overlap::evaluate(&rendered, mask_target, 0.5, 0.98);

        let body_overlap = to_host(overlap.body_overlap).unwrap();
        let cloth_overlap = to_host(overlap.cloth_overlap).unwrap();
        assert!(body_overlap.iter().chain(&cloth_overlap).all(|v| v.is_finite()));
        assert_eq!(body_overlap, vec![0.0, 0.0]);
        let (_, body) = overlap.flags.to_host().unwrap();
        assert_eq!(body, vec![true, true]);
    }

    #[test]
    fn evaluate_empty_render_at_zero_threshold() {
        let device = Default::default();
        let rendered = cat_rendered(
            rendered_square(1, [8, 8], 0, &device),
            rendered_square(1, [8, 8], 3, &device),
        );
        // The second body covers no target pixel, so its overlap is 0 as well.
        let mask_target = Tensor::cat(
            vec![
                rendered_square(1, [8, 8], 4, &device).mask_front,
                Tensor::zeros([1, 8, 8], &device),
            ],
            0,
        );

        let overlap = Overlap::evaluate(&rendered, mask_target, 0.5, 0.0);

        assert_eq!(to_host(overlap.body_overlap).unwrap(), vec![0.0, 0.0]);
        let (_, body) = overlap.flags.to_host().unwrap();
        assert_eq!(body, vec![true, false]);
    }

    #[test]
    fn evaluate_empty_target_is_finite() {
        let device = Default::default();
        let rendered = rendered_square(1, [8, 8], 3, &device);
        let mask_target = Tensor::<B, 3>::zeros([1, 8, 8], &device);

        let overlap = Overlap::evaluate(&rendered, mask_target, 0.5, 0.98);

        assert_eq!(to_host(overlap.cloth_overlap).unwrap(), vec![0.0]);
        assert_eq!(to_host(overlap.body_overlap).unwrap(), vec![0.0]);
    }
}
