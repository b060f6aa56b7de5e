use burn::tensor::{backend, Float, Tensor};

pub trait TensorFloatExtension<B: backend::Backend> {
    /// Absolute value whose gradient is `sign(x)`, i.e., `0` at `0`.
    fn abs_safe(self) -> Self;

    /// Element-wise division where zero denominators yield `fallback`.
    ///
    /// No `NaN` or infinity is produced for a zero denominator,
    /// since the denominator is replaced before dividing.
    fn div_or(
        self,
        rhs: Self,
        fallback: f64,
    ) -> Self;

    /// Mean over every dimension except the leading batch one.
    ///
    /// `[N, ...] -> [N]`
    fn mean_per_sample(self) -> Tensor<B, 1>;

    /// Sum over every dimension except the leading batch one.
    ///
    /// `[N, ...] -> [N]`
    fn sum_per_sample(self) -> Tensor<B, 1>;
}

impl<B: backend::Backend, const D: usize> TensorFloatExtension<B>
    for Tensor<B, D, Float>
{
    fn abs_safe(self) -> Self {
        let sign = self.to_owned().detach().sign();
        self * sign
    }

    fn div_or(
        self,
        rhs: Self,
        fallback: f64,
    ) -> Self {
        let is_zero = rhs.to_owned().equal_elem(0.0);
        self.div(rhs.mask_fill(is_zero.to_owned(), 1.0))
            .mask_fill(is_zero, fallback)
    }

    fn mean_per_sample(self) -> Tensor<B, 1> {
        assert!(D >= 2, "D should be at least 2");

        let sample_count = self.dims()[0];
        self.flatten::<2>(1, D - 1)
            .mean_dim(1)
            .reshape([sample_count])
    }

    fn sum_per_sample(self) -> Tensor<B, 1> {
        assert!(D >= 2, "D should be at least 2");

        let sample_count = self.dims()[0];
        self.flatten::<2>(1, D - 1)
            .sum_dim(1)
            .reshape([sample_count])
    }
}
