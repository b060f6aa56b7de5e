use burn::tensor::{backend, Int, Tensor, TensorData};

pub trait TensorIntExtension<B: backend::Backend> {
    /// Index tensor for [`Tensor::select`].
    fn from_indices(
        indices: &[usize],
        device: &B::Device,
    ) -> Self;
}

impl<B: backend::Backend> TensorIntExtension<B> for Tensor<B, 1, Int> {
    fn from_indices(
        indices: &[usize],
        device: &B::Device,
    ) -> Self {
        let indices = indices.iter().map(|&i| i as i64).collect::<Vec<_>>();
        let count = indices.len();

        Tensor::from_data(
            TensorData::new(indices, [count]).convert::<B::IntElem>(),
            device,
        )
    }
}
