pub use burn::{
    backend::{wgpu::WgpuDevice, Wgpu},
    tensor::backend::{AutodiffBackend, Backend},
};

use burn::backend::autodiff;

pub type Autodiff<B> = autodiff::Autodiff<B>;

/// Selecting the discrete accelerator at `index`.
#[inline]
pub fn wgpu_device(index: usize) -> WgpuDevice {
    WgpuDevice::DiscreteGpu(index)
}
