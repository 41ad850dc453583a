//! Backend abstraction - Multi-backend support
//!
//! Inference runs on NdArray (CPU) unless the `cuda` feature selects the GPU.

use burn::tensor::backend::Backend;

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

/// Device type of [`InferenceBackend`]
pub type InferenceDevice = <InferenceBackend as Backend>::Device;

/// Get the default device
pub fn default_device() -> InferenceDevice {
    InferenceDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "cuda"))]
    fn test_cpu_backend_name() {
        assert_eq!(backend_name(), "NdArray (CPU)");
        let _device = default_device();
    }
}
