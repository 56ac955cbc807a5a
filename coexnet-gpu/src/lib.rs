//! Batch compute backends for pairwise similarity.
//!
//! A [`BatchBackend`] owns device-wide state (the uploaded expression
//! matrix, compiled kernels) and hands each worker its own
//! [`KernelSession`] with private buffers and command stream. A session
//! runs one batch of pair indices through the clustering and correlation
//! kernels and returns per-pair `K`, labels and correlations in a
//! [`BatchOutput`].
//!
//! The CUDA implementation is behind the `cuda` feature. Kernel source is
//! supplied by the caller and compiled at runtime with NVRTC.

pub mod backend;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use backend::{BackendKind, BatchBackend, BatchOutput, DeviceInfo, KernelArgs, KernelSession};

#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
