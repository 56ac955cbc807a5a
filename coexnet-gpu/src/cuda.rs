//! CUDA backend: batch dispatch of externally supplied similarity kernels.
//!
//! Uses `cudarc` for CUDA driver access and NVRTC for runtime compilation.
//! The kernel source must define two `extern "C"` entry points:
//!
//! ```text
//! __global__ void coexnet_cluster(
//!     int num_pairs, const float* expressions, int sample_size,
//!     const int* in_index,            // num_pairs × (x, y)
//!     int clustering, float min_expression, int min_samples,
//!     int min_clusters, int max_clusters, int criterion,
//!     int remove_pre_outliers, int remove_post_outliers,
//!     float* work,                    // batch × sample_size × (max_clusters + 4)
//!     signed char* out_k,             // batch
//!     signed char* out_labels);       // batch × sample_size
//!
//! __global__ void coexnet_correlate(
//!     int num_pairs, const float* expressions, int sample_size,
//!     const int* in_index, int correlation, int min_samples,
//!     int max_clusters, const signed char* out_k,
//!     const signed char* out_labels, float* work,
//!     float* out_correlations);       // batch × max_clusters
//! ```

use std::path::Path;
use std::sync::Arc;

use cudarc::driver::{
    CudaContext, CudaFunction, CudaSlice, CudaStream, LaunchConfig, PushKernelArg,
};
use cudarc::nvrtc::compile_ptx;
use tracing::info;

use coexnet_core::{CoexError, Result};

use crate::backend::{BackendKind, BatchBackend, BatchOutput, DeviceInfo, KernelArgs, KernelSession};

/// Name of the clustering kernel entry point.
pub const CLUSTER_KERNEL: &str = "coexnet_cluster";
/// Name of the correlation kernel entry point.
pub const CORRELATE_KERNEL: &str = "coexnet_correlate";

/// Working floats per sample per pair reserved for the kernels.
fn work_stride(args: &KernelArgs) -> usize {
    args.sample_size * (args.max_clusters as usize + 4)
}

fn exec_err(what: &str, e: impl std::fmt::Display) -> CoexError {
    CoexError::BackendExecution(format!("CUDA {what}: {e}"))
}

/// NVIDIA CUDA batch backend.
///
/// Compiles the kernels and uploads the expression matrix once at
/// construction; each [`KernelSession`] gets its own stream and buffers.
pub struct CudaBackend {
    ctx: Arc<CudaContext>,
    ordinal: usize,
    cluster_fn: CudaFunction,
    correlate_fn: CudaFunction,
    expressions: CudaSlice<f32>,
    sample_size: usize,
}

impl CudaBackend {
    /// Create a backend on device `ordinal` for a row-major
    /// `genes × sample_size` expression matrix.
    ///
    /// # Errors
    ///
    /// [`CoexError::BackendCompile`] if the kernel source does not compile
    /// or lacks an entry point; [`CoexError::BackendExecution`] if the
    /// device cannot be opened or the expression upload fails.
    pub fn new(
        ordinal: usize,
        kernel_source: &str,
        expressions: &[f32],
        sample_size: usize,
    ) -> Result<Self> {
        let ctx = CudaContext::new(ordinal).map_err(|e| exec_err("context init", e))?;

        let ptx = compile_ptx(kernel_source)
            .map_err(|e| CoexError::BackendCompile(format!("CUDA kernel compile: {e}")))?;
        let module = ctx
            .load_module(ptx)
            .map_err(|e| CoexError::BackendCompile(format!("CUDA module load: {e}")))?;
        let load = |name: &str| -> Result<CudaFunction> {
            module
                .load_function(name)
                .map_err(|e| CoexError::BackendCompile(format!("CUDA function '{name}': {e}")))
        };
        let cluster_fn = load(CLUSTER_KERNEL)?;
        let correlate_fn = load(CORRELATE_KERNEL)?;

        let stream = ctx.default_stream();
        let expressions = stream
            .clone_htod(expressions)
            .map_err(|e| exec_err("expression upload", e))?;
        stream
            .synchronize()
            .map_err(|e| exec_err("synchronize", e))?;

        info!(ordinal, sample_size, "initialized CUDA similarity backend");
        Ok(Self {
            ctx,
            ordinal,
            cluster_fn,
            correlate_fn,
            expressions,
            sample_size,
        })
    }

    /// Like [`new`](Self::new), reading the kernel source from a file.
    pub fn from_source_file(
        ordinal: usize,
        path: impl AsRef<Path>,
        expressions: &[f32],
        sample_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            CoexError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        Self::new(ordinal, &source, expressions, sample_size)
    }
}

impl BatchBackend for CudaBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CUDA device {}", self.ordinal),
            kind: BackendKind::Cuda,
            total_memory: 0,
            max_parallelism: 1024,
        }
    }

    fn session(&self, args: &KernelArgs) -> Result<Box<dyn KernelSession + '_>> {
        args.validate()?;
        if args.sample_size != self.sample_size {
            return Err(CoexError::InvalidInput(format!(
                "kernel args declare {} samples, expression matrix has {}",
                args.sample_size, self.sample_size
            )));
        }
        let stream = self.ctx.new_stream().map_err(|e| exec_err("stream", e))?;
        let w = args.batch_width;
        let alloc_err = |e| exec_err("alloc", e);
        let work = stream.alloc_zeros::<f32>(w * work_stride(args)).map_err(alloc_err)?;
        let out_k = stream.alloc_zeros::<i8>(w).map_err(alloc_err)?;
        let out_labels = stream
            .alloc_zeros::<i8>(w * args.sample_size)
            .map_err(alloc_err)?;
        let out_correlations = stream
            .alloc_zeros::<f32>(w * args.max_clusters as usize)
            .map_err(alloc_err)?;

        Ok(Box::new(CudaSession {
            backend: self,
            args: args.clone(),
            stream,
            work,
            out_k,
            out_labels,
            out_correlations,
            host_index: Vec::with_capacity(2 * w),
        }))
    }
}

struct CudaSession<'b> {
    backend: &'b CudaBackend,
    args: KernelArgs,
    stream: Arc<CudaStream>,
    work: CudaSlice<f32>,
    out_k: CudaSlice<i8>,
    out_labels: CudaSlice<i8>,
    out_correlations: CudaSlice<f32>,
    host_index: Vec<i32>,
}

impl KernelSession for CudaSession<'_> {
    fn run(&mut self, pairs: &[(u32, u32)], out: &mut BatchOutput) -> Result<()> {
        let args = &self.args;
        if pairs.len() > args.batch_width || out.capacity() < pairs.len() {
            return Err(CoexError::InvalidInput(format!(
                "batch of {} pairs exceeds width {}",
                pairs.len(),
                args.batch_width
            )));
        }
        if pairs.is_empty() {
            return Ok(());
        }

        self.host_index.clear();
        for &(x, y) in pairs {
            self.host_index.push(x as i32);
            self.host_index.push(y as i32);
        }
        let in_index = self
            .stream
            .clone_htod(&self.host_index)
            .map_err(|e| exec_err("htod", e))?;

        let num_pairs = pairs.len() as i32;
        let sample_size = args.sample_size as i32;
        let clustering = args.clustering.code();
        let correlation = match args.correlation {
            coexnet_stats::CorrelationMethod::Pearson => 0i32,
            coexnet_stats::CorrelationMethod::Spearman => 1i32,
        };
        let min_samples = args.min_samples as i32;
        let min_clusters = args.min_clusters as i32;
        let max_clusters = args.max_clusters as i32;
        let criterion = args.criterion.code();
        let pre = args.remove_pre_outliers as i32;
        let post = args.remove_post_outliers as i32;

        let block = args.local_width as u32;
        let cfg = LaunchConfig {
            grid_dim: ((pairs.len() as u32).div_ceil(block), 1, 1),
            block_dim: (block, 1, 1),
            shared_mem_bytes: 0,
        };

        unsafe {
            self.stream
                .launch_builder(&self.backend.cluster_fn)
                .arg(&num_pairs)
                .arg(&self.backend.expressions)
                .arg(&sample_size)
                .arg(&in_index)
                .arg(&clustering)
                .arg(&args.min_expression)
                .arg(&min_samples)
                .arg(&min_clusters)
                .arg(&max_clusters)
                .arg(&criterion)
                .arg(&pre)
                .arg(&post)
                .arg(&mut self.work)
                .arg(&mut self.out_k)
                .arg(&mut self.out_labels)
                .launch(cfg)
        }
        .map_err(|e| exec_err("cluster launch", e))?;

        unsafe {
            self.stream
                .launch_builder(&self.backend.correlate_fn)
                .arg(&num_pairs)
                .arg(&self.backend.expressions)
                .arg(&sample_size)
                .arg(&in_index)
                .arg(&correlation)
                .arg(&min_samples)
                .arg(&max_clusters)
                .arg(&self.out_k)
                .arg(&self.out_labels)
                .arg(&mut self.work)
                .arg(&mut self.out_correlations)
                .launch(cfg)
        }
        .map_err(|e| exec_err("correlate launch", e))?;

        let k = self
            .stream
            .clone_dtoh(&self.out_k)
            .map_err(|e| exec_err("dtoh", e))?;
        let labels = self
            .stream
            .clone_dtoh(&self.out_labels)
            .map_err(|e| exec_err("dtoh", e))?;
        let correlations = self
            .stream
            .clone_dtoh(&self.out_correlations)
            .map_err(|e| exec_err("dtoh", e))?;

        // Asynchronous kernel faults surface here.
        self.stream
            .synchronize()
            .map_err(|e| exec_err("synchronize", e))?;

        let n = pairs.len();
        let samples = n * args.sample_size;
        let slots = n * args.max_clusters as usize;
        out.k[..n].copy_from_slice(&k[..n]);
        out.labels[..samples].copy_from_slice(&labels[..samples]);
        out.correlations[..slots].copy_from_slice(&correlations[..slots]);
        Ok(())
    }
}
