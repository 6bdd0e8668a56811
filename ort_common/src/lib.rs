pub mod yolov8;

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};

/// Registers the global ort environment with the cpu or cuda execution
/// provider, returning the provider name for logging.
///
/// Cuda may silently fail and fall back to cpu presently.
pub fn init_execution_provider(cuda: bool) -> anyhow::Result<&'static str> {
    let (ep, ep_name) = if cuda {
        (CUDAExecutionProvider::default().build(), "cuda")
    } else {
        (CPUExecutionProvider::default().build(), "cpu")
    };
    ort::init().with_execution_providers([ep]).commit()?;
    Ok(ep_name)
}
