use ash::vk;
use thiserror::Error;

/// Failures the renderer reports by category.
///
/// These travel inside an `eyre::Report`; callers that care about the category
/// can `downcast_ref::<RenderError>()`.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("geometry needs at least {minimum} vertices, got {count}")]
    InsufficientVertices { count: usize, minimum: usize },

    #[error("invalid index list: {0}")]
    InvalidIndices(String),

    #[error("format {0:?} does not support linear-filter blitting")]
    UnsupportedBlitFormat(vk::Format),

    #[error("no memory type satisfies the requirements of `{name}`")]
    UnsupportedMemoryType { name: String },

    #[error("no suitable physical device found")]
    NoSuitableDevice,

    #[error("swapchain image acquisition failed: {0}")]
    SwapchainAcquire(vk::Result),

    #[error("queue submission failed: {0}")]
    Submit(vk::Result),

    #[error("presentation failed: {0}")]
    Present(vk::Result),

    #[error("command buffer recording failed: {0}")]
    CommandRecording(vk::Result),

    #[error("the swapchain has not been built")]
    SurfaceNotReady,
}
