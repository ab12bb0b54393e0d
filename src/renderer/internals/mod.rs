/// "Internals" refers to low-level objects the presentation target is assembled from.

pub mod render_pass;
pub mod swapchain;
