use ash::vk;
use color_eyre::Result;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::error::RenderError;
use crate::renderer::internals::render_pass::RenderPassLayout;
use crate::renderer::internals::swapchain::{Swapchain, SwapchainSettings};

/// What the renderer needs from the window it presents into
pub trait PresentationSurface {
    /// Current size of the drawable area in pixels
    fn drawable_extent(&self) -> vk::Extent2D;
    /// Blocks until the platform delivers more events. Returns `false` once the window is closing.
    fn wait_events(&mut self) -> bool;
    fn was_resized(&self) -> bool;
    fn reset_resized(&mut self);
}

fn is_usable(extent: vk::Extent2D) -> bool {
    extent.width != 0 && extent.height != 0
}

/// Blocks while the drawable area is degenerate, as it is for a minimized window.
///
/// Returns `None` when the window closes before it gets a usable size.
pub fn wait_for_drawable_extent(surface: &mut impl PresentationSurface) -> Option<vk::Extent2D> {
    loop {
        let extent = surface.drawable_extent();
        if is_usable(extent) {
            return Some(extent);
        }
        if !surface.wait_events() {
            return None;
        }
    }
}

/// Blocks until `choose` settles on a non-degenerate swapchain extent.
///
/// Some platforms keep reporting a zero surface extent for a while after the
/// window itself has a size again, so both have to be usable.
pub fn wait_for_swapchain_settings(
    surface: &mut impl PresentationSurface,
    mut choose: impl FnMut(vk::Extent2D) -> Result<SwapchainSettings>,
) -> Result<Option<SwapchainSettings>> {
    loop {
        let Some(drawable_extent) = wait_for_drawable_extent(surface) else {
            return Ok(None);
        };
        let settings = choose(drawable_extent)?;
        if is_usable(settings.extent) {
            return Ok(Some(settings));
        }
        log::debug!("Surface reports a zero extent, waiting for the window");
        if !surface.wait_events() {
            return Ok(None);
        }
    }
}

pub enum TargetState {
    Uninitialized,
    Ready(Swapchain),
    /// The predecessor has been taken and its successor is under construction
    Rebuilding,
}

impl TargetState {
    pub fn swapchain(&self) -> Result<&Swapchain> {
        match self {
            TargetState::Ready(swapchain) => Ok(swapchain),
            _ => Err(RenderError::SurfaceNotReady.into()),
        }
    }

    fn take_predecessor(&mut self) -> Option<Swapchain> {
        match std::mem::replace(self, TargetState::Rebuilding) {
            TargetState::Ready(swapchain) => Some(swapchain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rebuilt {
        image_count: usize,
        /// Set when the image count differs from the predecessor's, or there was none
        image_count_changed: bool,
    },
    /// The window closed while waiting for a usable size
    Closed,
}

/// Presentation target of the renderer: the swapchain and its rebuild protocol
pub struct RenderTarget {
    state: TargetState,
    loader: ash::khr::swapchain::Device,
}

impl RenderTarget {
    pub fn new(dev_ctx: &RenderDeviceContext) -> Self {
        let loader = ash::khr::swapchain::Device::new(
            &dev_ctx.instance.instance,
            &dev_ctx.device.logical,
        );
        Self {
            state: TargetState::Uninitialized,
            loader,
        }
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.state.swapchain()
    }

    /// Replaces the current swapchain with one matching the surface's current size.
    ///
    /// Blocks while the window is minimized. The previous swapchain is handed to
    /// the driver for reuse and destroyed before this returns.
    pub fn rebuild(
        &mut self,
        dev_ctx: &RenderDeviceContext,
        surface: &mut impl PresentationSurface,
        config: &RenderConfig,
    ) -> Result<RebuildOutcome> {
        let dev = &dev_ctx.device;
        let settings = wait_for_swapchain_settings(surface, |drawable_extent| {
            let support = dev_ctx.surface.query_support(dev.physical)?;
            SwapchainSettings::choose(&support, drawable_extent, config.vsync)
        })?;
        let Some(settings) = settings else {
            return Ok(RebuildOutcome::Closed);
        };

        dev.wait_idle()?;

        let previous_image_count = match &self.state {
            TargetState::Ready(swapchain) => Some(swapchain.image_count()),
            _ => None,
        };

        let layout = RenderPassLayout {
            color_format: settings.surface_format.format,
            depth_format: dev.find_depth_format()?,
            samples: if config.msaa {
                dev.limits.max_msaa_samples
            } else {
                vk::SampleCountFlags::TYPE_1
            },
        };

        let predecessor = self.state.take_predecessor();
        let swapchain = Swapchain::new(
            dev,
            &dev_ctx.surface,
            &self.loader,
            settings,
            layout,
            predecessor,
        )?;
        let image_count = swapchain.image_count();
        self.state = TargetState::Ready(swapchain);
        surface.reset_resized();

        Ok(RebuildOutcome::Rebuilt {
            image_count,
            image_count_changed: previous_image_count != Some(image_count),
        })
    }
}
