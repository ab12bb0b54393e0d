pub mod instance;
pub mod surface;
pub mod device;
pub mod queue;
pub mod transfer_ctx;
pub mod target;

use color_eyre::Result;
use winit::window::Window;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::surface::Surface;

/// Responsibilities:
/// - Manage the Vulkan instance, surface, device, and queues
/// - Own the memory allocator, command pool and descriptor pools
/// - Run single-time transfer commands
///
/// Fields drop in declaration order: device, then surface, then instance.
pub struct RenderDeviceContext {
    pub device: RenderDevice,
    pub surface: Surface,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(window: &Window) -> Result<Self> {
        let instance = RenderInstance::new(window)?;
        let surface = Surface::new(&instance, window)?;
        let device = RenderDevice::new(&instance, &surface)?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }
}
