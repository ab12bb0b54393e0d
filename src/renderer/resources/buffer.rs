use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    AllocationError, MemoryLocation,
};
use crate::renderer::error::RenderError;

/// Where a resource's backing memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryDomain {
    /// Host-visible and coherent; written by the CPU without explicit flushes
    HostCoherent,
    /// Device-local; only reachable through transfer commands
    DeviceLocal,
    /// Host-visible and cached; target of GPU-to-CPU read-back copies
    #[cfg(test)]
    HostReadback,
}

impl MemoryDomain {
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryDomain::HostCoherent => MemoryLocation::CpuToGpu,
            MemoryDomain::DeviceLocal => MemoryLocation::GpuOnly,
            #[cfg(test)]
            MemoryDomain::HostReadback => MemoryLocation::GpuToCpu,
        }
    }

    pub fn is_host_visible(self) -> bool {
        self != MemoryDomain::DeviceLocal
    }
}

/// Names the resource when no memory type fits, so setup failures say what was being created
pub fn allocation_error(error: AllocationError, name: &str) -> color_eyre::Report {
    match error {
        AllocationError::NoCompatibleMemoryTypeFound => {
            RenderError::UnsupportedMemoryType { name: name.to_owned() }.into()
        }
        e => e.into(),
    }
}

/// The operations the transfer engine needs from a buffer
pub trait GpuBuffer {
    fn handle(&self) -> vk::Buffer;
    fn size(&self) -> u64;
    fn domain(&self) -> MemoryDomain;
    /// Copies `bytes` to the start of a host-visible buffer
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;
    /// Reads the whole contents of a host-visible buffer
    fn read_bytes(&self) -> Result<Vec<u8>>;
}

/// A buffer handle and the memory bound to it.
///
/// Dropping destroys the buffer first and frees its memory afterward.
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    pub domain: MemoryDomain,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        domain: MemoryDomain,
        name: &str,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { device.create_buffer(&buffer_info, None)? };
        // Owned from here on, so an early return below releases whatever was created
        let mut buffer = Self {
            buffer,
            size,
            domain,

            allocation: None,
            memory_allocator,
            device,
        };

        let requirements = unsafe { buffer.device.get_buffer_memory_requirements(buffer.buffer) };
        let allocation = buffer.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: domain.location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| allocation_error(e, name))?;
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        buffer.allocation = Some(allocation);

        unsafe {
            buffer.device.bind_buffer_memory(buffer.buffer, memory, offset)?;
        }

        Ok(buffer)
    }

    pub fn write<T>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord>
    where
        T: Copy,
    {
        if !self.domain.is_host_visible() {
            return Err(eyre!("Cannot write to a buffer in device-local memory"));
        }

        let allocation = self.allocation
            .as_mut()
            .ok_or_eyre("Buffer allocation already freed")?;
        let copy_record = presser::copy_from_slice_to_offset(data, allocation, start_offset)?;

        Ok(copy_record)
    }
}

impl GpuBuffer for Buffer {
    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn domain(&self) -> MemoryDomain {
        self.domain
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as u64 > self.size {
            return Err(eyre!("{} bytes do not fit a {} byte buffer", bytes.len(), self.size));
        }
        self.write(bytes, 0)?;
        Ok(())
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        let mapped = self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_eyre("Cannot read from a buffer that is not host visible")?;
        Ok(mapped[..self.size as usize].to_vec())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free buffer memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
    }
}
