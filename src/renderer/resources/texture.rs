use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::transfer_ctx::{image_barrier, subresource_layers};
use crate::renderer::contexts::resource_ctx::upload::ImageTransferDevice;
use crate::renderer::error::RenderError;
use crate::renderer::resources::buffer::{GpuBuffer, MemoryDomain};
use crate::renderer::resources::image::{Image, ImageCreateInfo};

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// `floor(log2(max(width, height))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// One downsampling step of the mip chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    pub src_level: u32,
    pub dst_level: u32,
    pub src_extent: (u32, u32),
    pub dst_extent: (u32, u32),
}

/// Every blit needed to fill levels `1..mip_level_count` from level 0, each halving (clamped to 1)
pub fn mip_chain(width: u32, height: u32) -> Vec<MipBlit> {
    let mut extent = (width.max(1), height.max(1));
    (1..mip_level_count(width, height))
        .map(|level| {
            let next = ((extent.0 / 2).max(1), (extent.1 / 2).max(1));
            let blit = MipBlit {
                src_level: level - 1,
                dst_level: level,
                src_extent: extent,
                dst_extent: next,
            };
            extent = next;
            blit
        })
        .collect()
}

/// A sampled, mipmapped color image and its sampler
pub struct Texture {
    pub image: Image,
    pub sampler: vk::Sampler,
    device: Arc<ash::Device>,
}

impl Texture {
    pub fn load(dev: &RenderDevice, path: &Path) -> Result<Self> {
        let pixels = image::open(path)
            .map_err(|e| eyre!("Failed to decode texture {:?}: {}", path, e))?
            .to_rgba8();
        let (width, height) = pixels.dimensions();
        log::info!("Loaded texture {:?} ({}x{})", path, width, height);
        Self::from_rgba8(dev, pixels.as_raw(), width, height, "Texture")
    }

    /// Black and white checkerboard used when no texture file is configured
    pub fn checkerboard(dev: &RenderDevice, size: u32, cells: u32) -> Result<Self> {
        let pixels = checkerboard_pixels(size, cells);
        Self::from_rgba8(dev, &pixels, size, size, "Checkerboard Texture")
    }

    /// Uploads tightly packed RGBA8 pixels and creates a sampler over the full mip chain
    pub fn from_rgba8(
        dev: &RenderDevice,
        pixels: &[u8],
        width: u32,
        height: u32,
        name: &str,
    ) -> Result<Self> {
        let image = upload_texture_image(dev, pixels, width, height, name)?;
        let mip_levels = image.mip_levels;

        let sampler = {
            let info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .anisotropy_enable(dev.limits.max_sampler_anisotropy.is_some())
                .max_anisotropy(dev.limits.max_sampler_anisotropy.unwrap_or(1.0))
                .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
                .unnormalized_coordinates(false)
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .mip_lod_bias(0.0)
                .min_lod(0.0)
                .max_lod(mip_levels as f32);
            unsafe { dev.logical.create_sampler(&info, None)? }
        };

        log::debug!("Uploaded texture {} with {} mip levels", name, mip_levels);

        Ok(Self {
            image,
            sampler,
            device: dev.logical.clone(),
        })
    }
}

/// Moves RGBA8 pixels into a new sampled image through a staging buffer and generates its mip chain.
///
/// Formats without linear blit support are rejected before anything is allocated.
pub fn upload_texture_image<D: ImageTransferDevice>(
    dev: &D,
    pixels: &[u8],
    width: u32,
    height: u32,
    name: &str,
) -> Result<D::Image> {
    if !dev.supports_linear_blit(TEXTURE_FORMAT) {
        return Err(RenderError::UnsupportedBlitFormat(TEXTURE_FORMAT).into());
    }
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || pixels.len() != expected {
        return Err(eyre!(
            "Texture {} is {}x{} but holds {} bytes, expected {}",
            name, width, height, pixels.len(), expected,
        ));
    }

    let mip_levels = mip_level_count(width, height);

    let mut staging = dev.create_buffer(
        pixels.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryDomain::HostCoherent,
        "Texture Staging Buffer",
    )?;
    staging.write_bytes(pixels)?;

    let image = dev.create_image(&ImageCreateInfo {
        width,
        height,
        mip_levels,
        samples: vk::SampleCountFlags::TYPE_1,
        format: TEXTURE_FORMAT,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::SAMPLED,
        aspect: vk::ImageAspectFlags::COLOR,
        domain: MemoryDomain::DeviceLocal,
        name,
    })?;

    dev.transition_image_layout(
        &image,
        TEXTURE_FORMAT,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        mip_levels,
    )?;
    dev.copy_buffer_to_image(&staging, &image, width, height)?;
    dev.generate_mipmaps(&image, width, height)?;

    Ok(image)
}

/// The commands mip generation records
pub trait MipmapSink {
    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier<'static>,
    );
    /// Linear-filtered blit between two levels of `image`, from `TRANSFER_SRC_OPTIMAL` to `TRANSFER_DST_OPTIMAL`
    fn blit_image(&mut self, image: vk::Image, region: vk::ImageBlit);
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Records the blits that fill every mip level from level 0.
///
/// Expects all levels in `TRANSFER_DST_OPTIMAL` and leaves all of them in `SHADER_READ_ONLY_OPTIMAL`.
pub fn record_mipmap_generation(
    sink: &mut impl MipmapSink,
    image: vk::Image,
    width: u32,
    height: u32,
) {
    let mip_levels = mip_level_count(width, height);

    for blit in mip_chain(width, height) {
        let to_src = image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            blit.src_level,
            1,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        );
        sink.pipeline_barrier(vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER, to_src);

        let region = vk::ImageBlit::default()
            .src_subresource(subresource_layers(vk::ImageAspectFlags::COLOR, blit.src_level))
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: blit.src_extent.0 as i32, y: blit.src_extent.1 as i32, z: 1 },
            ])
            .dst_subresource(subresource_layers(vk::ImageAspectFlags::COLOR, blit.dst_level))
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D { x: blit.dst_extent.0 as i32, y: blit.dst_extent.1 as i32, z: 1 },
            ]);
        sink.blit_image(image, region);

        let to_read = image_barrier(
            image,
            vk::ImageAspectFlags::COLOR,
            blit.src_level,
            1,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::AccessFlags::TRANSFER_READ,
            vk::AccessFlags::SHADER_READ,
        );
        sink.pipeline_barrier(vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER, to_read);
    }

    // The smallest level is only ever a blit destination
    let last_to_read = image_barrier(
        image,
        vk::ImageAspectFlags::COLOR,
        mip_levels - 1,
        1,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::SHADER_READ,
    );
    sink.pipeline_barrier(vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER, last_to_read);
}

fn checkerboard_pixels(size: u32, cells: u32) -> Vec<u8> {
    let cell = (size / cells.max(1)).max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let value = if ((x / cell) + (y / cell)) % 2 == 0 { 255 } else { 40 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::resource_ctx::testing::{FakeCall, FakeTransferDevice};

    fn barrier(base_level: u32, level_count: u32, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> FakeCall {
        FakeCall::Barrier { base_level, level_count, old_layout, new_layout }
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(512, 300), 10);
        assert_eq!(mip_level_count(300, 17), 9);
    }

    #[test]
    fn test_mip_chain_halves_down_to_one_texel() {
        let chain = mip_chain(256, 256);
        assert_eq!(chain.len(), 8);

        let mut expected = 256;
        for (i, blit) in chain.iter().enumerate() {
            assert_eq!(blit.src_level, i as u32);
            assert_eq!(blit.dst_level, i as u32 + 1);
            assert_eq!(blit.src_extent, (expected, expected));
            expected /= 2;
            assert_eq!(blit.dst_extent, (expected, expected));
        }
        assert_eq!(chain.last().unwrap().dst_level, 8);
        assert_eq!(chain.last().unwrap().dst_extent, (1, 1));
    }

    #[test]
    fn test_mip_chain_clamps_short_side() {
        let chain = mip_chain(8, 2);
        let extents: Vec<_> = chain.iter().map(|b| b.dst_extent).collect();
        assert_eq!(extents, vec![(4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_single_texel_has_no_blits() {
        assert!(mip_chain(1, 1).is_empty());
    }

    #[test]
    fn test_checkerboard_alternates() {
        let pixels = checkerboard_pixels(4, 2);
        assert_eq!(pixels.len(), 4 * 4 * 4);
        assert_eq!(pixels[0], 255);
        // third texel of the first row sits in the second cell
        assert_eq!(pixels[2 * 4], 40);
    }

    #[test]
    fn test_unsupported_blit_format_allocates_nothing() {
        let dev = FakeTransferDevice::without_linear_blit();
        let pixels = checkerboard_pixels(4, 2);

        let err = upload_texture_image(&dev, &pixels, 4, 4, "Texture").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::UnsupportedBlitFormat(format)) if *format == TEXTURE_FORMAT,
        ));
        assert!(dev.calls().is_empty());
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn test_pixel_count_mismatch_allocates_nothing() {
        let dev = FakeTransferDevice::default();
        assert!(upload_texture_image(&dev, &[0; 12], 2, 2, "Texture").is_err());
        assert!(upload_texture_image(&dev, &[], 0, 0, "Texture").is_err());
        assert!(dev.calls().is_empty());
    }

    #[test]
    fn test_upload_order() {
        use vk::ImageLayout as L;

        let dev = FakeTransferDevice::default();
        let pixels = checkerboard_pixels(4, 2);
        let image = upload_texture_image(&dev, &pixels, 4, 4, "Texture").unwrap();
        assert_eq!(image.mip_levels, 3);

        let calls = dev.calls();
        let FakeCall::Create { size, domain } = calls[0] else {
            panic!("expected the staging buffer first, got {:?}", calls[0]);
        };
        assert_eq!(size, pixels.len() as u64);
        assert_eq!(domain, MemoryDomain::HostCoherent);
        let FakeCall::CopyToImage { src, .. } = calls[3] else {
            panic!("expected the pixel copy fourth, got {:?}", calls[3]);
        };

        assert_eq!(
            calls[1..],
            [
                FakeCall::CreateImage { width: 4, height: 4, mip_levels: 3 },
                barrier(0, 3, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL),
                FakeCall::CopyToImage { src, width: 4, height: 4 },
                barrier(0, 1, L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
                FakeCall::Blit { src_level: 0, dst_level: 1 },
                barrier(0, 1, L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
                barrier(1, 1, L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
                FakeCall::Blit { src_level: 1, dst_level: 2 },
                barrier(1, 1, L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
                barrier(2, 1, L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL),
            ],
        );
        // The staging buffer is released once the upload returns
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn test_every_level_ends_shader_readable() {
        let dev = FakeTransferDevice::default();
        let pixels = checkerboard_pixels(256, 8);
        upload_texture_image(&dev, &pixels, 256, 256, "Texture").unwrap();

        let mut layouts = vec![vk::ImageLayout::UNDEFINED; 9];
        for call in dev.calls() {
            if let FakeCall::Barrier { base_level, level_count, old_layout, new_layout } = call {
                for level in base_level..base_level + level_count {
                    assert_eq!(layouts[level as usize], old_layout, "level {} out of sequence", level);
                    layouts[level as usize] = new_layout;
                }
            }
        }
        assert!(layouts.iter().all(|&layout| layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        let blits = dev.calls().iter().filter(|call| matches!(call, FakeCall::Blit { .. })).count();
        assert_eq!(blits, 8);
    }

    #[test]
    fn test_single_texel_only_transitions() {
        use vk::ImageLayout as L;

        let dev = FakeTransferDevice::default();
        upload_texture_image(&dev, &[255; 4], 1, 1, "Texture").unwrap();
        let calls = dev.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[4], barrier(0, 1, L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL));
    }
}
