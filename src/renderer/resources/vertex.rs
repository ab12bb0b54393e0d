use std::hash::{Hash, Hasher};
use std::mem::offset_of;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Fixed attribute slots shared by every pipeline built from a `VertexLayout`
pub const POSITION_LOCATION: u32 = 0;
pub const NORMAL_LOCATION: u32 = 1;
pub const COLOR_LOCATION: u32 = 2;
pub const TEXCOORD_LOCATION: u32 = 3;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub fn new(position: Vec3, color: Vec3, texcoord: Vec2) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            color,
            texcoord,
        }
    }

    pub fn with_normal(mut self, normal: Vec3) -> Self {
        self.normal = normal;
        self
    }

    fn bits(&self) -> [u32; 11] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.texcoord.x.to_bits(),
            self.texcoord.y.to_bits(),
        ]
    }
}

// Exact bitwise match so vertices can key a dedup map
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Which `Vertex` attributes the pipeline's vertex stage consumes.
///
/// The stride is always that of the full `Vertex` record; a layout only decides
/// which slots are declared, so one buffer format serves every shader variant.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum VertexLayout {
    #[default]
    PositionColorTexcoord,
    PositionNormalColorTexcoord,
}

impl VertexLayout {
    pub fn binding_description(self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions(self) -> Vec<vk::VertexInputAttributeDescription> {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            location,
            binding: 0,
            format,
            offset: offset as u32,
        };

        let mut attributes = vec![attribute(
            POSITION_LOCATION,
            vk::Format::R32G32B32_SFLOAT,
            offset_of!(Vertex, position),
        )];
        if self == VertexLayout::PositionNormalColorTexcoord {
            attributes.push(attribute(
                NORMAL_LOCATION,
                vk::Format::R32G32B32_SFLOAT,
                offset_of!(Vertex, normal),
            ));
        }
        attributes.push(attribute(
            COLOR_LOCATION,
            vk::Format::R32G32B32_SFLOAT,
            offset_of!(Vertex, color),
        ));
        attributes.push(attribute(
            TEXCOORD_LOCATION,
            vk::Format::R32G32_SFLOAT,
            offset_of!(Vertex, texcoord),
        ));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 44);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, color), 24);
        assert_eq!(offset_of!(Vertex, texcoord), 36);
    }

    #[test]
    fn test_layout_without_normal_skips_its_slot() {
        let attributes = VertexLayout::PositionColorTexcoord.attribute_descriptions();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![POSITION_LOCATION, COLOR_LOCATION, TEXCOORD_LOCATION]);
        assert_eq!(attributes[1].offset, 24);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_layout_with_normal_declares_every_slot() {
        let attributes = VertexLayout::PositionNormalColorTexcoord.attribute_descriptions();
        let locations: Vec<u32> = attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3]);
        assert_eq!(
            VertexLayout::PositionNormalColorTexcoord.binding_description().stride,
            VertexLayout::PositionColorTexcoord.binding_description().stride,
        );
    }

    #[test]
    fn test_identical_vertices_hash_equal() {
        let a = Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::ONE, Vec2::new(1.0, 0.0));
        let b = a;
        let c = Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::ONE, Vec2::new(1.0, 1.0));

        let set: HashSet<Vertex> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
