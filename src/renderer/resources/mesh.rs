use std::collections::HashMap;
use std::f32::consts::PI;
use std::path::Path;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::{Vec2, Vec3};
use crate::renderer::resources::vertex::Vertex;

/// CPU-side indexed triangle list
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn new_triangle() -> Self {
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0].into(), [1.0, 0.0, 0.0].into(), [0.0, 0.0].into()),
            Vertex::new([0.5, -0.5, 0.0].into(), [0.0, 1.0, 0.0].into(), [1.0, 0.0].into()),
            Vertex::new([0.0, 0.5, 0.0].into(), [0.0, 0.0, 1.0].into(), [0.5, 1.0].into()),
        ];

        Self::new(vertices, vec![0, 1, 2])
    }

    /// Unit quad in the XY plane facing +Z, textured corner to corner
    pub fn new_textured_quad() -> Self {
        let normal = Vec3::Z;
        let vertices = vec![
            Vertex::new([-0.5, -0.5, 0.0].into(), Vec3::ONE, [0.0, 0.0].into()).with_normal(normal),
            Vertex::new([0.5, -0.5, 0.0].into(), Vec3::ONE, [1.0, 0.0].into()).with_normal(normal),
            Vertex::new([0.5, 0.5, 0.0].into(), Vec3::ONE, [1.0, 1.0].into()).with_normal(normal),
            Vertex::new([-0.5, 0.5, 0.0].into(), Vec3::ONE, [0.0, 1.0].into()).with_normal(normal),
        ];

        // Counter-clockwise winding order
        let indices = vec![
            0, 1, 2,
            2, 3, 0,
        ];

        Self::new(vertices, indices)
    }

    /// Latitude/longitude sphere centered on the origin
    pub fn new_uv_sphere(radius: f32, rings: u32, segments: u32) -> Self {
        let rings = rings.max(2);
        let segments = segments.max(3);

        let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
        for ring in 0..=rings {
            let v = ring as f32 / rings as f32;
            let theta = v * PI;
            for segment in 0..=segments {
                let u = segment as f32 / segments as f32;
                let phi = u * 2.0 * PI;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                let color = normal * 0.5 + Vec3::splat(0.5);
                vertices.push(
                    Vertex::new(normal * radius, color, Vec2::new(u, v)).with_normal(normal),
                );
            }
        }

        let stride = segments + 1;
        let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }

        Self::new(vertices, indices)
    }

    /// Builds an indexed mesh from an unindexed vertex stream, merging exact duplicates
    pub fn from_vertex_stream(stream: impl IntoIterator<Item = Vertex>) -> Self {
        let mut unique: HashMap<Vertex, u32> = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for vertex in stream {
            let index = *unique.entry(vertex).or_insert_with(|| {
                vertices.push(vertex);
                (vertices.len() - 1) as u32
            });
            indices.push(index);
        }

        Self::new(vertices, indices)
    }

    /// Loads every mesh of a Wavefront OBJ file into one deduplicated triangle list
    pub fn load_obj(path: &Path) -> Result<Self> {
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
        )
        .map_err(|e| eyre!("Failed to load model {:?}: {}", path, e))?;

        let stream = models.iter().flat_map(|model| {
            let mesh = &model.mesh;
            mesh.indices.iter().map(move |&index| {
                let i = index as usize;
                let position = Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                );
                let texcoord = if mesh.texcoords.len() >= 2 * i + 2 {
                    // OBJ puts the V origin at the bottom of the image
                    Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
                } else {
                    Vec2::ZERO
                };
                let normal = if mesh.normals.len() >= 3 * i + 3 {
                    Vec3::new(mesh.normals[3 * i], mesh.normals[3 * i + 1], mesh.normals[3 * i + 2])
                } else {
                    Vec3::ZERO
                };
                Vertex::new(position, Vec3::ONE, texcoord).with_normal(normal)
            })
        });

        let mesh = Self::from_vertex_stream(stream);
        log::info!(
            "Loaded {:?}: {} unique vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len(),
        );
        Ok(mesh)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
