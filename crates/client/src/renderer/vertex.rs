//! Vertex layout shared by the line and mesh pipelines.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// A vertex with position and normal. Line vertices carry a zero normal.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const ATTRIBS: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Interleave positions with normals. Missing normals become zero.
pub fn interleave(positions: &[Vec3], normals: &[Vec3]) -> Vec<Vertex> {
    positions
        .iter()
        .enumerate()
        .map(|(i, position)| Vertex {
            position: position.to_array(),
            normal: normals.get(i).copied().unwrap_or(Vec3::ZERO).to_array(),
        })
        .collect()
}
