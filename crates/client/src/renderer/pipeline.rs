//! Render pipelines and uniform layouts.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use daeview_core::render::RenderList;
use glam::{Mat3, Mat4, Vec3};
use wgpu::{
    util::DeviceExt, BindGroup, BindGroupLayout, Buffer, Device, Queue, RenderPipeline,
    TextureFormat,
};

use super::Vertex;

/// Shader source embedded at compile time.
const VIEWER_SHADER: &str = include_str!("shaders/viewer.wgsl");

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Lights beyond this count are ignored by the shader.
pub const MAX_LIGHTS: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct LightUniform {
    pub direction: [f32; 4],
    pub color: [f32; 4],
}

/// Per-frame uniforms (camera, lights).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct GlobalUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub ambient: [f32; 4],
    pub counts: [u32; 4],
    pub lights: [LightUniform; MAX_LIGHTS],
}

impl GlobalUniforms {
    pub fn new(view_proj: Mat4, camera_pos: Vec3, list: &RenderList<'_>) -> Self {
        let mut lights = [LightUniform::default(); MAX_LIGHTS];
        for (slot, light) in lights.iter_mut().zip(&list.lights) {
            *slot = LightUniform {
                direction: light.direction.extend(0.0).to_array(),
                color: [light.color.r, light.color.g, light.color.b, 1.0],
            };
        }
        let ambient = list.ambient;
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: camera_pos.extend(1.0).to_array(),
            ambient: [ambient.r, ambient.g, ambient.b, 1.0],
            counts: [list.lights.len().min(MAX_LIGHTS) as u32, 0, 0, 0],
            lights,
        }
    }
}

/// Per-draw uniforms (model matrix, color).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct InstanceUniforms {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 3], // mat3x3 columns are padded to vec4
    pub color: [f32; 4],
}

impl InstanceUniforms {
    pub fn new(model: Mat4, color: [f32; 3]) -> Self {
        let normal = Mat3::from_mat4(model).inverse().transpose();
        let normal = if normal.is_finite() {
            normal
        } else {
            Mat3::IDENTITY
        };
        Self {
            model: model.to_cols_array_2d(),
            normal_matrix: [
                normal.x_axis.extend(0.0).to_array(),
                normal.y_axis.extend(0.0).to_array(),
                normal.z_axis.extend(0.0).to_array(),
            ],
            color: [color[0], color[1], color[2], 1.0],
        }
    }
}

/// Round `size` up to a multiple of `alignment`.
pub fn aligned_stride(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// Both pipelines plus the uniform buffers they share.
pub struct Pipelines {
    pub lit: RenderPipeline,
    pub lines: RenderPipeline,
    pub global_buffer: Buffer,
    pub global_bind_group: BindGroup,
    instance_layout: BindGroupLayout,
    instance_buffer: Buffer,
    instance_bind_group: BindGroup,
    instance_stride: u64,
    instance_capacity: u64,
    staging: Vec<u8>,
}

impl Pipelines {
    pub fn new(device: &Device, format: TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer_shader"),
            source: wgpu::ShaderSource::Wgsl(VIEWER_SHADER.into()),
        });

        let global_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global_bind_group_layout"),
            entries: &[uniform_entry(false, None)],
        });
        let instance_size = std::mem::size_of::<InstanceUniforms>() as u64;
        let instance_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("instance_bind_group_layout"),
            entries: &[uniform_entry(true, NonZeroU64::new(instance_size))],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer_pipeline_layout"),
            bind_group_layouts: &[&global_layout, &instance_layout],
            push_constant_ranges: &[],
        });

        let lit = create_pipeline(
            device,
            &layout,
            &shader,
            format,
            "fs_lit",
            wgpu::PrimitiveTopology::TriangleList,
        );
        let lines = create_pipeline(
            device,
            &layout,
            &shader,
            format,
            "fs_unlit",
            wgpu::PrimitiveTopology::LineList,
        );

        let global_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("global_uniform_buffer"),
            contents: bytemuck::bytes_of(&GlobalUniforms::new(
                Mat4::IDENTITY,
                Vec3::ZERO,
                &RenderList::default(),
            )),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let global_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global_bind_group"),
            layout: &global_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: global_buffer.as_entire_binding(),
            }],
        });

        let alignment = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let instance_stride = aligned_stride(instance_size, alignment);
        let instance_capacity = 16;
        let instance_buffer = create_instance_buffer(device, instance_stride * instance_capacity);
        let instance_bind_group =
            create_instance_bind_group(device, &instance_layout, &instance_buffer);

        Self {
            lit,
            lines,
            global_buffer,
            global_bind_group,
            instance_layout,
            instance_buffer,
            instance_bind_group,
            instance_stride,
            instance_capacity,
            staging: Vec::new(),
        }
    }

    pub fn write_globals(&self, queue: &Queue, uniforms: &GlobalUniforms) {
        queue.write_buffer(&self.global_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Upload one uniform block per draw, growing the buffer as needed.
    pub fn write_instances(&mut self, device: &Device, queue: &Queue, instances: &[InstanceUniforms]) {
        if instances.is_empty() {
            return;
        }
        let needed = instances.len() as u64;
        if needed > self.instance_capacity {
            self.instance_capacity = needed.next_power_of_two();
            self.instance_buffer =
                create_instance_buffer(device, self.instance_stride * self.instance_capacity);
            self.instance_bind_group =
                create_instance_bind_group(device, &self.instance_layout, &self.instance_buffer);
            tracing::debug!(capacity = self.instance_capacity, "grew instance buffer");
        }

        let stride = self.instance_stride as usize;
        self.staging.clear();
        self.staging.resize(stride * instances.len(), 0);
        for (chunk, instance) in self.staging.chunks_exact_mut(stride).zip(instances) {
            let bytes = bytemuck::bytes_of(instance);
            chunk[..bytes.len()].copy_from_slice(bytes);
        }
        queue.write_buffer(&self.instance_buffer, 0, &self.staging);
    }

    pub fn instance_bind_group(&self) -> &BindGroup {
        &self.instance_bind_group
    }

    /// Dynamic offset of the `index`th instance block.
    pub fn instance_offset(&self, index: usize) -> wgpu::DynamicOffset {
        (self.instance_stride * index as u64) as wgpu::DynamicOffset
    }
}

fn uniform_entry(dynamic: bool, min_size: Option<NonZeroU64>) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: min_size,
        },
        count: None,
    }
}

fn create_instance_buffer(device: &Device, size: u64) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("instance_uniform_buffer"),
        size,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_instance_bind_group(device: &Device, layout: &BindGroupLayout, buffer: &Buffer) -> BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("instance_bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<InstanceUniforms>() as u64),
            }),
        }],
    })
}

fn create_pipeline(
    device: &Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: TextureFormat,
    fragment_entry: &'static str,
    topology: wgpu::PrimitiveTopology,
) -> RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(fragment_entry),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Collada winding is not reliable across exporters.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
