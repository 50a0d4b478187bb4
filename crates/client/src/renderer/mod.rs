//! wgpu renderer for daeview.
//!
//! Uses wgpu for cross-platform GPU rendering (WebGL2 on wasm, Vulkan/Metal/DX12 native).
//! The scene is flattened into a [`RenderList`] every frame; vertex buffers are cached per
//! [`GeometryId`] and skinned meshes are re-uploaded in place.

mod pipeline;
mod vertex;

use std::collections::HashMap;

use daeview_core::camera::PerspectiveCamera;
use daeview_core::geometry::{Color, GeometryId};
use daeview_core::render::{RenderList, SceneRenderer};
use daeview_core::scene::Scene;
use glam::Vec3;
use wgpu::{
    util::DeviceExt, Backends, Device, DeviceDescriptor, Instance, InstanceDescriptor,
    PowerPreference, Queue, RequestAdapterOptions, Surface, SurfaceConfiguration, TextureUsages,
};

use pipeline::{GlobalUniforms, InstanceUniforms, Pipelines, DEPTH_FORMAT};
pub use vertex::Vertex;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

struct GpuGeometry {
    buffer: wgpu::Buffer,
    vertex_count: u32,
    /// Frame number this buffer was last drawn in.
    last_used: u64,
}

enum DrawKind {
    Lines,
    Lit,
}

struct Draw {
    geometry: GeometryId,
    kind: DrawKind,
}

/// Physical surface size for a logical size at a pixel ratio.
pub fn physical_size(width: u32, height: u32, pixel_ratio: f64) -> (u32, u32) {
    let scale = |v: u32| ((f64::from(v) * pixel_ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

fn clear_color(hex: u32) -> wgpu::Color {
    let c = Color::from_hex(hex);
    wgpu::Color {
        r: f64::from(c.r),
        g: f64::from(c.g),
        b: f64::from(c.b),
        a: 1.0,
    }
}

/// The main renderer.
pub struct WgpuRenderer {
    surface: Surface<'static>,
    device: Device,
    queue: Queue,
    config: SurfaceConfiguration,
    logical_size: (u32, u32),
    pixel_ratio: f64,
    clear_color: wgpu::Color,
    pipelines: Pipelines,
    depth_view: wgpu::TextureView,
    geometries: HashMap<GeometryId, GpuGeometry>,
    frame: u64,
}

impl WgpuRenderer {
    /// Create a renderer drawing into `target`, initially `width` x `height` physical pixels.
    pub async fn new(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
        clear: u32,
    ) -> anyhow::Result<Self> {
        let backends = if cfg!(target_arch = "wasm32") {
            Backends::GL
        } else {
            Backends::all()
        };
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let surface = instance.create_surface(target)?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("No suitable GPU adapter found"))?;

        tracing::info!("Using adapter: {:?}", adapter.get_info());

        let limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults()
        } else {
            wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("daeview_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits.using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| anyhow::anyhow!("Surface reports no supported formats"))?;

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let pipelines = Pipelines::new(&device, surface_format);
        let depth_view = create_depth_view(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            logical_size: (config.width, config.height),
            config,
            pixel_ratio: 1.0,
            clear_color: clear_color(clear),
            pipelines,
            depth_view,
            geometries: HashMap::new(),
            frame: 0,
        })
    }

    fn reconfigure(&mut self) {
        let (width, height) =
            physical_size(self.logical_size.0, self.logical_size.1, self.pixel_ratio);
        let limit = self.device.limits().max_texture_dimension_2d;
        self.config.width = width.min(limit);
        self.config.height = height.min(limit);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, &self.config);
        tracing::debug!("Resized to {}x{}", self.config.width, self.config.height);
    }

    fn upload(&mut self, geometry: GeometryId, positions: &[Vec3], normals: &[Vec3], dynamic: bool) {
        let frame = self.frame;
        if let Some(cached) = self.geometries.get_mut(&geometry) {
            cached.last_used = frame;
            if dynamic && cached.vertex_count as usize == positions.len() {
                let vertices = vertex::interleave(positions, normals);
                self.queue
                    .write_buffer(&cached.buffer, 0, bytemuck::cast_slice(&vertices));
                return;
            }
            if cached.vertex_count as usize == positions.len() {
                return;
            }
        }

        let vertices = vertex::interleave(positions, normals);
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("geometry_vertex_buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        tracing::debug!(
            geometry = geometry.raw(),
            vertices = vertices.len(),
            dynamic,
            "uploaded geometry"
        );
        self.geometries.insert(
            geometry,
            GpuGeometry {
                buffer,
                vertex_count: vertices.len() as u32,
                last_used: frame,
            },
        );
    }

    /// Upload buffers and uniforms for `list`, returning the draws in order.
    fn prepare(&mut self, list: &RenderList<'_>, camera: &PerspectiveCamera) -> Vec<Draw> {
        let mut draws = Vec::with_capacity(list.lines.len() + list.meshes.len());
        let mut instances = Vec::with_capacity(draws.capacity());

        for line in &list.lines {
            if line.positions.is_empty() {
                continue;
            }
            self.upload(line.geometry, line.positions, &[], false);
            instances.push(InstanceUniforms::new(line.world, line.color.to_array()));
            draws.push(Draw {
                geometry: line.geometry,
                kind: DrawKind::Lines,
            });
        }
        for mesh in &list.meshes {
            if mesh.positions.is_empty() {
                continue;
            }
            self.upload(mesh.geometry, mesh.positions, mesh.normals, mesh.dynamic);
            instances.push(InstanceUniforms::new(mesh.world, mesh.color.to_array()));
            draws.push(Draw {
                geometry: mesh.geometry,
                kind: DrawKind::Lit,
            });
        }

        let globals = GlobalUniforms::new(camera.view_projection_matrix(), camera.position(), list);
        self.pipelines.write_globals(&self.queue, &globals);
        self.pipelines
            .write_instances(&self.device, &self.queue, &instances);

        let frame = self.frame;
        self.geometries.retain(|_, g| g.last_used == frame);
        draws
    }
}

fn create_depth_view(device: &Device, config: &SurfaceConfiguration) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth_texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl SceneRenderer for WgpuRenderer {
    type Error = RenderError;

    fn set_pixel_ratio(&mut self, ratio: f64) {
        let ratio = if ratio.is_finite() && ratio > 0.0 {
            ratio
        } else {
            1.0
        };
        if ratio != self.pixel_ratio {
            self.pixel_ratio = ratio;
            self.reconfigure();
        }
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.logical_size = (width, height);
            self.reconfigure();
        }
    }

    fn size(&self) -> (u32, u32) {
        self.logical_size
    }

    fn render(&mut self, scene: &Scene, camera: &PerspectiveCamera) -> Result<(), RenderError> {
        self.frame += 1;
        let list = RenderList::build(scene);
        let draws = self.prepare(&list, camera);

        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                tracing::warn!("Surface lost or outdated, reconfiguring");
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                tracing::warn!("Surface timed out, skipping frame");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("render_encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.pipelines.global_bind_group, &[]);
            for (index, draw) in draws.iter().enumerate() {
                let Some(geometry) = self.geometries.get(&draw.geometry) else {
                    continue;
                };
                let pipeline = match draw.kind {
                    DrawKind::Lines => &self.pipelines.lines,
                    DrawKind::Lit => &self.pipelines.lit,
                };
                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(
                    1,
                    self.pipelines.instance_bind_group(),
                    &[self.pipelines.instance_offset(index)],
                );
                render_pass.set_vertex_buffer(0, geometry.buffer.slice(..));
                render_pass.draw(0..geometry.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}
