//! # wgpu Device
//!
//! Lowers recorded command lists onto a `wgpu` command encoder.
//!
//! | Command              | Lowered to                                   |
//! |----------------------|----------------------------------------------|
//! | `ResetDrawCount`     | `clear_buffer` over `instance_count`         |
//! | `Barrier`            | pass boundary (wgpu tracks buffer usage)     |
//! | `DispatchCull`       | compute pass, one dispatch                   |
//! | `DrawIndexedIndirect`| render pass, `draw_indexed_indirect`         |
//!
//! One submission per frame. Fences are submission indices plus a flag set
//! by `on_submitted_work_done`.

use crate::backend::{CullingBackend, DeviceLimits, HazardTracker, SceneResources};
use crate::commands::{CommandList, GpuCommand};
use crate::culling::shaders::{
    cull_shader_source, draw_shader_source, CULL_ENTRY_POINT, DRAW_FS_ENTRY_POINT,
    DRAW_VS_ENTRY_POINT,
};
use crate::error::{RenderError, RenderResult};
use crate::frame::{Acquire, FrameTarget};
use crate::indirect::{INSTANCE_COUNT_OFFSET, INSTANCE_COUNT_SIZE};
use crate::instancing::InstanceRecord;
use crate::mesh::Vertex;
use crate::uniforms::{CameraUniform, CullParams};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use wgpu::util::DeviceExt;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Completion handle of one wgpu submission.
pub struct GpuFence {
    index: wgpu::SubmissionIndex,
    done: Arc<AtomicBool>,
}

impl std::fmt::Debug for GpuFence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuFence")
            .field("done", &self.done.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// Per frame slot uniforms and bind groups.
struct SlotResources {
    camera_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    cull_bind_group: wgpu::BindGroup,
    draw_bind_group: wgpu::BindGroup,
}

struct GpuScene {
    cull_pipeline: wgpu::ComputePipeline,
    draw_pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    indirect_buffer: wgpu::Buffer,
    // Referenced only through the slot bind groups.
    _instance_buffer: wgpu::Buffer,
    _visible_buffer: wgpu::Buffer,
    slots: Vec<SlotResources>,
}

/// Renderer on a real GPU through `wgpu`.
pub struct WgpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
    limits: DeviceLimits,
    clear_color: wgpu::Color,
    scene: Option<GpuScene>,
}

impl WgpuRenderer {
    /// Requests an adapter and device for `surface` and configures it.
    ///
    /// # Errors
    ///
    /// `Setup` if no adapter or device is available.
    pub async fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::Setup("no compatible GPU adapter".into()))?;

        info!("GPU adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Frustra Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| RenderError::Setup(format!("device request failed: {e}")))?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(wgpu::TextureFormat::is_srgb)
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| RenderError::Setup("surface reports no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_texture(&device, config.width, config.height);
        let limits = DeviceLimits::from(&device.limits());

        Ok(Self {
            device,
            queue,
            surface,
            config,
            depth_view,
            limits,
            clear_color: wgpu::Color {
                r: 0.05,
                g: 0.06,
                b: 0.08,
                a: 1.0,
            },
            scene: None,
        })
    }

    /// Records the new window size. Takes effect on the next rebuild.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
    }

    /// Background color of the draw pass.
    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    /// The underlying device.
    #[must_use]
    pub const fn device(&self) -> &wgpu::Device {
        &self.device
    }

    fn color_attachment<'a>(
        &self,
        view: &'a wgpu::TextureView,
    ) -> Option<wgpu::RenderPassColorAttachment<'a>> {
        Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(self.clear_color),
                store: wgpu::StoreOp::Store,
            },
        })
    }

    fn depth_attachment(&self) -> Option<wgpu::RenderPassDepthStencilAttachment<'_>> {
        Some(wgpu::RenderPassDepthStencilAttachment {
            view: &self.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        })
    }

    /// Lowers `commands` into `encoder`. Returns true if a render pass ran.
    fn encode(
        &self,
        scene: &GpuScene,
        commands: &CommandList,
        view: &wgpu::TextureView,
        encoder: &mut wgpu::CommandEncoder,
    ) -> RenderResult<bool> {
        let mut drew = false;
        for command in commands {
            match *command {
                GpuCommand::ResetDrawCount => {
                    encoder.clear_buffer(
                        &scene.indirect_buffer,
                        INSTANCE_COUNT_OFFSET,
                        Some(INSTANCE_COUNT_SIZE),
                    );
                }
                GpuCommand::Barrier { resource, src, dst } => {
                    trace!(?resource, ?src, ?dst, "barrier");
                }
                GpuCommand::DispatchCull { slot, workgroups } => {
                    if workgroups == 0 {
                        continue;
                    }
                    let resources = slot_resources(scene, slot)?;
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Cull Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&scene.cull_pipeline);
                    pass.set_bind_group(0, &resources.cull_bind_group, &[]);
                    pass.dispatch_workgroups(workgroups, 1, 1);
                }
                GpuCommand::DrawIndexedIndirect { slot } => {
                    let resources = slot_resources(scene, slot)?;
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Draw Pass"),
                        color_attachments: &[self.color_attachment(view)],
                        depth_stencil_attachment: self.depth_attachment(),
                        ..Default::default()
                    });
                    pass.set_pipeline(&scene.draw_pipeline);
                    pass.set_bind_group(0, &resources.draw_bind_group, &[]);
                    pass.set_vertex_buffer(0, scene.vertex_buffer.slice(..));
                    pass.set_index_buffer(scene.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed_indirect(&scene.indirect_buffer, 0);
                    drew = true;
                }
            }
        }
        Ok(drew)
    }

    /// Creates the scene objects inside out-of-memory and validation error
    /// scopes, so creation failures come back as `Setup` errors instead of
    /// reaching the uncaptured-error handler.
    fn build_scene(&self, resources: &SceneResources<'_>) -> RenderResult<GpuScene> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let scene = self.create_scene_objects(resources);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        scope_result("scene setup", out_of_memory)?;
        scope_result("scene setup", validation)?;
        Ok(scene)
    }

    fn create_scene_objects(&self, resources: &SceneResources<'_>) -> GpuScene {
        let device = &self.device;
        let capacity = u64::from(resources.capacity.max(1));
        let record_size = std::mem::size_of::<InstanceRecord>() as u64;

        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Instance Buffer"),
            size: capacity * record_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !resources.instances.is_empty() {
            self.queue
                .write_buffer(&instance_buffer, 0, bytemuck::cast_slice(resources.instances));
        }

        let visible_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visible Index Buffer"),
            size: capacity * 4,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });

        let indirect_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Indirect Draw Buffer"),
            contents: bytemuck::bytes_of(&resources.draw_args),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&resources.mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&resources.mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let cull_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cull Bind Group Layout"),
            entries: &[
                buffer_entry(0, wgpu::ShaderStages::COMPUTE, storage(true)),
                buffer_entry(1, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
                buffer_entry(2, wgpu::ShaderStages::COMPUTE, storage(false)),
                buffer_entry(3, wgpu::ShaderStages::COMPUTE, storage(false)),
                buffer_entry(4, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
            ],
        });
        let draw_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Bind Group Layout"),
            entries: &[
                buffer_entry(0, wgpu::ShaderStages::VERTEX, wgpu::BufferBindingType::Uniform),
                buffer_entry(1, wgpu::ShaderStages::VERTEX, storage(true)),
                buffer_entry(2, wgpu::ShaderStages::VERTEX, storage(true)),
            ],
        });

        let cull_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cull Shader"),
            source: wgpu::ShaderSource::Wgsl(cull_shader_source(resources.workgroup_size).into()),
        });
        let draw_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Draw Shader"),
            source: wgpu::ShaderSource::Wgsl(draw_shader_source().into()),
        });

        let cull_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cull Pipeline Layout"),
            bind_group_layouts: &[&cull_layout],
            push_constant_ranges: &[],
        });
        let cull_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Cull Pipeline"),
            layout: Some(&cull_pipeline_layout),
            module: &cull_shader,
            entry_point: CULL_ENTRY_POINT,
        });

        let draw_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Draw Pipeline Layout"),
            bind_group_layouts: &[&draw_layout],
            push_constant_ranges: &[],
        });
        let draw_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Draw Pipeline"),
            layout: Some(&draw_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &draw_shader,
                entry_point: DRAW_VS_ENTRY_POINT,
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &VERTEX_ATTRIBUTES,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &draw_shader,
                entry_point: DRAW_FS_ENTRY_POINT,
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let slots = (0..resources.frames_in_flight)
            .map(|slot| {
                let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Camera Uniform Buffer"),
                    size: std::mem::size_of::<CameraUniform>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Cull Params Buffer"),
                    size: std::mem::size_of::<CullParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let cull_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Cull Bind Group"),
                    layout: &cull_layout,
                    entries: &[
                        bind(0, &instance_buffer),
                        bind(1, &camera_buffer),
                        bind(2, &indirect_buffer),
                        bind(3, &visible_buffer),
                        bind(4, &params_buffer),
                    ],
                });
                let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Draw Bind Group"),
                    layout: &draw_layout,
                    entries: &[
                        bind(0, &camera_buffer),
                        bind(1, &instance_buffer),
                        bind(2, &visible_buffer),
                    ],
                });
                trace!(slot, "frame slot resources created");
                SlotResources {
                    camera_buffer,
                    params_buffer,
                    cull_bind_group,
                    draw_bind_group,
                }
            })
            .collect();

        GpuScene {
            cull_pipeline,
            draw_pipeline,
            vertex_buffer,
            index_buffer,
            indirect_buffer,
            _instance_buffer: instance_buffer,
            _visible_buffer: visible_buffer,
            slots,
        }
    }
}

fn scope_result(stage: &str, error: Option<wgpu::Error>) -> RenderResult<()> {
    match error {
        Some(e) => Err(RenderError::Setup(format!("{stage}: {e}"))),
        None => Ok(()),
    }
}

fn slot_resources(scene: &GpuScene, slot: usize) -> RenderResult<&SlotResources> {
    scene.slots.get(slot).ok_or(RenderError::InvalidFrameSlot {
        slot,
        frames: scene.slots.len(),
    })
}

const fn storage(read_only: bool) -> wgpu::BufferBindingType {
    wgpu::BufferBindingType::Storage { read_only }
}

const fn buffer_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl FrameTarget for WgpuRenderer {
    type Image = wgpu::SurfaceTexture;
    type Fence = GpuFence;

    fn acquire(&mut self) -> RenderResult<Acquire<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Acquire::Image(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => Ok(Acquire::Stale),
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("surface acquire timed out");
                Ok(Acquire::Stale)
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                Err(RenderError::SurfaceFatal("out of memory acquiring surface".into()))
            }
        }
    }

    fn submit(
        &mut self,
        image: wgpu::SurfaceTexture,
        commands: &CommandList,
    ) -> RenderResult<GpuFence> {
        if cfg!(debug_assertions) {
            HazardTracker::validate(commands)?;
        }

        let view = image
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let drew = match &self.scene {
            Some(scene) => self.encode(scene, commands, &view, &mut encoder)?,
            None if commands.is_empty() => false,
            None => return Err(RenderError::NoScene),
        };
        if !drew {
            // Present a cleared image.
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[self.color_attachment(&view)],
                depth_stencil_attachment: self.depth_attachment(),
                ..Default::default()
            });
        }

        let index = self.queue.submit(std::iter::once(encoder.finish()));
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        self.queue
            .on_submitted_work_done(move || flag.store(true, Ordering::Release));
        image.present();

        Ok(GpuFence { index, done })
    }

    fn wait(&mut self, fence: GpuFence) -> RenderResult<()> {
        if !fence.done.load(Ordering::Acquire) {
            self.device
                .poll(wgpu::Maintain::WaitForSubmissionIndex(fence.index));
        }
        Ok(())
    }

    fn is_signaled(&mut self, fence: &GpuFence) -> bool {
        self.device.poll(wgpu::Maintain::Poll);
        fence.done.load(Ordering::Acquire)
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_texture(&self.device, self.config.width, self.config.height);
        debug!(
            width = self.config.width,
            height = self.config.height,
            "surface reconfigured"
        );
        Ok(())
    }

    fn extent(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}

impl CullingBackend for WgpuRenderer {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn upload_scene(&mut self, resources: &SceneResources<'_>) -> RenderResult<()> {
        let count = resources.instances.len();
        if count > resources.capacity as usize {
            return Err(RenderError::CapacityExceeded {
                requested: u32::try_from(count).unwrap_or(u32::MAX),
                capacity: resources.capacity,
            });
        }
        if resources.frames_in_flight == 0 {
            return Err(RenderError::Setup("scene needs at least one frame slot".into()));
        }

        self.scene = None;
        self.scene = Some(self.build_scene(resources)?);
        info!(
            instances = count,
            capacity = resources.capacity,
            workgroup_size = resources.workgroup_size,
            "GPU scene uploaded"
        );
        Ok(())
    }

    fn write_frame_uniforms(
        &mut self,
        slot: usize,
        camera: &CameraUniform,
        params: &CullParams,
    ) -> RenderResult<()> {
        let scene = self.scene.as_ref().ok_or(RenderError::NoScene)?;
        let resources = slot_resources(scene, slot)?;
        self.queue
            .write_buffer(&resources.camera_buffer, 0, bytemuck::bytes_of(camera));
        self.queue
            .write_buffer(&resources.params_buffer, 0, bytemuck::bytes_of(params));
        Ok(())
    }

    fn release_scene(&mut self) {
        if self.scene.take().is_some() {
            debug!("GPU scene released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_errors_become_setup_errors() {
        assert_eq!(scope_result("scene setup", None), Ok(()));

        let validation = wgpu::Error::Validation {
            source: Box::new(std::io::Error::other("entry point not found")),
            description: "invalid compute pipeline".into(),
        };
        match scope_result("scene setup", Some(validation)) {
            Err(RenderError::Setup(message)) => {
                assert!(message.starts_with("scene setup: "), "{message}");
                assert!(message.contains("invalid compute pipeline"), "{message}");
            }
            other => panic!("expected Setup, got {other:?}"),
        }

        let oom = wgpu::Error::OutOfMemory {
            source: Box::new(std::io::Error::other("buffer allocation")),
        };
        assert!(matches!(
            scope_result("scene setup", Some(oom)),
            Err(RenderError::Setup(_))
        ));
    }
}
