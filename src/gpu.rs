//! wgpu backend: owns the surface, device, and queue, and implements the
//! `Renderer` contract with two quad pipelines (screen blending and
//! separate-alpha cache blending).

use std::sync::Arc;

use slotmap::SlotMap;
use winit::window::Window;

use crate::clip::Rect;
use crate::render::{BlendMode, GuiError, Renderer, TargetId, TextureId, TextureRef};

/// Upper bound on combined cache target memory. Exceeding it surfaces as a
/// recoverable allocation error, and the affected node retries next frame.
const TARGET_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// Format for offscreen cache targets.
const CACHE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
    tint: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadUniforms {
    projection: [[f32; 4]; 4],
}

struct GpuTexture {
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

struct GpuTarget {
    view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
    width: u32,
    height: u32,
}

/// One draw run: consecutive quads sampling the same texture.
struct DrawRun {
    texture: TextureRef,
    start: u32,
    count: u32,
}

struct PassState {
    target: Option<TargetId>,
    blend: BlendMode,
    clear: Option<[f32; 4]>,
    vertices: Vec<QuadVertex>,
    runs: Vec<DrawRun>,
}

/// Outcome of acquiring the next surface frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A frame is ready to draw into.
    Ready,
    /// No frame this time; skip drawing and try again next redraw.
    Skipped,
    /// The surface was lost and reconfigured. Cached target contents are
    /// suspect; the caller should run a device reset before the next draw.
    DeviceLost,
}

pub struct GpuRenderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    window: Arc<Window>,

    screen_pipeline: wgpu::RenderPipeline,
    cache_pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    textures: SlotMap<TextureId, GpuTexture>,
    targets: SlotMap<TargetId, GpuTarget>,
    target_bytes: u64,

    frame: Option<wgpu::SurfaceTexture>,
    frame_view: Option<wgpu::TextureView>,
    pass: Option<PassState>,
}

impl GpuRenderer {
    pub fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .expect("create surface");

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("failed to find a suitable GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("casement_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            },
            None,
        ))
        .expect("failed to create GPU device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad_texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("quad_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("quad.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        // Color blends source-over either way; cache passes additionally
        // accumulate destination alpha additively so overlapping siblings
        // never punch holes into the cached image's alpha channel.
        let separate_alpha = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::SrcAlpha,
                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };

        let screen_pipeline = make_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            surface_format,
            wgpu::BlendState::ALPHA_BLENDING,
            "quad_screen_pipeline",
        );
        let cache_pipeline = make_pipeline(
            &device,
            &shader,
            &pipeline_layout,
            CACHE_FORMAT,
            separate_alpha,
            "quad_cache_pipeline",
        );

        Self {
            surface,
            device,
            queue,
            config,
            window,
            screen_pipeline,
            cache_pipeline,
            uniform_layout,
            texture_layout,
            sampler,
            textures: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            target_bytes: 0,
            frame: None,
            frame_view: None,
            pass: None,
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn screen_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Acquire the next surface frame.
    pub fn begin_frame(&mut self) -> FrameStatus {
        let output = match self.surface.get_current_texture() {
            Ok(t) => t,
            Err(wgpu::SurfaceError::Lost) => {
                self.surface.configure(&self.device, &self.config);
                return FrameStatus::DeviceLost;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of GPU memory");
                return FrameStatus::Skipped;
            }
            Err(e) => {
                log::warn!("surface error: {e:?}");
                return FrameStatus::Skipped;
            }
        };
        self.frame_view = Some(
            output
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
        );
        self.frame = Some(output);
        FrameStatus::Ready
    }

    /// Present the frame acquired by `begin_frame`.
    pub fn end_frame(&mut self) {
        self.frame_view = None;
        if let Some(frame) = self.frame.take() {
            frame.present();
        }
    }

    fn make_target_bind_group(&self, view: &wgpu::TextureView) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_texture_bind_group"),
            layout: &self.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn texture_size(&self, texture: TextureRef) -> Option<(u32, u32)> {
        match texture {
            TextureRef::Texture(id) => self.textures.get(id).map(|t| (t.width, t.height)),
            TextureRef::Target(id) => self.targets.get(id).map(|t| (t.width, t.height)),
        }
    }
}

impl Renderer for GpuRenderer {
    fn create_target(&mut self, width: u32, height: u32) -> Result<TargetId, GuiError> {
        let bytes = u64::from(width) * u64::from(height) * 4;
        if self.target_bytes + bytes > TARGET_BUDGET_BYTES {
            return Err(GuiError::TargetAllocation { width, height });
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("cache_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CACHE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.make_target_bind_group(&view);
        self.target_bytes += bytes;
        Ok(self.targets.insert(GpuTarget {
            view,
            bind_group,
            width,
            height,
        }))
    }

    fn destroy_target(&mut self, target: TargetId) {
        if let Some(t) = self.targets.remove(target) {
            self.target_bytes = self
                .target_bytes
                .saturating_sub(u64::from(t.width) * u64::from(t.height) * 4);
        }
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gui_texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CACHE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if rgba.len() as u64 >= u64::from(width) * u64::from(height) * 4 {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        } else {
            log::warn!("texture upload skipped: {} bytes for {width}x{height}", rgba.len());
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.make_target_bind_group(&view);
        self.textures.insert(GpuTexture {
            bind_group,
            width,
            height,
        })
    }

    fn begin_pass(&mut self, target: Option<TargetId>, blend: BlendMode, clear: Option<[f32; 4]>) {
        self.pass = Some(PassState {
            target,
            blend,
            clear,
            vertices: Vec::new(),
            runs: Vec::new(),
        });
    }

    fn draw_quad(&mut self, texture: TextureRef, source: Rect, dest: Rect, tint: [f32; 4]) {
        let Some((tw, th)) = self.texture_size(texture) else {
            return;
        };
        let Some(pass) = self.pass.as_mut() else {
            return;
        };

        let (tw, th) = (tw as f32, th as f32);
        let u0 = source.x as f32 / tw;
        let v0 = source.y as f32 / th;
        let u1 = (source.x + source.width) as f32 / tw;
        let v1 = (source.y + source.height) as f32 / th;
        let x0 = dest.x as f32;
        let y0 = dest.y as f32;
        let x1 = (dest.x + dest.width) as f32;
        let y1 = (dest.y + dest.height) as f32;

        let make = |px: f32, py: f32, u: f32, v: f32| QuadVertex {
            position: [px, py],
            uv: [u, v],
            tint,
        };

        let start = pass.vertices.len() as u32;
        pass.vertices.push(make(x0, y0, u0, v0));
        pass.vertices.push(make(x1, y0, u1, v0));
        pass.vertices.push(make(x0, y1, u0, v1));
        pass.vertices.push(make(x1, y0, u1, v0));
        pass.vertices.push(make(x1, y1, u1, v1));
        pass.vertices.push(make(x0, y1, u0, v1));

        match pass.runs.last_mut() {
            Some(run) if run.texture == texture => run.count += 6,
            _ => pass.runs.push(DrawRun {
                texture,
                start,
                count: 6,
            }),
        }
    }

    fn end_pass(&mut self) {
        let Some(pass) = self.pass.take() else {
            return;
        };

        let (width, height) = match pass.target {
            Some(t) => match self.targets.get(t) {
                Some(gt) => (gt.width, gt.height),
                None => return,
            },
            None => (self.config.width, self.config.height),
        };

        let sw = width as f32;
        let sh = height as f32;
        #[rustfmt::skip]
        let projection: [[f32; 4]; 4] = [
            [2.0 / sw,  0.0,        0.0, 0.0],
            [0.0,      -2.0 / sh,   0.0, 0.0],
            [0.0,       0.0,        1.0, 0.0],
            [-1.0,      1.0,        0.0, 1.0],
        ];
        let uniforms = QuadUniforms { projection };
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_uniforms"),
            size: std::mem::size_of::<QuadUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.queue
            .write_buffer(&uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        let uniform_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad_uniform_bind_group"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let vertex_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad_vertices"),
            size: (pass.vertices.len().max(1) * std::mem::size_of::<QuadVertex>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        if !pass.vertices.is_empty() {
            self.queue
                .write_buffer(&vertex_buffer, 0, bytemuck::cast_slice(&pass.vertices));
        }

        let view = match pass.target {
            Some(t) => match self.targets.get(t) {
                Some(gt) => &gt.view,
                None => return,
            },
            None => match self.frame_view.as_ref() {
                Some(v) => v,
                None => {
                    log::warn!("screen pass outside an acquired frame");
                    return;
                }
            },
        };
        let pipeline = match pass.blend {
            BlendMode::SourceOver => &self.screen_pipeline,
            BlendMode::SeparateAlpha => &self.cache_pipeline,
        };

        let load = match pass.clear {
            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                r: r as f64,
                g: g as f64,
                b: b as f64,
                a: a as f64,
            }),
            None => wgpu::LoadOp::Load,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad_encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                ..Default::default()
            });
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &uniform_group, &[]);
            render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            for run in &pass.runs {
                let bind_group = match run.texture {
                    TextureRef::Texture(id) => self.textures.get(id).map(|t| &t.bind_group),
                    TextureRef::Target(id) => self.targets.get(id).map(|t| &t.bind_group),
                };
                let Some(bind_group) = bind_group else {
                    continue;
                };
                render_pass.set_bind_group(1, bind_group, &[]);
                render_pass.draw(run.start..run.start + run.count, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn resolve_target(&mut self, _target: TargetId) {
        // Cache textures are sampleable as soon as their pass is
        // submitted; nothing to do here on wgpu.
    }
}

fn make_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<QuadVertex>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    // position
                    wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x2,
                    },
                    // uv
                    wgpu::VertexAttribute {
                        offset: 8,
                        shader_location: 1,
                        format: wgpu::VertexFormat::Float32x2,
                    },
                    // tint
                    wgpu::VertexAttribute {
                        offset: 16,
                        shader_location: 2,
                        format: wgpu::VertexFormat::Float32x4,
                    },
                ],
            }],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
