use std::num::NonZeroU32;
use std::time::Instant;

use log::{debug, error, info};
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

mod colour;
mod command_encoder;
mod complex;
mod julia;
mod screen;
mod var;

use colour::{ColourRange, HistogramColouring};
use command_encoder::CommandEncoderExt;
use complex::Complex;
use screen::Size;
use var::Var;

/// Opens on a connected Julia set with plenty of visible structure.
const DEFAULT_C: Complex = Complex {
    real: -0.1,
    imaginary: 0.651,
};
const DEFAULT_RESOLUTION: u32 = 100;

/// Half-width of the sampled square, and the escape radius.
const BOUND: f64 = 2.0;
const LIM: f64 = 4.0;

const C_STEP: f64 = 0.01;
const C_RANGE: f64 = 2.0;
const MIN_RESOLUTION: u32 = 100;
const MAX_RESOLUTION: u32 = 1000;
const RESOLUTION_STEP: u32 = 50;

struct Parameters {
    c: Complex,
    resolution: u32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            c: DEFAULT_C,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

/// Applies one key press to the parameters. Returns whether anything changed.
///
/// Arrow keys step the real and imaginary parts of `c`, `[` and `]` step the
/// grid resolution, `R` restores the defaults.
fn apply_key(parameters: &mut Parameters, key: VirtualKeyCode) -> bool {
    let previous_c = parameters.c;
    let previous_resolution = parameters.resolution;

    match key {
        VirtualKeyCode::Left => {
            parameters.c.real = (parameters.c.real - C_STEP).clamp(-C_RANGE, C_RANGE);
        }
        VirtualKeyCode::Right => {
            parameters.c.real = (parameters.c.real + C_STEP).clamp(-C_RANGE, C_RANGE);
        }
        VirtualKeyCode::Down => {
            parameters.c.imaginary = (parameters.c.imaginary - C_STEP).clamp(-C_RANGE, C_RANGE);
        }
        VirtualKeyCode::Up => {
            parameters.c.imaginary = (parameters.c.imaginary + C_STEP).clamp(-C_RANGE, C_RANGE);
        }
        VirtualKeyCode::LBracket => {
            parameters.resolution = parameters
                .resolution
                .saturating_sub(RESOLUTION_STEP)
                .max(MIN_RESOLUTION);
        }
        VirtualKeyCode::RBracket => {
            parameters.resolution = (parameters.resolution + RESOLUTION_STEP).min(MAX_RESOLUTION);
        }
        VirtualKeyCode::R => *parameters = Parameters::default(),
        _ => return false,
    }

    parameters.c != previous_c || parameters.resolution != previous_resolution
}

/// Evaluates and colours one grid, returning RGBA texels for display.
fn render_grid(colouring: &mut HistogramColouring, parameters: &Parameters) -> Option<Vec<u8>> {
    let started = Instant::now();
    let counts = match julia::compute_julia(parameters.c, parameters.resolution, BOUND, LIM) {
        Ok(counts) => counts,
        Err(err) => {
            error!("grid evaluation failed: {}", err);
            return None;
        }
    };
    info!(
        "computed {0}x{0} grid for c = {1:?} in {2} ms",
        parameters.resolution,
        parameters.c,
        started.elapsed().as_millis()
    );

    let mut colour_ranges = vec![ColourRange::default(); counts.len()];
    colouring.colour_grid(&counts, &mut colour_ranges);

    let mut texels = Vec::with_capacity(colour_ranges.len() * 4);
    for colour_range in &colour_ranges {
        texels.extend_from_slice(&colour::to_rgba(*colour_range));
    }
    Some(texels)
}

fn create_grid_texture(
    device: &wgpu::Device,
    resolution: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("grid-texture"),
        size: wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn upload_grid(queue: &wgpu::Queue, texture: &wgpu::Texture, resolution: u32, texels: &[u8]) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: NonZeroU32::new(4 * resolution),
            rows_per_image: NonZeroU32::new(resolution),
        },
        wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
    );
}

fn create_render_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    grid_texture_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    screen_size: &Var<Size>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("render-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(grid_texture_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: screen_size.binding_resource(),
            },
        ],
    })
}

fn main() {
    env_logger::init();

    let workers = num_cpus::get_physical();
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build_global()
        .unwrap();
    debug!("rayon pool sized to {} workers", workers);

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("Julia Set Explorer")
        .build(&event_loop)
        .unwrap();

    let instance = wgpu::Instance::new(wgpu::Backends::all());

    let size = window.inner_size();
    let surface = unsafe { instance.create_surface(&window) };

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: Default::default(),
        force_fallback_adapter: false,
        compatible_surface: Some(&surface),
    }))
    .unwrap();
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("device"),
            features: wgpu::Features::empty(),
            limits: wgpu::Limits::default(),
        },
        None,
    ))
    .unwrap();

    let mut surface_configuration = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface.get_supported_formats(&adapter)[0],
        width: size.width,
        height: size.height,
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: wgpu::CompositeAlphaMode::Auto,
    };
    surface.configure(&device, &surface_configuration);

    let render_shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("render-shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
    });

    let render_bind_group_layout =
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("render-bind-group-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("render-pipeline-layout"),
        bind_group_layouts: &[&render_bind_group_layout],
        push_constant_ranges: &[],
    });

    let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("render-pipeline"),
        layout: Some(&render_pipeline_layout),
        vertex: wgpu::VertexState {
            module: &render_shader_module,
            entry_point: "vertex_main",
            buffers: &[],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &render_shader_module,
            entry_point: "fragment_main",
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_configuration.format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
    });

    let screen_size = Var::new(
        &device,
        "screen-size-buffer",
        wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        Size::of(size),
    );

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor::default());

    let mut parameters = Parameters::default();
    let mut colouring = HistogramColouring::new();

    let texels = render_grid(&mut colouring, &parameters).unwrap();
    let (mut grid_texture, mut grid_texture_view) =
        create_grid_texture(&device, parameters.resolution);
    upload_grid(&queue, &grid_texture, parameters.resolution, &texels);

    let mut render_bind_group = create_render_bind_group(
        &device,
        &render_bind_group_layout,
        &grid_texture_view,
        &sampler,
        &screen_size,
    );
    let mut grid_resolution = parameters.resolution;

    event_loop.run(move |event, _, control_flow| {
        // The picture only changes with the parameters, so sleep between events.
        control_flow.set_wait();

        match event {
            Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => {
                    *control_flow = ControlFlow::Exit;
                }
                WindowEvent::Resized(size) => {
                    debug!("resizing to {:?}", size);

                    surface_configuration.width = size.width;
                    surface_configuration.height = size.height;
                    surface.configure(&device, &surface_configuration);

                    screen_size.write(&queue, Size::of(size));

                    window.request_redraw();
                }
                WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(key),
                            ..
                        },
                    ..
                } => {
                    if !apply_key(&mut parameters, key) {
                        return;
                    }

                    let texels = match render_grid(&mut colouring, &parameters) {
                        Some(texels) => texels,
                        None => return,
                    };

                    if parameters.resolution != grid_resolution {
                        let (texture, texture_view) =
                            create_grid_texture(&device, parameters.resolution);
                        grid_texture = texture;
                        grid_texture_view = texture_view;
                        render_bind_group = create_render_bind_group(
                            &device,
                            &render_bind_group_layout,
                            &grid_texture_view,
                            &sampler,
                            &screen_size,
                        );
                        grid_resolution = parameters.resolution;
                    }
                    upload_grid(&queue, &grid_texture, parameters.resolution, &texels);

                    window.request_redraw();
                }
                _ => {}
            },
            Event::RedrawRequested(window_id) if window_id == window.id() => {
                let surface_texture = surface.get_current_texture().unwrap();

                let surface_texture_view = surface_texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());

                let command_encoder = {
                    let mut command_encoder =
                        device.create_command_encoder(&wgpu::CommandEncoderDescriptor::default());

                    command_encoder.push_debug_group("render-pass");
                    command_encoder.with_render_pass(
                        &wgpu::RenderPassDescriptor {
                            label: Some("render-pass"),
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &surface_texture_view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                                    store: true,
                                },
                            })],
                            depth_stencil_attachment: None,
                        },
                        |render_pass| {
                            render_pass.set_pipeline(&render_pipeline);
                            render_pass.set_bind_group(0, &render_bind_group, &[]);
                            render_pass.draw(0..4, 0..1);
                        },
                    );
                    command_encoder.pop_debug_group();

                    command_encoder
                };

                queue.submit([command_encoder.finish()]);
                surface_texture.present();
            }
            _ => {}
        }
    });
}
