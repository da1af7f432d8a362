mod probe;
mod sky;
mod water;

pub use probe::{EnvironmentProbe, ProbeBaker};
pub use sky::SkyPass;
pub use water::WaterPass;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::info;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::assets::NormalMapImage;
use crate::camera::Camera;
use crate::scene::{SceneSettings, SunSettings};

/// GPU renderer for the ocean scene: one water plane, one sky dome and a
/// prefiltered environment probe regenerated whenever the sun moves.
pub struct Renderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    size: PhysicalSize<u32>,
    depth: DepthBuffer,
    sky: SkyPass,
    water: WaterPass,
    probe_baker: ProbeBaker,
    environment: Option<EnvironmentProbe>,
}

impl Renderer {
    /// Initializes the GPU renderer and composes the scene. Any failure
    /// here is fatal: nothing downstream can draw without a surface.
    pub async fn new(window: Arc<Window>, settings: &SceneSettings) -> Result<Self> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(anyhow!("window has zero area"));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .context("failed to create render surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to acquire GPU adapter")?;
        info!("rendering on {}", adapter.get_info().name);

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("seascape-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .context("failed to create GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, config.width, config.height);

        let sky = SkyPass::new(&device, &settings.sky, surface_format);
        let water = WaterPass::new(
            &device,
            &queue,
            &settings.water,
            settings.fog.as_ref(),
            surface_format,
        );
        let probe_baker = ProbeBaker::new(&device, &sky, settings.water.texture_size);

        let mut renderer = Self {
            window,
            surface,
            device,
            queue,
            config,
            size,
            depth,
            sky,
            water,
            probe_baker,
            environment: None,
        };
        renderer.update_sun(&settings.sun);
        Ok(renderer)
    }

    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    /// The currently installed ambient environment source.
    pub fn environment(&self) -> Option<&EnvironmentProbe> {
        self.environment.as_ref()
    }

    /// Resizes the swap chain. Zero-area sizes are ignored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    /// Recomputes the sun direction and rewires everything lit by it: the
    /// water gets a normalized copy, the sky the raw vector, and the
    /// environment probe is regenerated. The previous probe is released
    /// before its replacement is installed.
    pub fn update_sun(&mut self, sun: &SunSettings) {
        let direction = sun.direction();
        self.water.set_sun_direction(direction.normalize());
        self.sky.set_sun_position(&self.queue, direction);

        self.environment = None;
        let probe = self.probe_baker.bake(&self.device, &self.queue, &self.sky);
        self.water.bind_environment(&self.device, &probe);
        self.environment = Some(probe);
    }

    /// Uploads a freshly decoded normal map, replacing the flat fallback.
    pub fn install_normal_map(&mut self, map: &NormalMapImage) {
        self.water.install_normal_map(&self.device, &self.queue, map);
    }

    /// Draws one frame: sky first, then the water plane on top.
    pub fn render(&mut self, camera: &Camera, time: f32) -> Result<(), wgpu::SurfaceError> {
        self.sky.prepare(&self.queue, camera);
        self.water.prepare(&self.queue, camera, time);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("seascape-encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.sky.draw(&mut pass);
            self.water.draw(&mut pass);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

pub(crate) struct DepthBuffer {
    _texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

impl DepthBuffer {
    pub(crate) const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    pub(crate) fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
