use bytemuck::{bytes_of, Pod, Zeroable};
use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::assets::{flat_normal, NormalMapImage};
use crate::camera::Camera;
use crate::scene::{FogSettings, WaterSettings, TONE_MAPPING_EXPOSURE};

use super::probe::EnvironmentProbe;
use super::DepthBuffer;

/// The animated water plane.
///
/// A two-triangle quad authored in the XY plane and rotated flat by the
/// model matrix; all wave detail comes from the scrolling normal map. The
/// shader samples the environment probe for reflections, so the probe
/// bind group is rebuilt whenever the probe regenerates.
pub struct WaterPass {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniforms: WaterUniforms,
    uniform_buffer: wgpu::Buffer,
    surface_layout: wgpu::BindGroupLayout,
    surface_bind_group: wgpu::BindGroup,
    environment_layout: wgpu::BindGroupLayout,
    environment_bind_group: Option<wgpu::BindGroup>,
    normal_sampler: wgpu::Sampler,
}

impl WaterPass {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        settings: &WaterSettings,
        fog: Option<&FogSettings>,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("water-shader"),
            source: wgpu::ShaderSource::Wgsl(WATER_SHADER.into()),
        });

        let half = settings.side / 2.0;
        let vertices: [[f32; 3]; 4] = [
            [-half, -half, 0.0],
            [half, -half, 0.0],
            [half, half, 0.0],
            [-half, half, 0.0],
        ];
        let indices: [u32; 6] = [0, 1, 2, 0, 2, 3];

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("water-vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("water-indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        // Lie the plane flat: -90 degrees about X points the face up.
        let model = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let fog_color = fog.map(|f| f.color).unwrap_or(Vec3::ZERO);
        let fog_density = fog.map(|f| f.density).unwrap_or(0.0);
        let uniforms = WaterUniforms {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            camera_position: [0.0; 4],
            sun_direction: [0.0, 1.0, 0.0, settings.distortion_scale],
            sun_color: settings
                .sun_color
                .extend(TONE_MAPPING_EXPOSURE)
                .to_array(),
            water_color: settings
                .water_color
                .extend(if fog.is_some() { 1.0 } else { 0.0 })
                .to_array(),
            fog_color: fog_color.extend(fog_density).to_array(),
        };
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("water-uniforms"),
            size: std::mem::size_of::<WaterUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let surface_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("water-surface-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: Some(
                            std::num::NonZeroU64::new(std::mem::size_of::<WaterUniforms>() as u64)
                                .unwrap(),
                        ),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let environment_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("water-environment-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("water-pipeline-layout"),
            bind_group_layouts: &[&surface_layout, &environment_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("water-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: (3 * std::mem::size_of::<f32>()) as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        // Wrap repeats on both axes so the four scrolled taps tile.
        let normal_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("water-normal-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // The flat fallback is sampled until the real map finishes loading.
        let normal_view = upload_normal_map(device, queue, &flat_normal());
        let surface_bind_group = create_surface_bind_group(
            device,
            &surface_layout,
            &uniform_buffer,
            &normal_view,
            &normal_sampler,
        );

        Self {
            pipeline,
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            uniforms,
            uniform_buffer,
            surface_layout,
            surface_bind_group,
            environment_layout,
            environment_bind_group: None,
            normal_sampler,
        }
    }

    /// Sun direction as sampled by the shader; always stored normalized.
    pub fn set_sun_direction(&mut self, direction: Vec3) {
        let normalized = direction.normalize();
        self.uniforms.sun_direction[0] = normalized.x;
        self.uniforms.sun_direction[1] = normalized.y;
        self.uniforms.sun_direction[2] = normalized.z;
    }

    pub fn sun_direction(&self) -> Vec3 {
        Vec3::new(
            self.uniforms.sun_direction[0],
            self.uniforms.sun_direction[1],
            self.uniforms.sun_direction[2],
        )
    }

    /// Replaces the bound normal map with a freshly decoded image.
    pub fn install_normal_map(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        map: &NormalMapImage,
    ) {
        let view = upload_normal_map(device, queue, map);
        self.surface_bind_group = create_surface_bind_group(
            device,
            &self.surface_layout,
            &self.uniform_buffer,
            &view,
            &self.normal_sampler,
        );
    }

    /// Points the reflection lookup at a newly baked probe.
    pub fn bind_environment(&mut self, device: &wgpu::Device, probe: &EnvironmentProbe) {
        self.environment_bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("water-environment-bind-group"),
            layout: &self.environment_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&probe.cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&probe.sampler),
                },
            ],
        }));
    }

    /// Writes the per-frame uniforms: camera matrices plus the animation
    /// time that was advanced just before this call.
    pub fn prepare(&mut self, queue: &wgpu::Queue, camera: &Camera, time: f32) {
        self.uniforms.view_proj = camera.view_proj().to_cols_array_2d();
        self.uniforms.camera_position = camera.position.extend(time).to_array();
        queue.write_buffer(&self.uniform_buffer, 0, bytes_of(&self.uniforms));
    }

    pub fn draw<'pass>(&'pass self, pass: &mut wgpu::RenderPass<'pass>) {
        let Some(environment) = self.environment_bind_group.as_ref() else {
            return;
        };
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.surface_bind_group, &[]);
        pass.set_bind_group(1, environment, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

fn upload_normal_map(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    map: &NormalMapImage,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("water-normal-map"),
        size: wgpu::Extent3d {
            width: map.width,
            height: map.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &map.rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * map.width),
            rows_per_image: Some(map.height),
        },
        wgpu::Extent3d {
            width: map.width,
            height: map.height,
            depth_or_array_layers: 1,
        },
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_surface_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    normal_view: &wgpu::TextureView,
    normal_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("water-surface-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(normal_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(normal_sampler),
            },
        ],
    })
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WaterUniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    /// xyz camera position, w animation time.
    camera_position: [f32; 4],
    /// xyz normalized sun direction, w distortion scale.
    sun_direction: [f32; 4],
    /// rgb sun color, w tone-mapping exposure.
    sun_color: [f32; 4],
    /// rgb water color, w fog-enabled flag.
    water_color: [f32; 4],
    /// rgb fog color, w fog density.
    fog_color: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<WaterUniforms>() == 208);

pub(crate) const WATER_SHADER: &str = r#"
struct WaterUniforms {
    view_proj: mat4x4<f32>,
    model: mat4x4<f32>,
    camera_position: vec4<f32>,
    sun_direction: vec4<f32>,
    sun_color: vec4<f32>,
    water_color: vec4<f32>,
    fog_color: vec4<f32>,
}

@group(0) @binding(0) var<uniform> water: WaterUniforms;
@group(0) @binding(1) var normal_map: texture_2d<f32>;
@group(0) @binding(2) var normal_sampler: sampler;
@group(1) @binding(0) var environment_map: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    let world = water.model * vec4<f32>(position, 1.0);
    out.position = water.view_proj * world;
    out.world_pos = world.xyz;
    return out;
}

// Four taps of the tiling normal map scrolled at co-prime rates.
fn sample_noise(uv: vec2<f32>, time: f32) -> vec4<f32> {
    let uv0 = (uv / 103.0) + vec2<f32>(time / 17.0, time / 29.0);
    let uv1 = uv / 107.0 - vec2<f32>(time / -19.0, time / 31.0);
    let uv2 = uv / vec2<f32>(8907.0, 9803.0) + vec2<f32>(time / 101.0, time / 97.0);
    let uv3 = uv / vec2<f32>(1091.0, 1027.0) - vec2<f32>(time / 109.0, time / -113.0);
    let tap0 = textureSample(normal_map, normal_sampler, uv0);
    let tap1 = textureSample(normal_map, normal_sampler, uv1);
    let tap2 = textureSample(normal_map, normal_sampler, uv2);
    let tap3 = textureSample(normal_map, normal_sampler, uv3);
    return (tap0 + tap1 + tap2 + tap3) * 0.5 - vec4<f32>(1.0);
}

fn aces_filmic(color: vec3<f32>) -> vec3<f32> {
    let mapped = (color * (2.51 * color + vec3<f32>(0.03)))
        / (color * (2.43 * color + vec3<f32>(0.59)) + vec3<f32>(0.14));
    return clamp(mapped, vec3<f32>(0.0), vec3<f32>(1.0));
}

const SHINY: f32 = 100.0;
const SPECULAR_STRENGTH: f32 = 2.0;
const DIFFUSE_STRENGTH: f32 = 0.5;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let time = water.camera_position.w;
    let distortion_scale = water.sun_direction.w;

    let noise = sample_noise(in.world_pos.xz, time);
    let surface_normal = normalize(noise.xzy * vec3<f32>(1.5, 1.0, 1.5));

    let to_eye = water.camera_position.xyz - in.world_pos;
    let dist = length(to_eye);
    let eye_dir = to_eye / dist;
    let sun_dir = water.sun_direction.xyz;
    let sun_color = water.sun_color.xyz;

    let sun_reflection = normalize(reflect(-sun_dir, surface_normal));
    let specular_light = pow(max(dot(eye_dir, sun_reflection), 0.0), SHINY)
        * sun_color * SPECULAR_STRENGTH;
    let diffuse_light = max(dot(sun_dir, surface_normal), 0.0)
        * sun_color * DIFFUSE_STRENGTH;

    // Reflection ray off the perturbed surface; distortion fades with
    // distance so the horizon stays coherent.
    let distortion = clamp(distortion_scale * (0.1 + 20.0 / dist), 0.0, 1.0);
    let bent_normal = normalize(mix(vec3<f32>(0.0, 1.0, 0.0), surface_normal, distortion));
    var reflect_dir = reflect(-eye_dir, bent_normal);
    reflect_dir.y = abs(reflect_dir.y);
    let reflection_sample =
        textureSampleLevel(environment_map, environment_sampler, reflect_dir, 1.0).xyz;

    let theta = max(dot(eye_dir, surface_normal), 0.0);
    let reflectance = 0.3 + 0.7 * pow(1.0 - theta, 5.0);
    let scatter = max(dot(surface_normal, eye_dir), 0.0) * water.water_color.xyz;

    var albedo = mix(
        sun_color * diffuse_light * 0.3 + scatter,
        vec3<f32>(0.1) + reflection_sample * 0.9 + reflection_sample * specular_light,
        reflectance,
    );

    if water.water_color.w > 0.5 {
        let density = water.fog_color.w;
        let fog_amount = clamp(1.0 - exp(-density * density * dist * dist), 0.0, 1.0);
        albedo = mix(albedo, water.fog_color.xyz, fog_amount);
    }

    let exposure = water.sun_color.w;
    return vec4<f32>(aces_filmic(albedo * exposure), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_struct_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<WaterUniforms>(), 208);
    }

    #[test]
    fn water_shader_parses_and_validates() {
        let module = naga::front::wgsl::parse_str(WATER_SHADER).expect("water shader parses");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("water shader validates");
    }
}
