use bytemuck::{bytes_of, Pod, Zeroable};
use glam::Vec3;

use crate::camera::Camera;
use crate::scene::{SkySettings, TONE_MAPPING_EXPOSURE};

use super::DepthBuffer;

/// The procedural sky dome.
///
/// The dome is drawn as a fullscreen triangle whose rays are unprojected
/// through the inverse view-projection, which renders the same enclosing
/// shell without a dome mesh. The analytic scattering model is driven by
/// the four tunables plus the raw (unnormalized) sun position vector.
/// The fragment entry point is shared with the probe baker, which swaps
/// in a vertex stage that emits fixed per-cubemap-face rays.
pub struct SkyPass {
    shader: wgpu::ShaderModule,
    screen_pipeline: wgpu::RenderPipeline,
    uniforms: SkyUniforms,
    uniform_buffer: wgpu::Buffer,
    uniform_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
}

impl SkyPass {
    pub fn new(
        device: &wgpu::Device,
        settings: &SkySettings,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sky-shader"),
            source: wgpu::ShaderSource::Wgsl(SKY_SHADER.into()),
        });

        let uniforms = SkyUniforms {
            inv_view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            camera_position: [0.0, 0.0, 0.0, TONE_MAPPING_EXPOSURE],
            sun_position: [0.0, 1.0, 0.0, settings.dome_scale],
            params: [
                settings.turbidity,
                settings.rayleigh,
                settings.mie_coefficient,
                settings.mie_directional_g,
            ],
        };
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sky-uniforms"),
            size: std::mem::size_of::<SkyUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sky-uniform-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<SkyUniforms>() as u64)
                            .unwrap(),
                    ),
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sky-bind-group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("sky-pipeline-layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        // The sky sits at the far plane: depth test passes only where no
        // geometry has written, and the depth buffer is left untouched.
        let screen_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sky-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_screen"),
                compilation_options: Default::default(),
                buffers: &[],
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
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
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

        Self {
            shader,
            screen_pipeline,
            uniforms,
            uniform_buffer,
            uniform_layout,
            bind_group,
        }
    }

    /// Assigns the sun position uniform. The vector is taken as-is; the
    /// shader normalizes its own copy where a direction is needed.
    pub fn set_sun_position(&mut self, queue: &wgpu::Queue, position: Vec3) {
        self.uniforms.sun_position[0] = position.x;
        self.uniforms.sun_position[1] = position.y;
        self.uniforms.sun_position[2] = position.z;
        queue.write_buffer(&self.uniform_buffer, 0, bytes_of(&self.uniforms));
    }

    pub fn sun_position(&self) -> Vec3 {
        Vec3::new(
            self.uniforms.sun_position[0],
            self.uniforms.sun_position[1],
            self.uniforms.sun_position[2],
        )
    }

    /// Writes the per-frame camera uniforms.
    pub fn prepare(&mut self, queue: &wgpu::Queue, camera: &Camera) {
        self.uniforms.inv_view_proj = camera.view_proj().inverse().to_cols_array_2d();
        let exposure = self.uniforms.camera_position[3];
        self.uniforms.camera_position = camera.position.extend(exposure).to_array();
        queue.write_buffer(&self.uniform_buffer, 0, bytes_of(&self.uniforms));
    }

    pub fn draw<'pass>(&'pass self, pass: &mut wgpu::RenderPass<'pass>) {
        pass.set_pipeline(&self.screen_pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub(crate) fn shader(&self) -> &wgpu::ShaderModule {
        &self.shader
    }

    pub(crate) fn uniform_layout(&self) -> &wgpu::BindGroupLayout {
        &self.uniform_layout
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkyUniforms {
    inv_view_proj: [[f32; 4]; 4],
    /// xyz camera position, w tone-mapping exposure.
    camera_position: [f32; 4],
    /// xyz raw sun position, w dome scale.
    sun_position: [f32; 4],
    /// turbidity, rayleigh, mie coefficient, mie directional g.
    params: [f32; 4],
}

const _: () = assert!(std::mem::size_of::<SkyUniforms>() == 112);

pub(crate) const SKY_SHADER: &str = r#"
struct SkyUniforms {
    inv_view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    sun_position: vec4<f32>,
    params: vec4<f32>,
}

struct FaceParams {
    face_index: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> sky: SkyUniforms;
@group(1) @binding(0) var<uniform> face: FaceParams;

struct SkyVertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ray_dir: vec3<f32>,
}

fn fullscreen_ndc(index: u32) -> vec2<f32> {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    return uv * 2.0 - vec2<f32>(1.0);
}

@vertex
fn vs_screen(@builtin(vertex_index) index: u32) -> SkyVertexOutput {
    var out: SkyVertexOutput;
    let ndc = fullscreen_ndc(index);
    out.position = vec4<f32>(ndc, 1.0, 1.0);
    let far_point = sky.inv_view_proj * vec4<f32>(ndc, 1.0, 1.0);
    out.ray_dir = far_point.xyz / far_point.w - sky.camera_position.xyz;
    return out;
}

// Ray through a cubemap face texel, wgpu layer order +X -X +Y -Y +Z -Z.
fn cubemap_ray(face_index: u32, ndc: vec2<f32>) -> vec3<f32> {
    let u = ndc.x;
    let v = -ndc.y;
    switch face_index {
        case 0u: { return vec3<f32>(1.0, -v, -u); }
        case 1u: { return vec3<f32>(-1.0, -v, u); }
        case 2u: { return vec3<f32>(u, 1.0, v); }
        case 3u: { return vec3<f32>(u, -1.0, -v); }
        case 4u: { return vec3<f32>(u, -v, 1.0); }
        default: { return vec3<f32>(-u, -v, -1.0); }
    }
}

@vertex
fn vs_face(@builtin(vertex_index) index: u32) -> SkyVertexOutput {
    var out: SkyVertexOutput;
    let ndc = fullscreen_ndc(index);
    out.position = vec4<f32>(ndc, 1.0, 1.0);
    out.ray_dir = cubemap_ray(face.face_index, ndc);
    return out;
}

const PI: f32 = 3.141592653589793;
const UP: vec3<f32> = vec3<f32>(0.0, 1.0, 0.0);

// Rayleigh scattering total for the visible wavelengths at sea level.
const TOTAL_RAYLEIGH: vec3<f32> = vec3<f32>(5.804543e-6, 1.3562912e-5, 3.0265902e-5);
// Mie scattering constant, K coefficient premultiplied.
const MIE_CONST: vec3<f32> = vec3<f32>(1.8399918e14, 2.7798024e14, 4.0790480e14);

const CUTOFF_ANGLE: f32 = 1.6110732;   // pi / 1.95
const STEEPNESS: f32 = 1.5;
const SUN_EE: f32 = 1000.0;
const SUN_ANGULAR_DIAMETER_COS: f32 = 0.9999567;

fn sun_intensity(zenith_cos: f32) -> f32 {
    let angle = acos(clamp(zenith_cos, -1.0, 1.0));
    return SUN_EE * max(0.0, 1.0 - exp(-((CUTOFF_ANGLE - angle) / STEEPNESS)));
}

fn total_mie(turbidity: f32) -> vec3<f32> {
    let c = (0.2 * turbidity) * 10.0e-18;
    return 0.434 * c * MIE_CONST;
}

fn rayleigh_phase(cos_half: f32) -> f32 {
    return (3.0 / (16.0 * PI)) * (1.0 + cos_half * cos_half);
}

fn hg_phase(cos_theta: f32, g: f32) -> f32 {
    let g2 = g * g;
    let denom = pow(1.0 - 2.0 * g * cos_theta + g2, 1.5);
    return (1.0 / (4.0 * PI)) * ((1.0 - g2) / denom);
}

fn aces_filmic(color: vec3<f32>) -> vec3<f32> {
    let mapped = (color * (2.51 * color + vec3<f32>(0.03)))
        / (color * (2.43 * color + vec3<f32>(0.59)) + vec3<f32>(0.14));
    return clamp(mapped, vec3<f32>(0.0), vec3<f32>(1.0));
}

@fragment
fn fs_main(in: SkyVertexOutput) -> @location(0) vec4<f32> {
    let turbidity = sky.params.x;
    let rayleigh = sky.params.y;
    let mie_coefficient = sky.params.z;
    let mie_directional_g = sky.params.w;

    let direction = normalize(in.ray_dir);
    let sun_direction = normalize(sky.sun_position.xyz);

    let sun_e = sun_intensity(dot(sun_direction, UP));
    let sunfade = 1.0 - clamp(1.0 - exp(sky.sun_position.y / 450000.0), 0.0, 1.0);

    let rayleigh_coefficient = rayleigh - (1.0 - sunfade);
    let beta_r = TOTAL_RAYLEIGH * rayleigh_coefficient;
    let beta_m = total_mie(turbidity) * mie_coefficient;

    // Relative optical mass along the view ray.
    let zenith_angle = acos(max(0.0, dot(UP, direction)));
    let zenith_deg = zenith_angle * 180.0 / PI;
    let mass = 1.0 / (cos(zenith_angle) + 0.15 * pow(max(0.001, 93.885 - zenith_deg), -1.253));
    let s_r = 8400.0 * mass;
    let s_m = 1250.0 * mass;

    // Combined extinction.
    let fex = exp(-(beta_r * s_r + beta_m * s_m));

    // In-scattering toward the viewer.
    let cos_theta = dot(direction, sun_direction);
    let beta_r_theta = beta_r * rayleigh_phase(cos_theta * 0.5 + 0.5);
    let beta_m_theta = beta_m * hg_phase(cos_theta, mie_directional_g);

    let lin_base = sun_e * ((beta_r_theta + beta_m_theta) / (beta_r + beta_m));
    var lin = pow(lin_base * (vec3<f32>(1.0) - fex), vec3<f32>(1.5));
    lin = lin * mix(
        vec3<f32>(1.0),
        pow(lin_base * fex, vec3<f32>(0.5)),
        clamp(pow(1.0 - dot(UP, sun_direction), 5.0), 0.0, 1.0),
    );

    // Night-side base glow plus the solar disk.
    var l0 = 0.1 * fex;
    let sundisk = smoothstep(
        SUN_ANGULAR_DIAMETER_COS,
        SUN_ANGULAR_DIAMETER_COS + 0.00002,
        cos_theta,
    );
    l0 = l0 + sun_e * 19000.0 * fex * sundisk;

    let tex_color = (lin + l0) * 0.04 + vec3<f32>(0.0, 0.0003, 0.00075);
    let ret_color = pow(tex_color, vec3<f32>(1.0 / (1.2 + 1.2 * sunfade)));

    let exposure = sky.camera_position.w;
    return vec4<f32>(aces_filmic(ret_color * exposure), 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_struct_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<SkyUniforms>(), 112);
    }

    #[test]
    fn sky_shader_parses_and_validates() {
        let module = naga::front::wgsl::parse_str(SKY_SHADER).expect("sky shader parses");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("sky shader validates");
    }
}
