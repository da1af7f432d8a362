use bytemuck::{Pod, Zeroable};
use log::debug;
use wgpu::util::DeviceExt;

use super::sky::SkyPass;

/// Prefiltered radiance cubemap generated from the current sky. Owned by
/// whoever installed it; dropping it releases the GPU texture.
pub struct EnvironmentProbe {
    _texture: wgpu::Texture,
    pub cube_view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub size: u32,
    pub mip_count: u32,
    pub generation: u64,
}

impl Drop for EnvironmentProbe {
    fn drop(&mut self) {
        debug!("environment probe generation {} released", self.generation);
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FaceParams {
    face_index: u32,
    _pad: [u32; 3],
}

const _: () = assert!(std::mem::size_of::<FaceParams>() == 16);

/// Renders the sky into a cubemap and fills its mip chain, producing the
/// scene's ambient environment source.
pub struct ProbeBaker {
    bake_pipeline: wgpu::RenderPipeline,
    face_bind_groups: [wgpu::BindGroup; 6],
    downsample_pipeline: wgpu::RenderPipeline,
    downsample_layout: wgpu::BindGroupLayout,
    downsample_sampler: wgpu::Sampler,
    size: u32,
    mip_count: u32,
    generation: u64,
}

impl ProbeBaker {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    pub fn new(device: &wgpu::Device, sky: &SkyPass, size: u32) -> Self {
        let face_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("probe-face-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: Some(
                        std::num::NonZeroU64::new(std::mem::size_of::<FaceParams>() as u64)
                            .unwrap(),
                    ),
                },
                count: None,
            }],
        });

        let face_bind_groups = std::array::from_fn(|face| {
            let params = FaceParams {
                face_index: face as u32,
                _pad: [0; 3],
            };
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("probe-face-{face}-params")),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("probe-face-{face}-bind-group")),
                layout: &face_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            })
        });

        let bake_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("probe-bake-layout"),
            bind_group_layouts: &[sky.uniform_layout(), &face_layout],
            push_constant_ranges: &[],
        });
        let bake_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("probe-bake-pipeline"),
            layout: Some(&bake_layout),
            vertex: wgpu::VertexState {
                module: sky.shader(),
                entry_point: Some("vs_face"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: sky.shader(),
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: Self::FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        let downsample_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("probe-downsample-shader"),
            source: wgpu::ShaderSource::Wgsl(DOWNSAMPLE_SHADER.into()),
        });
        let downsample_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("probe-downsample-layout"),
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
        let downsample_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("probe-downsample-pipeline-layout"),
                bind_group_layouts: &[&downsample_layout],
                push_constant_ranges: &[],
            });
        let downsample_pipeline =
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("probe-downsample-pipeline"),
                layout: Some(&downsample_pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &downsample_shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &downsample_shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: Self::FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });

        let downsample_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("probe-downsample-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let size = size.max(1);
        let mip_count = size.ilog2().min(4) + 1;

        Self {
            bake_pipeline,
            face_bind_groups,
            downsample_pipeline,
            downsample_layout,
            downsample_sampler,
            size,
            mip_count,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Renders the sky's current appearance into a fresh probe: six face
    /// passes at full resolution, then a 2x2 box filter per mip level.
    pub fn bake(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        sky: &SkyPass,
    ) -> EnvironmentProbe {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("environment-probe"),
            size: wgpu::Extent3d {
                width: self.size,
                height: self.size,
                depth_or_array_layers: 6,
            },
            mip_level_count: self.mip_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        let face_view = |mip: u32, face: u32| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("probe-face-view"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_mip_level: mip,
                mip_level_count: Some(1),
                base_array_layer: face,
                array_layer_count: Some(1),
                ..Default::default()
            })
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("probe-bake-encoder"),
        });

        for face in 0..6u32 {
            let view = face_view(0, face);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("probe-bake-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.bake_pipeline);
            pass.set_bind_group(0, sky.bind_group(), &[]);
            pass.set_bind_group(1, &self.face_bind_groups[face as usize], &[]);
            pass.draw(0..3, 0..1);
        }

        for mip in 1..self.mip_count {
            for face in 0..6u32 {
                let source = face_view(mip - 1, face);
                let target_view = face_view(mip, face);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("probe-downsample-bind-group"),
                    layout: &self.downsample_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&source),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.downsample_sampler),
                        },
                    ],
                });
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("probe-downsample-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &target_view,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                pass.set_pipeline(&self.downsample_pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("probe-cube-view"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            array_layer_count: Some(6),
            ..Default::default()
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("probe-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        self.generation += 1;
        debug!("baked environment probe generation {}", self.generation);

        EnvironmentProbe {
            _texture: texture,
            cube_view,
            sampler,
            size: self.size,
            mip_count: self.mip_count,
            generation: self.generation,
        }
    }
}

const DOWNSAMPLE_SHADER: &str = r#"
@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

struct BlitOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> BlitOutput {
    var out: BlitOutput;
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    out.position = vec4<f32>(uv * 2.0 - vec2<f32>(1.0), 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

@fragment
fn fs_main(in: BlitOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_params_are_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<FaceParams>(), 16);
    }

    #[test]
    fn downsample_shader_parses_and_validates() {
        let module =
            naga::front::wgsl::parse_str(DOWNSAMPLE_SHADER).expect("downsample shader parses");
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .expect("downsample shader validates");
    }
}
