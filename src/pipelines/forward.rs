//! The forward pipeline family.
//!
//! glTF primitives choose their own vertex formats, strides and topology, so a
//! single wgpu pipeline cannot serve them all. [`PipelineKey`] captures the
//! per-primitive state that a wgpu pipeline bakes in, and [`PipelineCache`]
//! creates one pipeline per distinct key on first use.

use std::collections::HashMap;

use crate::{
    data_structures::{
        document::{ComponentType, DrawMode, ElementType},
        texture::Texture,
    },
    render::{DrawUniforms, ShaderProgram},
    resources::gpu::{BindingSet, IndexType, VertexFormat},
};

/// GPU layout of [`DrawUniforms`]. Unused uniforms stay zero.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawUniformsRaw {
    model_view: [[f32; 4]; 4],
    model_view_proj: [[f32; 4]; 4],
    normal: [[f32; 4]; 4],
    // xyz used, w is padding to keep the 16 byte stride of uniforms
    light_direction: [f32; 4],
    light_intensity: [f32; 4],
    base_color_factor: [f32; 4],
}

impl From<&DrawUniforms> for DrawUniformsRaw {
    fn from(uniforms: &DrawUniforms) -> Self {
        let matrix = |m: Option<cgmath::Matrix4<f32>>| -> [[f32; 4]; 4] {
            m.map(Into::into).unwrap_or_default()
        };
        let vector = |v: Option<cgmath::Vector3<f32>>| -> [f32; 4] {
            v.map(|v| v.extend(0.0).into()).unwrap_or_default()
        };
        Self {
            model_view: matrix(uniforms.model_view),
            model_view_proj: matrix(uniforms.model_view_proj),
            normal: matrix(uniforms.normal),
            light_direction: vector(uniforms.light_direction),
            light_intensity: vector(uniforms.light_intensity),
            base_color_factor: uniforms.base_color_factor.unwrap_or_default(),
        }
    }
}

/// Formats for slots a primitive leaves unbound, fed from a zero buffer.
pub const DEFAULT_SLOT_FORMATS: [wgpu::VertexFormat; 3] = [
    wgpu::VertexFormat::Float32x3,
    wgpu::VertexFormat::Float32x3,
    wgpu::VertexFormat::Float32x2,
];

/// Size of the zero buffer behind unbound slots; one element of the widest default format.
pub const DEFAULT_SLOT_STRIDE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotLayout {
    pub format: wgpu::VertexFormat,
    pub stride: u64,
    pub step_mode: wgpu::VertexStepMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub slots: [SlotLayout; 3],
    pub topology: wgpu::PrimitiveTopology,
    pub strip_index_format: Option<wgpu::IndexFormat>,
}

pub fn index_format(index_type: IndexType) -> wgpu::IndexFormat {
    match index_type {
        IndexType::U16 => wgpu::IndexFormat::Uint16,
        IndexType::U32 => wgpu::IndexFormat::Uint32,
    }
}

/// The wgpu format a shader `vec*<f32>` input can be fed from.
///
/// Integer attributes are only usable when normalized; wgpu has no 3-component
/// 8 or 16 bit formats.
pub fn vertex_format(format: &VertexFormat) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as F;
    let normalized = format.normalized;
    let format = match (format.component_type, format.element_type, normalized) {
        (ComponentType::F32, ElementType::Scalar, _) => F::Float32,
        (ComponentType::F32, ElementType::Vec2, _) => F::Float32x2,
        (ComponentType::F32, ElementType::Vec3, _) => F::Float32x3,
        (ComponentType::F32, ElementType::Vec4, _) => F::Float32x4,
        (ComponentType::U8, ElementType::Vec2, true) => F::Unorm8x2,
        (ComponentType::U8, ElementType::Vec4, true) => F::Unorm8x4,
        (ComponentType::I8, ElementType::Vec2, true) => F::Snorm8x2,
        (ComponentType::I8, ElementType::Vec4, true) => F::Snorm8x4,
        (ComponentType::U16, ElementType::Vec2, true) => F::Unorm16x2,
        (ComponentType::U16, ElementType::Vec4, true) => F::Unorm16x4,
        (ComponentType::I16, ElementType::Vec2, true) => F::Snorm16x2,
        (ComponentType::I16, ElementType::Vec4, true) => F::Snorm16x4,
        _ => return None,
    };
    Some(format)
}

/// Topology for a draw mode; loops and fans have no wgpu equivalent.
pub fn topology(mode: DrawMode) -> Option<wgpu::PrimitiveTopology> {
    match mode {
        DrawMode::Points => Some(wgpu::PrimitiveTopology::PointList),
        DrawMode::Lines => Some(wgpu::PrimitiveTopology::LineList),
        DrawMode::LineStrip => Some(wgpu::PrimitiveTopology::LineStrip),
        DrawMode::Triangles => Some(wgpu::PrimitiveTopology::TriangleList),
        DrawMode::TriangleStrip => Some(wgpu::PrimitiveTopology::TriangleStrip),
        DrawMode::LineLoop | DrawMode::TriangleFan => None,
    }
}

impl PipelineKey {
    /// Why a binding set cannot be drawn, as the error.
    pub fn for_binding(binding: &BindingSet) -> Result<Self, String> {
        let topology =
            topology(binding.mode).ok_or_else(|| format!("draw mode {:?}", binding.mode))?;
        let mut slots = [SlotLayout {
            format: wgpu::VertexFormat::Float32,
            stride: DEFAULT_SLOT_STRIDE,
            step_mode: wgpu::VertexStepMode::Instance,
        }; 3];
        for (slot, layout) in slots.iter_mut().enumerate() {
            *layout = match &binding.attributes[slot] {
                Some(attribute)
                    if attribute.stride % wgpu::VERTEX_STRIDE_ALIGNMENT != 0
                        || attribute.offset % wgpu::VERTEX_STRIDE_ALIGNMENT != 0 =>
                {
                    return Err(format!(
                        "attribute alignment (offset {}, stride {})",
                        attribute.offset, attribute.stride
                    ));
                }
                Some(attribute) => SlotLayout {
                    format: vertex_format(&attribute.format)
                        .ok_or_else(|| format!("vertex format {:?}", attribute.format))?,
                    stride: attribute.stride,
                    step_mode: wgpu::VertexStepMode::Vertex,
                },
                None => SlotLayout {
                    format: DEFAULT_SLOT_FORMATS[slot],
                    stride: DEFAULT_SLOT_STRIDE,
                    step_mode: wgpu::VertexStepMode::Instance,
                },
            };
        }
        let strip_index_format = match topology {
            wgpu::PrimitiveTopology::LineStrip | wgpu::PrimitiveTopology::TriangleStrip => {
                binding.index.map(|index| index_format(index.index_type))
            }
            _ => None,
        };
        Ok(Self {
            slots,
            topology,
            strip_index_format,
        })
    }
}

pub fn mk_uniform_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: wgpu::BufferSize::new(
                    std::mem::size_of::<DrawUniformsRaw>() as u64
                ),
            },
            count: None,
        }],
        label: Some("draw_uniforms_bind_group_layout"),
    })
}

pub fn mk_texture_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
        label: Some("base_color_bind_group_layout"),
    })
}

/// Pipelines of one shader program, one per [`PipelineKey`].
#[derive(Debug)]
pub struct PipelineCache {
    layout: wgpu::PipelineLayout,
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new(
        device: &wgpu::Device,
        program: &ShaderProgram,
        color_format: wgpu::TextureFormat,
        uniform_layout: &wgpu::BindGroupLayout,
        texture_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Forward Pipeline Layout"),
            bind_group_layouts: &[uniform_layout, texture_layout],
            immediate_size: 0,
        });
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&program.vertex.label),
            source: wgpu::ShaderSource::Wgsl(program.vertex.code.as_str().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&program.fragment.label),
            source: wgpu::ShaderSource::Wgsl(program.fragment.code.as_str().into()),
        });
        Self {
            layout,
            vertex,
            fragment,
            color_format,
            pipelines: HashMap::new(),
        }
    }

    pub fn prepare(&mut self, device: &wgpu::Device, key: PipelineKey) {
        if self.pipelines.contains_key(&key) {
            return;
        }
        let pipeline = mk_render_pipeline(
            device,
            &self.layout,
            &self.vertex,
            &self.fragment,
            self.color_format,
            Some(Texture::DEPTH_FORMAT),
            &key,
        );
        self.pipelines.insert(key, pipeline);
    }

    pub fn get(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(key)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

pub fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    vertex: &wgpu::ShaderModule,
    fragment: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    depth_format: Option<wgpu::TextureFormat>,
    key: &PipelineKey,
) -> wgpu::RenderPipeline {
    let attributes: Vec<[wgpu::VertexAttribute; 1]> = key
        .slots
        .iter()
        .enumerate()
        .map(|(location, slot)| {
            [wgpu::VertexAttribute {
                offset: 0,
                shader_location: location as u32,
                format: slot.format,
            }]
        })
        .collect();
    let buffers: Vec<wgpu::VertexBufferLayout> = key
        .slots
        .iter()
        .zip(&attributes)
        .map(|(slot, attributes)| wgpu::VertexBufferLayout {
            array_stride: slot.stride,
            step_mode: slot.step_mode,
            attributes,
        })
        .collect();

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some("Forward Pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vertex,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: fragment,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: key.topology,
            strip_index_format: key.strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            // glTF materials may be double sided
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
            format,
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
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::gpu::{AttributeBinding, BufferHandle};

    fn binding(mode: DrawMode) -> BindingSet {
        BindingSet {
            attributes: [None; 3],
            index: None,
            mode,
            array_count: 0,
        }
    }

    #[test]
    fn fans_and_loops_are_rejected() {
        assert!(PipelineKey::for_binding(&binding(DrawMode::TriangleFan)).is_err());
        assert!(PipelineKey::for_binding(&binding(DrawMode::LineLoop)).is_err());
        assert!(PipelineKey::for_binding(&binding(DrawMode::Triangles)).is_ok());
    }

    #[test]
    fn unbound_slots_step_per_instance() {
        let key = PipelineKey::for_binding(&binding(DrawMode::Triangles)).unwrap();
        assert!(
            key.slots
                .iter()
                .all(|slot| slot.step_mode == wgpu::VertexStepMode::Instance)
        );
        assert_eq!(key.slots[2].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn integer_attributes_need_normalization() {
        let plain = VertexFormat {
            component_type: ComponentType::U8,
            element_type: ElementType::Vec4,
            normalized: false,
        };
        assert_eq!(vertex_format(&plain), None);
        let normalized = VertexFormat {
            normalized: true,
            ..plain
        };
        assert_eq!(vertex_format(&normalized), Some(wgpu::VertexFormat::Unorm8x4));

        let mut with_attribute = binding(DrawMode::Triangles);
        with_attribute.attributes[0] = Some(AttributeBinding {
            buffer: BufferHandle::default(),
            format: plain,
            offset: 0,
            stride: 4,
            count: 3,
        });
        assert!(PipelineKey::for_binding(&with_attribute).is_err());
    }
}
