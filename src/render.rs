//! Frame composition.
//!
//! [`build_frame`] walks the default scene and produces one [`DrawCall`] per
//! mesh primitive of every visited node. A draw call is self-contained: it
//! names the binding set, the texture and every uniform value it needs, so the
//! device side can rebind all of it for each draw without relying on state a
//! previous draw left behind. Building the frame touches no device objects,
//! which keeps it testable without a GPU.
//!
//! # Key types
//!
//! - [`ShaderProgram`] is the vertex + fragment source pair and the set of
//!   uniforms it actually uses
//! - [`LightState`] is the directional light, either fixed in the world or
//!   locked to the camera
//! - [`Frame`] / [`DrawCall`] are the output handed to the backend

use std::collections::HashSet;

use anyhow::Context as _;
use cgmath::{InnerSpace, Vector3};

use crate::{
    camera::{Camera, unit_or},
    data_structures::{
        document::{DrawMode, SceneDocument},
        instance::{normal_matrix, transform_direction},
        scene_graph::traverse_default_scene,
    },
    error::DocumentError,
    resources::gpu::{Backend, BindingHandle, GpuResources, IndexType, TextureHandle},
};

/// Uniforms a shader program may read, addressed by their member name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniform {
    ModelViewMatrix,
    ModelViewProjMatrix,
    NormalMatrix,
    LightDirection,
    LightIntensity,
    BaseColorTexture,
    BaseColorFactor,
}

impl Uniform {
    pub const ALL: [Uniform; 7] = [
        Uniform::ModelViewMatrix,
        Uniform::ModelViewProjMatrix,
        Uniform::NormalMatrix,
        Uniform::LightDirection,
        Uniform::LightIntensity,
        Uniform::BaseColorTexture,
        Uniform::BaseColorFactor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Uniform::ModelViewMatrix => "model_view_matrix",
            Uniform::ModelViewProjMatrix => "model_view_proj_matrix",
            Uniform::NormalMatrix => "normal_matrix",
            Uniform::LightDirection => "light_direction",
            Uniform::LightIntensity => "light_intensity",
            Uniform::BaseColorTexture => "base_color_texture",
            Uniform::BaseColorFactor => "base_color_factor",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// The uniforms a program uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformSet(u8);

impl UniformSet {
    pub fn all() -> Self {
        Uniform::ALL.iter().fold(Self::default(), |set, &u| set.with(u))
    }

    pub fn with(self, uniform: Uniform) -> Self {
        Self(self.0 | uniform.bit())
    }

    pub fn contains(&self, uniform: Uniform) -> bool {
        self.0 & uniform.bit() != 0
    }
}

/// Walk the call graph from the entry points.
fn reachable_functions(module: &naga::Module) -> Vec<&naga::Function> {
    let mut functions: Vec<&naga::Function> =
        module.entry_points.iter().map(|entry| &entry.function).collect();
    let mut called = HashSet::new();
    let mut next = 0;
    while next < functions.len() {
        let function = functions[next];
        next += 1;
        let mut blocks = vec![&function.body];
        while let Some(block) = blocks.pop() {
            for statement in block.iter() {
                match statement {
                    naga::Statement::Block(inner) => blocks.push(inner),
                    naga::Statement::If { accept, reject, .. } => {
                        blocks.push(accept);
                        blocks.push(reject);
                    }
                    naga::Statement::Switch { cases, .. } => {
                        blocks.extend(cases.iter().map(|case| &case.body))
                    }
                    naga::Statement::Loop {
                        body, continuing, ..
                    } => {
                        blocks.push(body);
                        blocks.push(continuing);
                    }
                    naga::Statement::Call { function, .. } if called.insert(*function) => {
                        functions.push(&module.functions[*function])
                    }
                    _ => {}
                }
            }
        }
    }
    functions
}

/// The global an expression points into, looking through loads.
fn accessed_global(
    function: &naga::Function,
    expression: naga::Handle<naga::Expression>,
) -> Option<naga::Handle<naga::GlobalVariable>> {
    match function.expressions[expression] {
        naga::Expression::GlobalVariable(global) => Some(global),
        naga::Expression::Load { pointer } => accessed_global(function, pointer),
        _ => None,
    }
}

/// Names a module actually uses: members of `var<uniform>` blocks read by
/// code reachable from an entry point, plus every declared global.
fn used_names(module: &naga::Module) -> HashSet<String> {
    let mut names: HashSet<String> = module
        .global_variables
        .iter()
        .filter_map(|(_, global)| global.name.clone())
        .collect();
    for function in reachable_functions(module) {
        for (_, expression) in function.expressions.iter() {
            let naga::Expression::AccessIndex { base, index } = *expression else {
                continue;
            };
            let Some(global) = accessed_global(function, base) else {
                continue;
            };
            let global = &module.global_variables[global];
            if global.space != naga::AddressSpace::Uniform {
                continue;
            }
            if let naga::TypeInner::Struct { members, .. } = &module.types[global.ty].inner {
                if let Some(name) = members.get(index as usize).and_then(|m| m.name.clone()) {
                    names.insert(name);
                }
            }
        }
    }
    names
}

fn parse_wgsl(source: &ShaderSource) -> anyhow::Result<naga::Module> {
    naga::front::wgsl::parse_str(&source.code).map_err(|e| {
        anyhow::anyhow!(
            "failed to parse shader {}:\n{}",
            source.label,
            e.emit_to_string(&source.code)
        )
    })
}

/// A named WGSL source.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub label: String,
    pub code: String,
}

pub const DEFAULT_VERTEX_SHADER: &str = "forward.vs.wgsl";
pub const DEFAULT_FRAGMENT_SHADER: &str = "pbr_directional_light.fs.wgsl";

const FORWARD_VERTEX: &str = include_str!("shaders/forward.vs.wgsl");
const DIRECTIONAL_LIGHT_FRAGMENT: &str = include_str!("shaders/pbr_directional_light.fs.wgsl");
const NORMALS_FRAGMENT: &str = include_str!("shaders/normals.fs.wgsl");

/// Shaders compiled into the binary, addressable by name.
pub const BUILTIN_SHADERS: [(&str, &str); 3] = [
    (DEFAULT_VERTEX_SHADER, FORWARD_VERTEX),
    (DEFAULT_FRAGMENT_SHADER, DIRECTIONAL_LIGHT_FRAGMENT),
    ("normals.fs.wgsl", NORMALS_FRAGMENT),
];

impl ShaderSource {
    pub fn builtin(name: &str) -> Option<Self> {
        BUILTIN_SHADERS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(label, code)| ShaderSource {
                label: label.to_string(),
                code: code.to_string(),
            })
    }

    /// A built-in shader name, or a path to a WGSL file.
    pub fn load(name_or_path: &str) -> anyhow::Result<Self> {
        if let Some(builtin) = Self::builtin(name_or_path) {
            return Ok(builtin);
        }
        let code = std::fs::read_to_string(name_or_path)
            .with_context(|| format!("failed to read shader {name_or_path}"))?;
        Ok(ShaderSource {
            label: name_or_path.to_string(),
            code,
        })
    }
}

/// A vertex + fragment pair. Entry points are `vs_main` and `fs_main`.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    uniforms: UniformSet,
}

impl ShaderProgram {
    /// Parse both stages and record which uniforms they read.
    ///
    /// Block members count only when code reachable from an entry point reads
    /// them; the texture counts when its global is declared.
    pub fn new(vertex: ShaderSource, fragment: ShaderSource) -> anyhow::Result<Self> {
        let mut names = used_names(&parse_wgsl(&vertex)?);
        names.extend(used_names(&parse_wgsl(&fragment)?));
        let uniforms = Uniform::ALL
            .iter()
            .filter(|uniform| names.contains(uniform.name()))
            .fold(UniformSet::default(), |set, &uniform| set.with(uniform));
        Ok(Self {
            vertex,
            fragment,
            uniforms,
        })
    }

    pub fn builtin_default() -> anyhow::Result<Self> {
        Self::new(
            ShaderSource {
                label: DEFAULT_VERTEX_SHADER.to_string(),
                code: FORWARD_VERTEX.to_string(),
            },
            ShaderSource {
                label: DEFAULT_FRAGMENT_SHADER.to_string(),
                code: DIRECTIONAL_LIGHT_FRAGMENT.to_string(),
            },
        )
    }

    pub fn uniforms(&self) -> UniformSet {
        self.uniforms
    }

    pub fn uses(&self, uniform: Uniform) -> bool {
        self.uniforms.contains(uniform)
    }

    /// The name `uniform` is bound under, if the program reads it.
    pub fn location(&self, uniform: Uniform) -> Option<&'static str> {
        self.uses(uniform).then(|| uniform.name())
    }
}

/// A directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightState {
    /// World-space direction towards the light.
    pub direction: Vector3<f32>,
    pub color: Vector3<f32>,
    pub intensity: f32,
    /// Shine from the viewer instead of `direction`.
    pub from_camera: bool,
}

impl Default for LightState {
    fn default() -> Self {
        Self {
            direction: Vector3::new(1.0, 1.0, 1.0).normalize(),
            color: Vector3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            from_camera: false,
        }
    }
}

impl LightState {
    /// Direction towards the light in view space.
    pub fn view_direction(&self, view: &cgmath::Matrix4<f32>) -> Vector3<f32> {
        if self.from_camera {
            Vector3::unit_z()
        } else {
            unit_or(transform_direction(view, self.direction), Vector3::unit_z())
        }
    }

    pub fn radiance(&self) -> Vector3<f32> {
        self.color * self.intensity
    }
}

/// Per-draw uniform values. `None` marks a uniform the program does not use.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawUniforms {
    pub model_view: Option<cgmath::Matrix4<f32>>,
    pub model_view_proj: Option<cgmath::Matrix4<f32>>,
    pub normal: Option<cgmath::Matrix4<f32>>,
    pub light_direction: Option<Vector3<f32>>,
    pub light_intensity: Option<Vector3<f32>>,
    pub base_color_factor: Option<[f32; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Indexed { count: u32, index_type: IndexType },
    Arrays { count: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub node: usize,
    pub mesh: usize,
    pub primitive: usize,
    pub binding: BindingHandle,
    /// Bound even when the program does not sample it.
    pub texture: TextureHandle,
    pub mode: DrawMode,
    pub kind: DrawKind,
    pub uniforms: DrawUniforms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub view: cgmath::Matrix4<f32>,
    pub projection: cgmath::Matrix4<f32>,
    pub draws: Vec<DrawCall>,
}

/// Base colour texture and factor of a material, with the white texture and a
/// factor of one standing in for whatever is missing.
fn material_inputs<B: Backend>(
    document: &SceneDocument,
    resources: &GpuResources<B>,
    material: Option<usize>,
    owner: &str,
) -> Result<(TextureHandle, [f32; 4]), DocumentError> {
    let Some(material_index) = material else {
        return Ok((resources.white_texture(), [1.0; 4]));
    };
    let material = document.material(material_index, || owner.to_string())?;
    let texture = match material.base_color_texture {
        Some(texture_index) => {
            let texture = document.texture(texture_index, || format!("material {material_index}"))?;
            let image = texture.source.ok_or(DocumentError::MissingImage {
                texture: texture_index,
            })?;
            resources
                .image_texture(image)
                .ok_or_else(|| DocumentError::DanglingIndex {
                    kind: "image texture",
                    index: image,
                    len: document.images.len(),
                    owner: format!("texture {texture_index}"),
                })?
        }
        None => resources.white_texture(),
    };
    Ok((texture, material.base_color_factor))
}

/// Compose the draw calls of the default scene for one frame.
///
/// A document without a default scene yields a frame with no draws.
pub fn build_frame<B: Backend>(
    document: &SceneDocument,
    resources: &GpuResources<B>,
    uniforms: UniformSet,
    camera: &Camera,
    projection: &cgmath::Matrix4<f32>,
    light: &LightState,
) -> Result<Frame, DocumentError> {
    let view = camera.view_matrix();
    let light_direction = light.view_direction(&view);
    let light_intensity = light.radiance();
    let uses = |uniform: Uniform| uniforms.contains(uniform);

    let mut draws = Vec::new();
    for visited in traverse_default_scene(document) {
        let visited = visited?;
        let node = document.node(visited.node, || "frame".to_string())?;
        let Some(mesh_index) = node.mesh else {
            continue;
        };
        let mesh = document.mesh(mesh_index, || format!("node {}", visited.node))?;

        let model_view = view * visited.world;
        let model_view_proj = projection * model_view;
        let normal = normal_matrix(&model_view);

        for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
            let owner = format!("mesh {mesh_index} primitive {primitive_index}");
            let binding = resources
                .primitive_binding(mesh_index, primitive_index)
                .ok_or_else(|| DocumentError::DanglingIndex {
                    kind: "binding set",
                    index: primitive_index,
                    len: resources.mesh_range(mesh_index).map_or(0, |r| r.count),
                    owner: owner.clone(),
                })?;
            let binding_set = resources.binding(binding);
            let (texture, base_color_factor) =
                material_inputs(document, resources, primitive.material, &owner)?;

            let kind = match binding_set.index {
                Some(index) => DrawKind::Indexed {
                    count: index.count,
                    index_type: index.index_type,
                },
                None => DrawKind::Arrays {
                    count: binding_set.array_count,
                },
            };

            draws.push(DrawCall {
                node: visited.node,
                mesh: mesh_index,
                primitive: primitive_index,
                binding,
                texture,
                mode: binding_set.mode,
                kind,
                uniforms: DrawUniforms {
                    model_view: uses(Uniform::ModelViewMatrix).then_some(model_view),
                    model_view_proj: uses(Uniform::ModelViewProjMatrix).then_some(model_view_proj),
                    normal: uses(Uniform::NormalMatrix).then_some(normal),
                    light_direction: uses(Uniform::LightDirection).then_some(light_direction),
                    light_intensity: uses(Uniform::LightIntensity).then_some(light_intensity),
                    base_color_factor: uses(Uniform::BaseColorFactor).then_some(base_color_factor),
                },
            });
        }
    }

    Ok(Frame {
        view,
        projection: *projection,
        draws,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(fragment: &str) -> ShaderProgram {
        ShaderProgram::new(
            ShaderSource::builtin(DEFAULT_VERTEX_SHADER).unwrap(),
            ShaderSource {
                label: "test.fs.wgsl".to_string(),
                code: fragment.to_string(),
            },
        )
        .unwrap()
    }

    const BLOCK: &str = "struct DrawUniforms {
    model_view_matrix: mat4x4<f32>,
    model_view_proj_matrix: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    light_direction: vec4<f32>,
    light_intensity: vec4<f32>,
    base_color_factor: vec4<f32>,
};
@group(0) @binding(0)
var<uniform> draw: DrawUniforms;
";

    #[test]
    fn comments_and_declarations_are_not_reads() {
        let fragment = format!(
            "{BLOCK}
// shade with draw.light_direction later
@fragment
fn fs_main() -> @location(0) vec4<f32> {{
    return draw.base_color_factor;
}}"
        );
        let program = program(&fragment);
        assert!(!program.uses(Uniform::LightDirection));
        assert!(!program.uses(Uniform::LightIntensity));
        assert!(program.uses(Uniform::BaseColorFactor));
    }

    #[test]
    fn reads_through_helper_functions_count() {
        let fragment = format!(
            "{BLOCK}
fn unused() -> vec4<f32> {{
    return draw.light_intensity;
}}
fn light() -> vec3<f32> {{
    return draw.light_direction.xyz;
}}
@fragment
fn fs_main() -> @location(0) vec4<f32> {{
    return vec4<f32>(light(), 1.0);
}}"
        );
        let program = program(&fragment);
        assert!(program.uses(Uniform::LightDirection));
        assert!(!program.uses(Uniform::LightIntensity));
    }

    #[test]
    fn invalid_wgsl_is_an_error() {
        let result = ShaderProgram::new(
            ShaderSource::builtin(DEFAULT_VERTEX_SHADER).unwrap(),
            ShaderSource {
                label: "broken.wgsl".to_string(),
                code: "fn fs_main( {".to_string(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn default_program_uses_every_uniform() {
        assert_eq!(ShaderProgram::builtin_default().unwrap().uniforms(), UniformSet::all());
    }

    #[test]
    fn normals_program_skips_lighting_and_material() {
        let program = ShaderProgram::new(
            ShaderSource::builtin(DEFAULT_VERTEX_SHADER).unwrap(),
            ShaderSource::builtin("normals.fs.wgsl").unwrap(),
        )
        .unwrap();
        assert!(program.uses(Uniform::ModelViewProjMatrix));
        assert!(program.uses(Uniform::NormalMatrix));
        assert!(!program.uses(Uniform::LightDirection));
        assert!(!program.uses(Uniform::LightIntensity));
        assert!(!program.uses(Uniform::BaseColorFactor));
        assert!(!program.uses(Uniform::BaseColorTexture));
    }
}
