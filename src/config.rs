//! Command line surface and the validated viewer configuration.

use std::path::PathBuf;

use cgmath::{Point3, Vector3};
use clap::Parser;

use crate::{
    camera::{Camera, CameraKind},
    render::{DEFAULT_FRAGMENT_SHADER, DEFAULT_VERTEX_SHADER, LightState, ShaderProgram, ShaderSource},
    resources::sampler::SamplerState,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "gltf-viewer")]
#[command(about = "View a glTF 2.0 scene interactively or render it to a PNG")]
#[command(version)]
pub struct Cli {
    /// Path to a .gltf or .glb file
    pub file: PathBuf,

    /// Framebuffer width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Framebuffer height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Camera pose as eye, center and up: x,y,z,x,y,z,x,y,z
    #[arg(long, value_parser = parse_lookat, allow_hyphen_values = true)]
    pub lookat: Option<Camera>,

    /// Built-in vertex shader name or path to a WGSL file
    #[arg(long, default_value = DEFAULT_VERTEX_SHADER)]
    pub vertex_shader: String,

    /// Built-in fragment shader name or path to a WGSL file
    #[arg(long, default_value = DEFAULT_FRAGMENT_SHADER)]
    pub fragment_shader: String,

    /// Render one frame to this PNG file instead of opening a window
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Initial camera controller
    #[arg(long, value_enum, default_value_t = CameraKind::FirstPerson)]
    pub camera: CameraKind,
}

/// Parse `--lookat`: exactly nine comma separated floats, eye distinct from center.
pub fn parse_lookat(value: &str) -> Result<Camera, String> {
    let values = value
        .split(',')
        .map(|v| v.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in {value:?}: {e}"))?;
    let [ex, ey, ez, cx, cy, cz, ux, uy, uz] = values[..] else {
        return Err(format!("expected 9 comma separated values, got {}", values.len()));
    };
    let eye = Point3::new(ex, ey, ez);
    let center = Point3::new(cx, cy, cz);
    if eye == center {
        return Err("eye and center must differ".to_string());
    }
    Ok(Camera::new(eye, center, Vector3::new(ux, uy, uz)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    Image(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub document: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Overrides the camera derived from the scene bounds.
    pub camera: Option<Camera>,
    pub camera_kind: CameraKind,
    pub program: ShaderProgram,
    pub output: OutputMode,
    pub light: LightState,
    pub clear_colour: wgpu::Color,
    /// Used for textures that name no sampler.
    pub default_sampler: SamplerState,
}

impl TryFrom<Cli> for ViewerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> anyhow::Result<Self> {
        anyhow::ensure!(
            cli.width > 0 && cli.height > 0,
            "framebuffer size must be positive, got {}x{}",
            cli.width,
            cli.height
        );
        let program = ShaderProgram::new(
            ShaderSource::load(&cli.vertex_shader)?,
            ShaderSource::load(&cli.fragment_shader)?,
        )?;
        let output = match cli.output {
            Some(path) => OutputMode::Image(path),
            None => OutputMode::Interactive,
        };
        Ok(Self {
            document: cli.file,
            width: cli.width,
            height: cli.height,
            camera: cli.lookat,
            camera_kind: cli.camera,
            program,
            output,
            light: LightState::default(),
            clear_colour: wgpu::Color::BLACK,
            default_sampler: SamplerState::default(),
        })
    }
}
