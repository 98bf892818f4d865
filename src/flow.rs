//! The interactive viewer loop.
//!
//! [`Viewer`] is the winit [`ApplicationHandler`]: it opens the window once the
//! event loop resumes, feeds input to the active [`CameraController`] and
//! redraws continuously.
//!
//! # Controls
//!
//! - primary drag: orbit (trackball) or look around (first person)
//! - secondary drag, wheel: dolly towards the center (trackball)
//! - W/S/A/D, ArrowUp/ArrowDown: move (first person)
//! - T: switch controller, keeping the pose
//! - L: toggle between a fixed light and a light shining from the camera
//! - C: log the `--lookat` arguments for the current pose
//! - Escape: quit

use std::sync::Arc;

use anyhow::Context as _;
use instant::Instant;
use log::{error, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

use crate::{
    camera::{CameraControl, CameraController, CameraKind, DragButton, MotionKey, Projection, SceneFraming},
    config::ViewerConfig,
    context::Context,
    data_structures::{document::SceneDocument, scene_graph::compute_scene_bounds},
    render::{LightState, build_frame},
    resources::{gpu::GpuResources, load_document},
};

/// Wheel lines per pixel for touchpads reporting pixel deltas.
const PIXELS_PER_LINE: f32 = 20.0;

fn window_title(kind: CameraKind) -> String {
    format!("glTF Viewer - {}", kind.name())
}

fn motion_key(code: KeyCode) -> Option<MotionKey> {
    match code {
        KeyCode::KeyW => Some(MotionKey::Forward),
        KeyCode::KeyS => Some(MotionKey::Backward),
        KeyCode::KeyA => Some(MotionKey::Left),
        KeyCode::KeyD => Some(MotionKey::Right),
        KeyCode::ArrowUp => Some(MotionKey::Up),
        KeyCode::ArrowDown => Some(MotionKey::Down),
        _ => None,
    }
}

/// Device side state, created once the window exists.
struct ViewerState {
    window: Arc<Window>,
    ctx: Context,
    resources: GpuResources<Context>,
    controller: CameraController,
    projection: Projection,
    light: LightState,
    dragging: Option<DragButton>,
}

impl ViewerState {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.ctx.resize(width, height);
            self.projection.resize(width, height);
        }
    }

    fn switch_controller(&mut self, scene_extent: f32) {
        let kind = self.controller.kind().toggled();
        self.controller = self.controller.switch_to(kind, scene_extent);
        self.window.set_title(&window_title(kind));
        info!("Switched to {} camera", kind.name());
    }
}

pub struct Viewer {
    config: ViewerConfig,
    document: SceneDocument,
    framing: SceneFraming,
    async_runtime: tokio::runtime::Runtime,
    state: Option<ViewerState>,
    last_time: Instant,
    error: Option<anyhow::Error>,
}

impl Viewer {
    pub fn new(config: ViewerConfig, document: SceneDocument) -> anyhow::Result<Self> {
        let framing = SceneFraming::new(compute_scene_bounds(&document)?);
        let async_runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
        Ok(Self {
            config,
            document,
            framing,
            async_runtime,
            state: None,
            last_time: Instant::now(),
            error: None,
        })
    }

    fn init_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<ViewerState> {
        let window_attributes = Window::default_attributes()
            .with_title(window_title(self.config.camera_kind))
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("failed to create window")?,
        );

        let mut ctx = self
            .async_runtime
            .block_on(Context::windowed(window.clone(), &self.config.program))?;
        ctx.clear_colour = self.config.clear_colour;
        let resources = GpuResources::build(&self.document, &self.config.default_sampler, &mut ctx)?;

        let camera = self
            .config
            .camera
            .unwrap_or_else(|| self.framing.default_camera());
        let controller = CameraController::new(self.config.camera_kind, camera, self.framing.extent);
        let (width, height) = ctx.size();
        let projection = self.framing.projection(width, height);
        info!("Interactive viewer using the {} camera", self.config.camera_kind.name());

        Ok(ViewerState {
            window,
            ctx,
            resources,
            controller,
            projection,
            light: self.config.light,
            dragging: None,
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.error = Some(err);
        event_loop.exit();
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let extent = self.framing.extent;
        let Some(state) = &mut self.state else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;

        if let Some(key) = motion_key(code) {
            state.controller.key(key, pressed);
            return;
        }
        match (code, event.state) {
            (KeyCode::Escape, ElementState::Released) => event_loop.exit(),
            (KeyCode::KeyT, ElementState::Pressed) if !event.repeat => {
                state.switch_controller(extent)
            }
            (KeyCode::KeyL, ElementState::Pressed) if !event.repeat => {
                state.light.from_camera = !state.light.from_camera;
                info!(
                    "Light {}",
                    if state.light.from_camera {
                        "follows the camera"
                    } else {
                        "fixed in the scene"
                    }
                );
            }
            (KeyCode::KeyC, ElementState::Pressed) if !event.repeat => {
                info!("{}", state.controller.camera().lookat_args());
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let dt = self.last_time.elapsed();
        self.last_time = Instant::now();
        let Some(state) = &mut self.state else {
            return;
        };
        state.controller.update(dt);

        let frame = match build_frame(
            &self.document,
            &state.resources,
            self.config.program.uniforms(),
            &state.controller.camera(),
            &state.projection.calc_matrix(),
            &state.light,
        ) {
            Ok(frame) => frame,
            Err(err) => {
                self.fail(event_loop, err.into());
                return;
            }
        };

        match state.ctx.present(&frame, &state.resources) {
            Ok(()) => {}
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let size = state.window.inner_size();
                state.resize(size.width, size.height);
            }
            Err(e) => error!("Unable to render {e}"),
        }
        state.window.request_redraw();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.init_state(event_loop) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
                self.last_time = Instant::now();
            }
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        let Some(state) = &mut self.state else {
            return;
        };
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if let Some(button) = state.dragging {
                state.controller.drag(button, dx as f32, dy as f32);
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if self.state.is_none() {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, &event),
            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => {
                if let Some(state) = &mut self.state {
                    let drag_button = match button {
                        MouseButton::Left => Some(DragButton::Primary),
                        MouseButton::Right => Some(DragButton::Secondary),
                        _ => None,
                    };
                    match (drag_button, button_state.is_pressed()) {
                        (Some(button), true) => state.dragging = Some(button),
                        (Some(button), false) if state.dragging == Some(button) => {
                            state.dragging = None
                        }
                        _ => (),
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                if let Some(state) = &mut self.state {
                    let lines = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                    };
                    state.controller.scroll(lines);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

/// Load the configured document and run the window until it is closed.
///
/// The document is loaded before any window opens, so a broken file fails
/// without flashing a window.
pub fn run(config: ViewerConfig) -> anyhow::Result<()> {
    let document = load_document(&config.document)?;
    let mut viewer = Viewer::new(config, document)?;

    let event_loop = EventLoop::new().context("failed to create an event loop")?;
    event_loop.run_app(&mut viewer)?;

    match viewer.error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
