use std::time::Duration;

use cgmath::{InnerSpace, Vector3, Zero};

use super::{Camera, CameraControl, DragButton, MotionKey, rotate_spherical, unit_or};

/// Mouse look sensitivity in radians per pixel of mouse movement.
const LOOK_SENSITIVITY: f32 = 0.003;

#[derive(Debug, Clone, Copy, Default)]
struct HeldKeys {
    forward: bool,
    backward: bool,
    left: bool,
    right: bool,
    up: bool,
    down: bool,
}

/// Walks the eye through the scene.
///
/// Held movement keys translate eye and center together at `speed` world
/// units per second; dragging turns the view direction around the eye with
/// the pitch kept short of straight up or down.
#[derive(Debug, Clone)]
pub struct FirstPersonController {
    camera: Camera,
    world_up: Vector3<f32>,
    speed: f32,
    keys: HeldKeys,
}

impl FirstPersonController {
    pub fn new(camera: Camera, speed: f32) -> Self {
        let mut controller = Self {
            camera,
            world_up: Vector3::unit_y(),
            speed,
            keys: HeldKeys::default(),
        };
        controller.set_camera(camera);
        controller
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    fn look(&mut self, d_yaw: f32, d_pitch: f32) -> bool {
        if d_yaw == 0.0 && d_pitch == 0.0 {
            return false;
        }
        let eye = self.camera.eye;
        let front = rotate_spherical(self.camera.center - eye, self.world_up, d_yaw, d_pitch);
        self.camera = Camera::look_at(eye, eye + front, self.world_up);
        true
    }

    fn direction(&self) -> Vector3<f32> {
        let front = unit_or(self.camera.center - self.camera.eye, Vector3::zero());
        let left = unit_or(self.camera.up.cross(front), Vector3::zero());
        let mut direction = Vector3::zero();
        let mut add = |held: bool, v: Vector3<f32>| {
            if held {
                direction += v;
            }
        };
        add(self.keys.forward, front);
        add(self.keys.backward, -front);
        add(self.keys.left, left);
        add(self.keys.right, -left);
        add(self.keys.up, self.world_up);
        add(self.keys.down, -self.world_up);
        direction
    }
}

impl CameraControl for FirstPersonController {
    fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.world_up = unit_or(camera.up, Vector3::unit_y());
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    fn update(&mut self, dt: Duration) -> bool {
        let direction = self.direction();
        let step = self.speed * dt.as_secs_f32();
        if direction.magnitude2() <= f32::EPSILON || step == 0.0 {
            return false;
        }
        let translation = direction.normalize() * step;
        self.camera.eye += translation;
        self.camera.center += translation;
        true
    }

    fn drag(&mut self, button: DragButton, dx: f32, dy: f32) -> bool {
        match button {
            DragButton::Primary => self.look(-LOOK_SENSITIVITY * dx, LOOK_SENSITIVITY * dy),
            DragButton::Secondary => false,
        }
    }

    fn scroll(&mut self, _delta: f32) -> bool {
        false
    }

    fn key(&mut self, key: MotionKey, pressed: bool) {
        let held = match key {
            MotionKey::Forward => &mut self.keys.forward,
            MotionKey::Backward => &mut self.keys.backward,
            MotionKey::Left => &mut self.keys.left,
            MotionKey::Right => &mut self.keys.right,
            MotionKey::Up => &mut self.keys.up,
            MotionKey::Down => &mut self.keys.down,
        };
        *held = pressed;
    }
}
