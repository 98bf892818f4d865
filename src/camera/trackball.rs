use std::time::Duration;

use cgmath::{EuclideanSpace, InnerSpace, Vector3};

use super::{Camera, CameraControl, DragButton, MotionKey, rotate_spherical, unit_or};

/// Radians per pixel of drag.
const ORBIT_SENSITIVITY: f32 = 0.01;
/// Fraction of the current distance covered per wheel line.
const DOLLY_STEP: f32 = 0.1;
/// Wheel lines per pixel of secondary-button drag.
const DRAG_DOLLY_SENSITIVITY: f32 = 0.05;
/// Closest approach to the center, relative to how far the scene sits from
/// the origin. Keeps the eye-center offset representable in f32.
const MIN_DISTANCE_FACTOR: f32 = 1e-5;

/// Orbits the eye around a fixed center.
///
/// Dragging changes longitude (about the up axis) and latitude; the latitude
/// stops just short of the poles so the view never flips. Dollying moves the
/// eye along the viewing direction but never onto or past the center.
#[derive(Debug, Clone)]
pub struct TrackballController {
    camera: Camera,
    orbit_axis: Vector3<f32>,
}

impl TrackballController {
    pub fn new(camera: Camera) -> Self {
        let mut controller = Self {
            camera,
            orbit_axis: Vector3::unit_y(),
        };
        controller.set_camera(camera);
        controller
    }

    fn orbit(&mut self, d_longitude: f32, d_latitude: f32) -> bool {
        if d_longitude == 0.0 && d_latitude == 0.0 {
            return false;
        }
        let depth = self.camera.eye - self.camera.center;
        let depth = rotate_spherical(depth, self.orbit_axis, d_longitude, d_latitude);
        let eye = self.camera.center + depth;
        self.camera = Camera::look_at(eye, self.camera.center, self.orbit_axis);
        true
    }

    fn dolly(&mut self, lines: f32) -> bool {
        if lines == 0.0 {
            return false;
        }
        let depth = self.camera.eye - self.camera.center;
        let distance = depth.magnitude();
        if distance <= f32::EPSILON {
            return false;
        }
        let scale = self
            .camera
            .center
            .to_vec()
            .magnitude()
            .max(self.camera.eye.to_vec().magnitude())
            .max(1.0);
        let min_distance = (MIN_DISTANCE_FACTOR * scale).min(distance);
        let new_distance = (distance * (1.0 - DOLLY_STEP * lines)).max(min_distance);
        let eye = self.camera.center + depth * (new_distance / distance);
        let moved = eye - self.camera.center;
        if eye == self.camera.eye || !moved.magnitude2().is_normal() {
            return false;
        }
        self.camera.eye = eye;
        true
    }
}

impl CameraControl for TrackballController {
    fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
        self.orbit_axis = unit_or(camera.up, Vector3::unit_y());
    }

    fn camera(&self) -> Camera {
        self.camera
    }

    /// Trackball motion is purely input driven.
    fn update(&mut self, _dt: Duration) -> bool {
        false
    }

    fn drag(&mut self, button: DragButton, dx: f32, dy: f32) -> bool {
        match button {
            DragButton::Primary => self.orbit(-ORBIT_SENSITIVITY * dx, -ORBIT_SENSITIVITY * dy),
            DragButton::Secondary => self.dolly(-DRAG_DOLLY_SENSITIVITY * dy),
        }
    }

    fn scroll(&mut self, delta: f32) -> bool {
        self.dolly(delta)
    }

    fn key(&mut self, _key: MotionKey, _pressed: bool) {}
}
