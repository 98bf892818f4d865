//! Camera pose, projection and the interactive controllers that drive them.
//!
//! A [`Camera`] is a plain eye / center / up triple. Controllers own a camera
//! and change it in response to drags, scrolls, held keys and elapsed time.
//! Both schemes sit behind [`CameraController`], a closed enum implementing
//! [`CameraControl`], so the render loop never cares which one is active and
//! switching schemes hands the current pose from one to the other.

mod first_person;
mod trackball;

use std::time::Duration;

use cgmath::{EuclideanSpace, InnerSpace, Point3, Vector3};

use crate::data_structures::scene_graph::SceneBounds;

pub use first_person::FirstPersonController;
pub use trackball::TrackballController;

/// Maps GL clip space (z in -1..1) to wgpu clip space (z in 0..1).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Extent used when a scene has no geometry or collapses to a point.
pub const FALLBACK_SCENE_EXTENT: f32 = 100.0;

/// Vertical field of view of the scene projection.
pub const FIELD_OF_VIEW: cgmath::Deg<f32> = cgmath::Deg(70.0);

/// Closest a direction may get to the up axis, in radians.
pub(crate) const MIN_POLAR_ANGLE: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub center: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    /// Store the pose exactly as given.
    pub fn new(eye: Point3<f32>, center: Point3<f32>, up: Vector3<f32>) -> Self {
        Self { eye, center, up }
    }

    /// Like [`Camera::new`], but makes `up` unit length and perpendicular to the
    /// viewing direction when the two are not parallel.
    pub fn look_at(eye: Point3<f32>, center: Point3<f32>, up: Vector3<f32>) -> Self {
        let front = center - eye;
        let left = up.cross(front);
        let up = if left.magnitude2() > f32::EPSILON && front.magnitude2() > f32::EPSILON {
            front.cross(left).normalize()
        } else {
            up
        };
        Self { eye, center, up }
    }

    pub fn front(&self) -> Vector3<f32> {
        (self.center - self.eye).normalize()
    }

    pub fn left(&self) -> Vector3<f32> {
        self.up.cross(self.front()).normalize()
    }

    pub fn distance(&self) -> f32 {
        (self.center - self.eye).magnitude()
    }

    pub fn view_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::look_at_rh(self.eye, self.center, self.up)
    }

    /// The command line arguments that reproduce this pose.
    pub fn lookat_args(&self) -> String {
        format!(
            "--lookat {},{},{},{},{},{},{},{},{}",
            self.eye.x,
            self.eye.y,
            self.eye.z,
            self.center.x,
            self.center.y,
            self.center.z,
            self.up.x,
            self.up.y,
            self.up.z
        )
    }
}

/// Rotate `v` about the unit axis `up` by `d_azimuth` and tilt it towards or
/// away from `up` by `d_polar`. The polar angle stays within
/// `[MIN_POLAR_ANGLE, PI - MIN_POLAR_ANGLE]` and the length of `v` is kept.
pub(crate) fn rotate_spherical(
    v: Vector3<f32>,
    up: Vector3<f32>,
    d_azimuth: f32,
    d_polar: f32,
) -> Vector3<f32> {
    let length = v.magnitude();
    if length <= f32::EPSILON {
        return v;
    }
    let direction = v / length;
    let reference = if up.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let a = up.cross(reference).normalize();
    let b = up.cross(a);

    let height = direction.dot(up);
    let horizontal = direction - up * height;
    let azimuth = if horizontal.magnitude2() > 1e-12 {
        horizontal.dot(b).atan2(horizontal.dot(a))
    } else {
        0.0
    };
    let polar = height.clamp(-1.0, 1.0).acos();

    let azimuth = azimuth + d_azimuth;
    let polar = (polar + d_polar).clamp(MIN_POLAR_ANGLE, std::f32::consts::PI - MIN_POLAR_ANGLE);
    ((a * azimuth.cos() + b * azimuth.sin()) * polar.sin() + up * polar.cos()) * length
}

pub(crate) fn unit_or(v: Vector3<f32>, fallback: Vector3<f32>) -> Vector3<f32> {
    if v.magnitude2() > f32::EPSILON {
        v.normalize()
    } else {
        fallback
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Projection {
    aspect: f32,
    fovy: cgmath::Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<cgmath::Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn calc_matrix(&self) -> cgmath::Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Scene-size derived camera defaults.
#[derive(Debug, Clone, Copy)]
pub struct SceneFraming {
    pub bounds: Option<SceneBounds>,
    /// Diagonal length of the bounds, or [`FALLBACK_SCENE_EXTENT`].
    pub extent: f32,
}

impl SceneFraming {
    pub fn new(bounds: Option<SceneBounds>) -> Self {
        let extent = bounds
            .map(|bounds| bounds.extent())
            .filter(|extent| *extent > 0.0 && extent.is_finite())
            .unwrap_or(FALLBACK_SCENE_EXTENT);
        Self { bounds, extent }
    }

    pub fn projection(&self, width: u32, height: u32) -> Projection {
        Projection::new(
            width,
            height,
            FIELD_OF_VIEW,
            0.001 * self.extent,
            1.5 * self.extent,
        )
    }

    /// Looks at the bounds center from one diagonal away.
    ///
    /// Flat scenes (no depth along z) are viewed from the side perpendicular to
    /// both the diagonal and the up axis instead.
    pub fn default_camera(&self) -> Camera {
        let up = Vector3::unit_y();
        let (center, diagonal) = match self.bounds {
            Some(bounds) => (bounds.center(), bounds.diagonal()),
            None => (Point3::origin(), Vector3::new(0.0, 0.0, 0.0)),
        };
        let mut eye = if diagonal.z > 0.0 {
            center + diagonal
        } else {
            center + diagonal.cross(up) * 2.0
        };
        if (eye - center).magnitude2() <= f32::EPSILON {
            eye = center + Vector3::unit_z() * self.extent;
        }
        Camera::look_at(eye, center, up)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CameraKind {
    Trackball,
    FirstPerson,
}

impl CameraKind {
    pub fn name(self) -> &'static str {
        match self {
            CameraKind::Trackball => "Trackball",
            CameraKind::FirstPerson => "First person",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            CameraKind::Trackball => CameraKind::FirstPerson,
            CameraKind::FirstPerson => CameraKind::Trackball,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionKey {
    Forward,
    Backward,
    Left,
    Right,
    Up,
    Down,
}

/// The operations every camera scheme supports.
pub trait CameraControl {
    /// Replace the pose. A following [`camera`](Self::camera) returns exactly this value.
    fn set_camera(&mut self, camera: Camera);

    fn camera(&self) -> Camera;

    /// Advance time-based motion. Returns whether the pose changed.
    fn update(&mut self, dt: Duration) -> bool;

    /// Mouse movement in pixels while `button` is held.
    fn drag(&mut self, button: DragButton, dx: f32, dy: f32) -> bool;

    /// Wheel movement in lines; positive moves towards the scene.
    fn scroll(&mut self, delta: f32) -> bool;

    fn key(&mut self, key: MotionKey, pressed: bool);
}

#[derive(Debug, Clone)]
pub enum CameraController {
    Trackball(TrackballController),
    FirstPerson(FirstPersonController),
}

impl CameraController {
    /// `scene_extent` scales movement speed so scenes of any size feel alike.
    pub fn new(kind: CameraKind, camera: Camera, scene_extent: f32) -> Self {
        match kind {
            CameraKind::Trackball => CameraController::Trackball(TrackballController::new(camera)),
            CameraKind::FirstPerson => {
                CameraController::FirstPerson(FirstPersonController::new(camera, scene_extent))
            }
        }
    }

    pub fn kind(&self) -> CameraKind {
        match self {
            CameraController::Trackball(_) => CameraKind::Trackball,
            CameraController::FirstPerson(_) => CameraKind::FirstPerson,
        }
    }

    /// A controller of `kind` starting from the current pose.
    pub fn switch_to(&self, kind: CameraKind, scene_extent: f32) -> Self {
        Self::new(kind, self.camera(), scene_extent)
    }

    fn inner(&self) -> &dyn CameraControl {
        match self {
            CameraController::Trackball(controller) => controller,
            CameraController::FirstPerson(controller) => controller,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CameraControl {
        match self {
            CameraController::Trackball(controller) => controller,
            CameraController::FirstPerson(controller) => controller,
        }
    }
}

impl CameraControl for CameraController {
    fn set_camera(&mut self, camera: Camera) {
        self.inner_mut().set_camera(camera)
    }

    fn camera(&self) -> Camera {
        self.inner().camera()
    }

    fn update(&mut self, dt: Duration) -> bool {
        self.inner_mut().update(dt)
    }

    fn drag(&mut self, button: DragButton, dx: f32, dy: f32) -> bool {
        self.inner_mut().drag(button, dx, dy)
    }

    fn scroll(&mut self, delta: f32) -> bool {
        self.inner_mut().scroll(delta)
    }

    fn key(&mut self, key: MotionKey, pressed: bool) {
        self.inner_mut().key(key, pressed)
    }
}
