//! Node-local transformations.
//!
//! A glTF node carries either a full 4x4 matrix or a translation / rotation /
//! scale triple. Both are turned into a column-major [`cgmath::Matrix4`] here,
//! which the scene graph then composes parent-to-child.

use cgmath::{EuclideanSpace, One, Point3, SquareMatrix};

/// The local transform of a node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeTransform {
    /// Column-major matrix, used as-is.
    Matrix(cgmath::Matrix4<f32>),
    /// Applied as translation * rotation * scale.
    Trs {
        translation: cgmath::Vector3<f32>,
        rotation: cgmath::Quaternion<f32>,
        scale: cgmath::Vector3<f32>,
    },
}

impl NodeTransform {
    /// The identity transform (no move, rotate, or scale).
    pub fn identity() -> Self {
        NodeTransform::Trs {
            translation: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn from_translation(translation: cgmath::Vector3<f32>) -> Self {
        NodeTransform::Trs {
            translation,
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Build from glTF's decomposed layout, where the rotation is stored as `[x, y, z, w]`.
    pub fn from_gltf_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        NodeTransform::Trs {
            translation: translation.into(),
            rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
            scale: scale.into(),
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        match self {
            NodeTransform::Matrix(matrix) => *matrix,
            NodeTransform::Trs {
                translation,
                rotation,
                scale,
            } => {
                cgmath::Matrix4::from_translation(*translation)
                    * cgmath::Matrix4::from(*rotation)
                    * cgmath::Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z)
            }
        }
    }
}

impl Default for NodeTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[[f32; 4]; 4]> for NodeTransform {
    fn from(columns: [[f32; 4]; 4]) -> Self {
        NodeTransform::Matrix(columns.into())
    }
}

/// Apply an affine matrix to a point (w = 1).
pub fn transform_point(matrix: &cgmath::Matrix4<f32>, point: Point3<f32>) -> Point3<f32> {
    Point3::from_vec((matrix * point.to_homogeneous()).truncate())
}

/// Apply a matrix to a direction (w = 0).
pub fn transform_direction(
    matrix: &cgmath::Matrix4<f32>,
    direction: cgmath::Vector3<f32>,
) -> cgmath::Vector3<f32> {
    (matrix * direction.extend(0.0)).truncate()
}

/// Inverse-transpose of the upper 3x3 of `model_view`, widened back to 4x4 so it
/// can live in a uniform block without padding rules of `mat3x3`.
///
/// Singular matrices (e.g. a zero scale) fall back to the plain upper 3x3.
pub fn normal_matrix(model_view: &cgmath::Matrix4<f32>) -> cgmath::Matrix4<f32> {
    use cgmath::Matrix;

    let upper = cgmath::Matrix3::from_cols(
        model_view.x.truncate(),
        model_view.y.truncate(),
        model_view.z.truncate(),
    );
    let normal = upper.invert().map(|inv| inv.transpose()).unwrap_or(upper);
    cgmath::Matrix4::from(normal)
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, InnerSpace, Rotation3};

    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn trs_applies_scale_before_rotation_before_translation() {
        let transform = NodeTransform::Trs {
            translation: cgmath::Vector3::new(1.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::from_angle_z(Deg(90.0)),
            scale: cgmath::Vector3::new(2.0, 2.0, 2.0),
        };
        let moved = transform_point(&transform.to_matrix(), Point3::new(1.0, 0.0, 0.0));
        assert!((moved - Point3::new(1.0, 2.0, 0.0)).magnitude() < 1e-5, "{moved:?}");
    }

    #[test]
    fn gltf_quaternion_order_is_xyzw() {
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let transform = NodeTransform::from_gltf_trs([0.0; 3], [0.0, half, 0.0, half], [1.0; 3]);
        let expected = cgmath::Quaternion::from_angle_y(Deg(90.0));
        let NodeTransform::Trs { rotation, .. } = transform else {
            panic!("expected a decomposed transform");
        };
        assert!(close(rotation.s, expected.s));
        assert!((rotation.v - expected.v).magnitude() < 1e-6);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let model_view = cgmath::Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let normal = normal_matrix(&model_view);
        assert!(close(normal.x.x, 0.5));
        assert!(close(normal.y.y, 1.0));
        assert!(close(normal.w.w, 1.0));
    }

    #[test]
    fn directions_ignore_translation() {
        let matrix = cgmath::Matrix4::from_translation(cgmath::Vector3::new(5.0, 5.0, 5.0));
        let dir = transform_direction(&matrix, cgmath::Vector3::unit_x());
        assert_eq!(dir, cgmath::Vector3::unit_x());
        assert_eq!(matrix.determinant(), 1.0);
    }
}
