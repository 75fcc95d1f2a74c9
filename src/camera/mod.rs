//! Free-look camera.

use crate::math::{Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// A yaw/pitch free-look camera.
///
/// Input handling lives in the embedding application; the pipeline only reads
/// position, basis vectors and the view/projection matrices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// World-space position.
    pub position: Vector3,
    /// Yaw in degrees. 0 looks down -Z.
    pub yaw: f32,
    /// Pitch in degrees, clamped to (-90, 90) by the controller.
    pub pitch: f32,
    /// Vertical field of view, radians.
    pub fov: f32,
    /// Near clip distance.
    pub near: f32,
    /// Far clip distance.
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vector3::new(5.0, 1.0, 0.0),
            yaw: 180.0,
            pitch: 0.0,
            fov: std::f32::consts::FRAC_PI_3,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// View direction derived from yaw and pitch.
    pub fn front(&self) -> Vector3 {
        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        Vector3::new(
            yaw.sin() * pitch.cos(),
            pitch.sin(),
            -yaw.cos() * pitch.cos(),
        )
        .normalized()
    }

    /// Camera-space up vector.
    pub fn up(&self) -> Vector3 {
        let front = self.front();
        let right = front.cross(&Vector3::UP).normalized();
        right.cross(&front).normalized()
    }

    /// View matrix looking along `front`.
    pub fn view_matrix(&self) -> Matrix4 {
        Matrix4::look_at(&self.position, &(self.position + self.front()), &Vector3::UP)
    }

    /// Perspective projection matrix for an aspect ratio.
    pub fn projection_matrix(&self, aspect: f32) -> Matrix4 {
        Matrix4::perspective(self.fov, aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_at_zero_yaw() {
        let camera = Camera {
            yaw: 0.0,
            pitch: 0.0,
            ..Default::default()
        };
        assert!(camera.front().approx_eq(&Vector3::new(0.0, 0.0, -1.0), 1e-6));
    }

    #[test]
    fn test_up_is_orthogonal_to_front() {
        let camera = Camera {
            yaw: 37.0,
            pitch: 20.0,
            ..Default::default()
        };
        assert!(camera.front().dot(&camera.up()).abs() < 1e-5);
    }
}
