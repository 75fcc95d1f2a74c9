//! 4x4 matrix implementation.

use super::Vector3;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A 4x4 matrix stored in column-major order.
/// Used for view, projection and light-space transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Matrix4 {
    /// Matrix elements in column-major order.
    pub elements: [f32; 16],
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4 {
    /// Identity matrix.
    pub const IDENTITY: Self = Self {
        elements: [
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ],
    };

    /// Create from a column-major array.
    #[inline]
    pub const fn from_cols_array(elements: [f32; 16]) -> Self {
        Self { elements }
    }

    /// Create a view matrix looking from `eye` toward `target`.
    pub fn look_at(eye: &Vector3, target: &Vector3, up: &Vector3) -> Self {
        let f = (*target - *eye).normalized();
        let r = f.cross(up).normalized();
        let u = r.cross(&f);

        // Inverse of the camera basis: transposed rotation, negated projected eye.
        Self {
            elements: [
                r.x, u.x, -f.x, 0.0,
                r.y, u.y, -f.y, 0.0,
                r.z, u.z, -f.z, 0.0,
                -r.dot(eye), -u.dot(eye), f.dot(eye), 1.0,
            ],
        }
    }

    /// Create a perspective projection matrix.
    /// Uses wgpu/Vulkan depth range (0 to 1).
    pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let f = 1.0 / (fov_y / 2.0).tan();
        Self {
            elements: [
                f / aspect, 0.0, 0.0, 0.0,
                0.0, f, 0.0, 0.0,
                0.0, 0.0, far / (near - far), -1.0,
                0.0, 0.0, (near * far) / (near - far), 0.0,
            ],
        }
    }

    /// Create an orthographic projection matrix.
    /// Uses wgpu/Vulkan depth range (0 to 1).
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let w = 1.0 / (right - left);
        let h = 1.0 / (top - bottom);
        let d = 1.0 / (far - near);
        Self {
            elements: [
                2.0 * w, 0.0, 0.0, 0.0,
                0.0, 2.0 * h, 0.0, 0.0,
                0.0, 0.0, -d, 0.0,
                -(right + left) * w, -(top + bottom) * h, -near * d, 1.0,
            ],
        }
    }

    /// Multiply this matrix by another (`self * other`).
    pub fn multiply(&self, other: &Matrix4) -> Self {
        let a = &self.elements;
        let b = &other.elements;
        let mut out = [0.0f32; 16];
        for col in 0..4 {
            for row in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += a[k * 4 + row] * b[col * 4 + k];
                }
                out[col * 4 + row] = sum;
            }
        }
        Self { elements: out }
    }

    /// Return the inverse of this matrix.
    ///
    /// Returns the identity if the matrix is singular.
    pub fn inverse(&self) -> Self {
        let m = &self.elements;

        // 2x2 sub-determinants of the lower two rows.
        let s0 = m[2] * m[7] - m[6] * m[3];
        let s1 = m[2] * m[11] - m[10] * m[3];
        let s2 = m[2] * m[15] - m[14] * m[3];
        let s3 = m[6] * m[11] - m[10] * m[7];
        let s4 = m[6] * m[15] - m[14] * m[7];
        let s5 = m[10] * m[15] - m[14] * m[11];

        // 2x2 sub-determinants of the upper two rows.
        let c0 = m[0] * m[5] - m[4] * m[1];
        let c1 = m[0] * m[9] - m[8] * m[1];
        let c2 = m[0] * m[13] - m[12] * m[1];
        let c3 = m[4] * m[9] - m[8] * m[5];
        let c4 = m[4] * m[13] - m[12] * m[5];
        let c5 = m[8] * m[13] - m[12] * m[9];

        let det = c0 * s5 - c1 * s4 + c2 * s3 + c3 * s2 - c4 * s1 + c5 * s0;
        if det == 0.0 {
            return Self::IDENTITY;
        }
        let inv = 1.0 / det;

        Self {
            elements: [
                (m[5] * s5 - m[9] * s4 + m[13] * s3) * inv,
                (-m[1] * s5 + m[9] * s2 - m[13] * s1) * inv,
                (m[1] * s4 - m[5] * s2 + m[13] * s0) * inv,
                (-m[1] * s3 + m[5] * s1 - m[9] * s0) * inv,
                (-m[4] * s5 + m[8] * s4 - m[12] * s3) * inv,
                (m[0] * s5 - m[8] * s2 + m[12] * s1) * inv,
                (-m[0] * s4 + m[4] * s2 - m[12] * s0) * inv,
                (m[0] * s3 - m[4] * s1 + m[8] * s0) * inv,
                (m[7] * c5 - m[11] * c4 + m[15] * c3) * inv,
                (-m[3] * c5 + m[11] * c2 - m[15] * c1) * inv,
                (m[3] * c4 - m[7] * c2 + m[15] * c0) * inv,
                (-m[3] * c3 + m[7] * c1 - m[11] * c0) * inv,
                (-m[6] * c5 + m[10] * c4 - m[14] * c3) * inv,
                (m[2] * c5 - m[10] * c2 + m[14] * c1) * inv,
                (-m[2] * c4 + m[6] * c2 - m[14] * c0) * inv,
                (m[2] * c3 - m[6] * c1 + m[10] * c0) * inv,
            ],
        }
    }

    /// Transform a Vector3 as a point (with translation and perspective divide).
    pub fn transform_point(&self, v: &Vector3) -> Vector3 {
        let e = &self.elements;
        let w = 1.0 / (e[3] * v.x + e[7] * v.y + e[11] * v.z + e[15]);
        Vector3 {
            x: (e[0] * v.x + e[4] * v.y + e[8] * v.z + e[12]) * w,
            y: (e[1] * v.x + e[5] * v.y + e[9] * v.z + e[13]) * w,
            z: (e[2] * v.x + e[6] * v.y + e[10] * v.z + e[14]) * w,
        }
    }

    /// Check if approximately equal to another matrix.
    pub fn approx_eq(&self, other: &Matrix4, epsilon: f32) -> bool {
        self.elements
            .iter()
            .zip(other.elements.iter())
            .all(|(a, b)| (a - b).abs() < epsilon)
    }

    /// Convert to a column-major 2D array (for GPU uniform buffers).
    pub fn to_cols_array_2d(&self) -> [[f32; 4]; 4] {
        let e = &self.elements;
        [
            [e[0], e[1], e[2], e[3]],
            [e[4], e[5], e[6], e[7]],
            [e[8], e[9], e[10], e[11]],
            [e[12], e[13], e[14], e[15]],
        ]
    }
}

impl std::ops::Mul for Matrix4 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_multiply() {
        let m = Matrix4::perspective(1.0, 1.5, 0.1, 100.0);
        assert!(m.multiply(&Matrix4::IDENTITY).approx_eq(&m, 1e-6));
        assert!(Matrix4::IDENTITY.multiply(&m).approx_eq(&m, 1e-6));
    }

    #[test]
    fn test_inverse_roundtrip() {
        let v = Matrix4::look_at(
            &Vector3::new(3.0, 4.0, 5.0),
            &Vector3::ZERO,
            &Vector3::UP,
        );
        let product = v.multiply(&v.inverse());
        assert!(product.approx_eq(&Matrix4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_ortho_maps_bounds() {
        let m = Matrix4::orthographic(-25.0, 25.0, -25.0, 25.0, 0.0, 100.0);
        let p = m.transform_point(&Vector3::new(25.0, -25.0, -100.0));
        assert!(p.approx_eq(&Vector3::new(1.0, -1.0, 1.0), 1e-5));
    }

    #[test]
    fn test_look_at_centers_eye() {
        let v = Matrix4::look_at(
            &Vector3::new(0.0, 0.0, 10.0),
            &Vector3::ZERO,
            &Vector3::UP,
        );
        let p = v.transform_point(&Vector3::new(0.0, 0.0, 10.0));
        assert!(p.approx_eq(&Vector3::ZERO, 1e-5));
    }
}
