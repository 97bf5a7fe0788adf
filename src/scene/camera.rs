use crate::error::MathError;
use crate::geometry::Ray;
use crate::math::{self, Matrix4, Vector3};

/// Perspective camera. Angles are radians, yaw about +Y, pitch towards +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view.
    pub fov: f32,
    pub position: Vector3,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov: 1.2,
            position: Vector3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
        }
    }
}

impl Camera {
    pub fn new(fov: f32, position: Vector3) -> Self {
        Self {
            fov,
            position,
            ..Default::default()
        }
    }

    /// Turn towards `target`. Roll is left alone.
    pub fn look_at(&mut self, target: Vector3) -> Result<(), MathError> {
        let (yaw, pitch) = math::angles_from_direction(target - self.position)?;
        self.yaw = yaw;
        self.pitch = pitch;
        Ok(())
    }

    /// Unit vector the camera looks along.
    pub fn forward(&self) -> Vector3 {
        math::direction_from_angles(self.yaw, self.pitch)
    }

    /// Unit vector to the camera's right, ignoring roll.
    pub fn right(&self) -> Vector3 {
        math::upper_left(&math::rotation(self.yaw, 0.0, 0.0)) * Vector3::X
    }

    pub fn view(&self) -> Matrix4 {
        math::view(self.position, self.yaw, self.pitch, self.roll)
    }

    pub fn view_projection(&self, aspect_ratio: f32) -> Matrix4 {
        math::projection(self.fov, aspect_ratio) * self.view()
    }

    /// Ray from the camera along its line of sight.
    pub fn ray(&self) -> Ray {
        Ray::new(self.position, self.forward())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn look_at_round_trips_through_forward() {
        let mut camera = Camera::new(1.2, Vector3::new(1.0, 2.0, 3.0));
        for target in [
            Vector3::new(4.0, 2.0, 3.0),
            Vector3::new(-3.0, 7.0, 0.0),
            Vector3::new(1.0, -5.0, 3.5),
            Vector3::new(0.0, 0.0, 0.0),
        ] {
            camera.look_at(target).unwrap();
            let expected = math::normalize(target - camera.position).unwrap();
            assert_abs_diff_eq!(camera.forward(), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn look_at_keeps_roll() {
        let mut camera = Camera {
            roll: 0.7,
            ..Default::default()
        };
        camera.look_at(Vector3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(camera.roll, 0.7);
    }

    #[test]
    fn look_at_own_position_fails() {
        let mut camera = Camera::new(1.0, Vector3::ONE);
        assert_eq!(camera.look_at(Vector3::ONE), Err(MathError::ZeroLength));
        assert_eq!(camera.yaw, 0.0);
    }

    #[test]
    fn default_camera_looks_down_z() {
        let camera = Camera::default();
        assert_abs_diff_eq!(camera.forward(), Vector3::Z, epsilon = 1e-6);
        assert_abs_diff_eq!(camera.right(), Vector3::X, epsilon = 1e-6);
    }

    #[test]
    fn point_ahead_projects_to_screen_centre() {
        let mut camera = Camera::new(1.2, Vector3::new(0.0, 0.0, -3.0));
        camera.look_at(Vector3::new(2.0, 1.0, 4.0)).unwrap();
        let ahead = camera.position + camera.forward() * 10.0;
        let clip = camera.view_projection(1.5) * ahead.extend(1.0);
        assert_abs_diff_eq!(clip.x / clip.w, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(clip.y / clip.w, 0.0, epsilon = 1e-5);
        assert!(clip.z / clip.w > 0.0 && clip.z / clip.w < 1.0);
    }
}
