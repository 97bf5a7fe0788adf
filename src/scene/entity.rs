use std::sync::Arc;

use crate::error::MathError;
use crate::geometry::Aabb;
use crate::math::{self, Matrix4, Vector3};
use crate::scene::Mesh;

/// A placed, scaled, oriented mesh.
#[derive(Debug, Clone)]
pub struct Entity {
    pub position: Vector3,
    pub scale: Vector3,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    mesh: Arc<Mesh>,
}

impl Entity {
    pub fn new(position: Vector3, mesh: Arc<Mesh>) -> Self {
        Self {
            position,
            scale: Vector3::ONE,
            yaw: 0.0,
            pitch: 0.0,
            roll: 0.0,
            mesh,
        }
    }

    pub fn with_scale(mut self, scale: Vector3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_orientation(mut self, yaw: f32, pitch: f32, roll: f32) -> Self {
        self.yaw = yaw;
        self.pitch = pitch;
        self.roll = roll;
        self
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    /// Turn towards `target`. Roll is left alone.
    pub fn look_at(&mut self, target: Vector3) -> Result<(), MathError> {
        let (yaw, pitch) = math::angles_from_direction(target - self.position)?;
        self.yaw = yaw;
        self.pitch = pitch;
        Ok(())
    }

    pub fn forward(&self) -> Vector3 {
        math::direction_from_angles(self.yaw, self.pitch)
    }

    /// Local to world: scale, then rotate, then translate.
    pub fn model_matrix(&self) -> Matrix4 {
        math::translation(self.position)
            * math::rotation(self.yaw, self.pitch, self.roll)
            * math::scaling(self.scale.x, self.scale.y, self.scale.z)
    }

    /// World-space box around the transformed mesh.
    pub fn world_bounds(&self) -> Option<Aabb> {
        self.mesh.bounds().map(|b| b.transformed(&self.model_matrix()))
    }
}
