// Scene model: what the renderer draws and where it looks from

pub mod camera;
pub mod entity;
pub mod mesh;

pub use camera::Camera;
pub use entity::Entity;
pub use mesh::{Mesh, Vertex};
