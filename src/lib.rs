//! visor - a small Vulkan rendering engine core.
//!
//! [`math`] and [`geometry`] are pure value types. [`scene`] holds the
//! camera, entities and meshes that [`backend::Renderer`] turns into draw
//! calls each frame.

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod input;
pub mod math;
pub mod scene;
pub mod window;

pub use backend::{EntityKey, Renderer, SurfaceProvider};
pub use config::Config;
pub use error::{GeometryError, MathError, RenderError, RenderResult, SceneError};
