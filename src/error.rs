// Error kinds
//
// Library code never exits the process: every fallible step returns one of
// these and the driver decides what to do with it.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

use crate::math::Axis;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum MathError {
    #[error("cannot normalize a zero-length vector")]
    ZeroLength,

    #[error("cannot normalize a vector with a non-finite component")]
    NonFinite,
}

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("AABB minimum exceeds maximum (or is NaN) on the {axis:?} axis")]
    InvertedBounds { axis: Axis },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("index {index} refers to vertex outside a mesh of {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("index count {0} is not a multiple of 3")]
    IncompleteTriangle(usize),

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a renderer is already running")]
    AlreadyRunning,

    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("{op} failed: {result}")]
    Vulkan { op: &'static str, result: vk::Result },

    #[error("no Vulkan-capable GPU found")]
    NoPhysicalDevice,

    #[error("no queue family supports graphics, compute, transfer and presentation")]
    NoQueueFamily,

    #[error("no memory type matches {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("surface has no supported formats")]
    NoSurfaceFormat,

    #[error("could not read shader {path:?}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {path:?} is not valid SPIR-V: {source}")]
    InvalidShader {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("swapchain is out of date")]
    SwapchainOutOfDate,

    #[error("entity is not registered with this renderer")]
    UnknownEntity,

    #[error("window surface: {0}")]
    Surface(String),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Attach the failing operation name to a raw `vk::Result`.
pub trait VkResultExt<T> {
    fn op(self, op: &'static str) -> RenderResult<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    fn op(self, op: &'static str) -> RenderResult<T> {
        self.map_err(|result| RenderError::Vulkan { op, result })
    }
}
