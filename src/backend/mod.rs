// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics.
// Only `Renderer` is meant to be driven from outside; the rest are the
// pieces it is assembled from.

pub mod buffer;
pub mod descriptors;
pub mod device;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use buffer::{DepthImage, GpuBuffer};
pub use device::VulkanDevice;
pub use renderer::{EntityKey, Renderer};
pub use surface::SurfaceProvider;
pub use swapchain::Swapchain;
pub use sync::FrameSync;
