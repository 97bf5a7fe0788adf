// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// No recreation path: an out-of-date swapchain is reported to the caller.

use ash::extensions::khr;
use ash::vk;

use super::VulkanDevice;
use crate::config::GraphicsConfig;
use crate::error::{RenderError, RenderResult, VkResultExt};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create the swapchain for the device's surface.
    ///
    /// `requested` is the window's drawable size; it only matters when the
    /// surface leaves the extent up to us.
    pub fn new(device: &VulkanDevice, requested: vk::Extent2D, config: &GraphicsConfig) -> RenderResult<Self> {
        log::info!("Creating swapchain: {}x{}", requested.width, requested.height);

        let surface_loader = &device.surface_loader;
        let surface = device.surface;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader.get_physical_device_surface_capabilities(device.physical_device, surface)
        }
        .op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;

        // Query supported formats
        let formats = unsafe { surface_loader.get_physical_device_surface_formats(device.physical_device, surface) }
            .op("vkGetPhysicalDeviceSurfaceFormatsKHR")?;

        // Query supported present modes
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(device.physical_device, surface)
        }
        .op("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_format = choose_surface_format(&formats, config.swapchain_format.into())?;
        let present_mode = choose_present_mode(&present_modes, config.present_mode.into());
        let extent = choose_extent(&surface_caps, requested);
        let image_count = choose_image_count(&surface_caps, config.image_count);

        log::info!(
            "Swapchain: {:?} / {:?}, {:?}, {} images requested",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain =
            unsafe { swapchain_loader.create_swapchain(&create_info, None) }.op("vkCreateSwapchainKHR")?;

        // From here on the struct owns what exists, so an early return still cleans up
        let mut this = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format: surface_format.format,
            extent,
        };

        this.images = match unsafe { this.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(result) => {
                this.destroy(&device.device);
                return Err(RenderError::Vulkan { op: "vkGetSwapchainImagesKHR", result });
            }
        };

        log::info!("Created swapchain with {} images", this.images.len());

        for image in this.images.clone() {
            match create_color_view(&device.device, image, this.format) {
                Ok(view) => this.image_views.push(view),
                Err(e) => {
                    this.destroy(&device.device);
                    return Err(e);
                }
            }
        }

        Ok(this)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire next image for rendering
    ///
    /// Returns the image index; a suboptimal swapchain is still usable.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RenderResult<u32> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal on acquire");
                }
                Ok(index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainOutOfDate),
            Err(result) => Err(RenderError::Vulkan { op: "vkAcquireNextImageKHR", result }),
        }
    }

    /// Present rendered image to screen
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphore: vk::Semaphore) -> RenderResult<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(suboptimal) => {
                if suboptimal {
                    log::debug!("Swapchain suboptimal on present");
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RenderError::SwapchainOutOfDate),
            Err(result) => Err(RenderError::Vulkan { op: "vkQueuePresentKHR", result }),
        }
    }

    /// Image views first, then the swapchain. The device must be idle.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

fn create_color_view(device: &ash::Device, image: vk::Image, format: vk::Format) -> RenderResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.op("vkCreateImageView")
}

/// The preferred format in sRGB non-linear space, else whatever comes first.
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::Format,
) -> RenderResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or(RenderError::NoSurfaceFormat)
}

// FIFO is always supported
fn choose_present_mode(modes: &[vk::PresentModeKHR], preferred: vk::PresentModeKHR) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }

    vk::Extent2D {
        width: requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

/// At least two images, within the surface's limits. A max of 0 means unbounded.
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let mut count = requested.max(2).max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}
