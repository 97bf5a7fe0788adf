// Buffer utilities for vertex, index, and uniform buffers
//
// Everything the renderer writes from the CPU lives in host-visible,
// host-coherent memory: no staging copies and no explicit flushes.

use ash::vk;
use bytemuck::Pod;

use super::VulkanDevice;
use crate::error::{RenderError, RenderResult, VkResultExt};

/// Zero-sized buffers are invalid; empty meshes still get a valid handle.
const MIN_BUFFER_SIZE: vk::DeviceSize = 4;

/// A buffer and the memory bound to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Create a host-visible buffer of at least `size` bytes.
    pub fn new(device: &VulkanDevice, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> RenderResult<Self> {
        let size = size.max(MIN_BUFFER_SIZE);

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }.op("vkCreateBuffer")?;
        let mut this = Self {
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
        };

        if let Err(e) = this.bind_memory(device) {
            this.destroy(&device.device);
            return Err(e);
        }

        Ok(this)
    }

    /// Create a buffer and fill it with data
    pub fn with_data<T: Pod>(device: &VulkanDevice, usage: vk::BufferUsageFlags, data: &[T]) -> RenderResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let this = Self::new(device, bytes.len() as vk::DeviceSize, usage)?;

        if let Err(e) = this.write(&device.device, data) {
            this.destroy(&device.device);
            return Err(e);
        }

        Ok(this)
    }

    fn bind_memory(&mut self, device: &VulkanDevice) -> RenderResult<()> {
        let requirements = unsafe { device.device.get_buffer_memory_requirements(self.buffer) };

        let memory_type_index = find_memory_type(
            &device.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.memory = device.device.allocate_memory(&alloc_info, None).op("vkAllocateMemory")?;
            device
                .device
                .bind_buffer_memory(self.buffer, self.memory, 0)
                .op("vkBindBufferMemory")
        }
    }

    /// Copy `data` to the start of the buffer. Anything past the buffer's
    /// size is not written.
    pub fn write<T: Pod>(&self, device: &ash::Device, data: &[T]) -> RenderResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len().min(self.size as usize);
        if len == 0 {
            return Ok(());
        }

        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, len as vk::DeviceSize, vk::MemoryMapFlags::empty())
                .op("vkMapMemory")? as *mut u8;
            ptr.copy_from_nonoverlapping(bytes.as_ptr(), len);
            device.unmap_memory(self.memory);
        }

        Ok(())
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Find a memory type allowed by `type_filter` that has all of `properties`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            let has_type = (type_filter & (1 << i)) != 0;
            let has_properties = memory_properties.memory_types[i as usize]
                .property_flags
                .contains(properties);
            has_type && has_properties
        })
        .ok_or(RenderError::NoMemoryType(properties))
}

/// Depth attachment sized to the swapchain.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl DepthImage {
    pub const FORMAT: vk::Format = vk::Format::D32_SFLOAT;

    /// Handles are stored as they are created so a failure part way is still
    /// released by [`DepthImage::destroy`].
    pub fn create(&mut self, device: &VulkanDevice, extent: vk::Extent2D) -> RenderResult<()> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(Self::FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        self.image = unsafe { device.device.create_image(&image_info, None) }.op("vkCreateImage")?;

        let requirements = unsafe { device.device.get_image_memory_requirements(self.image) };
        let memory_type_index = find_memory_type(
            &device.memory_properties,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe {
            self.memory = device.device.allocate_memory(&alloc_info, None).op("vkAllocateMemory")?;
            device
                .device
                .bind_image_memory(self.image, self.memory, 0)
                .op("vkBindImageMemory")?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(Self::FORMAT)
            .subresource_range(depth_subresource_range());

        self.view = unsafe { device.device.create_image_view(&view_info, None) }.op("vkCreateImageView")?;

        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
        *self = Self::default();
    }
}

pub fn depth_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::DEPTH,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props
    }

    #[test]
    fn finds_first_type_with_all_properties() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(&props, !0, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, !0, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn respects_type_filter() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[host, host]);
        assert_eq!(find_memory_type(&props, 0b10, host).unwrap(), 1);
    }

    #[test]
    fn missing_type_is_an_error() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(matches!(
            find_memory_type(&props, !0, wanted),
            Err(RenderError::NoMemoryType(flags)) if flags == wanted
        ));
        assert!(find_memory_type(&props, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL).is_err());
    }
}
