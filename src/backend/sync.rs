// Synchronization primitives
//
// One frame in flight: a single acquire semaphore and fence, plus one
// render-finished semaphore per swapchain image. Presentation of image N
// may still be reading its semaphore when another image is acquired, so
// those cannot be shared.

use ash::vk;

use crate::error::{RenderResult, VkResultExt};

#[derive(Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    /// Indexed by swapchain image.
    pub rendered: Vec<vk::Semaphore>,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    /// Handles are filled in as they are created; on error whatever exists
    /// is already in `self` and released by [`FrameSync::destroy`].
    pub fn create(&mut self, device: &ash::Device, image_count: usize) -> RenderResult<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first frame does not wait forever
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None).op("vkCreateSemaphore")?;
            for _ in 0..image_count {
                self.rendered
                    .push(device.create_semaphore(&semaphore_info, None).op("vkCreateSemaphore")?);
            }
            self.in_flight_fence = device.create_fence(&fence_info, None).op("vkCreateFence")?;
        }

        Ok(())
    }

    pub fn wait(&self, device: &ash::Device) -> RenderResult<()> {
        unsafe { device.wait_for_fences(&[self.in_flight_fence], true, u64::MAX) }.op("vkWaitForFences")
    }

    pub fn reset(&self, device: &ash::Device) -> RenderResult<()> {
        unsafe { device.reset_fences(&[self.in_flight_fence]) }.op("vkResetFences")
    }

    /// Fence first, then semaphores. Null handles are skipped by the driver.
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.destroy_fence(self.in_flight_fence, None);
            device.destroy_semaphore(self.image_available, None);
            for semaphore in self.rendered.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.in_flight_fence = vk::Fence::null();
        self.image_available = vk::Semaphore::null();
    }
}
