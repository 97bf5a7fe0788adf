// Renderer - the render backend
//
// Owns every GPU object outside the device itself. One frame in flight:
//
//   wait fence -> upload uniforms -> acquire -> record -> reset fence
//   -> submit (signals rendered[image] + fence) -> present
//
// The fence is reset right before the submit that signals it again, so a
// failed acquire or recording never leaves it unsignaled for the next wait.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use slotmap::SlotMap;
use std::mem::size_of;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::buffer::{depth_subresource_range, DepthImage, GpuBuffer};
use super::pipeline::{self, PipelineTarget};
use super::{descriptors, shader, FrameSync, SurfaceProvider, Swapchain, VulkanDevice};
use crate::config::GraphicsConfig;
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::math;
use crate::scene::{Camera, Entity};

slotmap::new_key_type! {
    /// Handle to an entity's draw record inside one [`Renderer`].
    pub struct EntityKey;
}

/// Set 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUniforms {
    pub view_projection: [[f32; 4]; 4],
}

/// Set 1, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EntityUniforms {
    pub model: [[f32; 4]; 4],
}

impl EntityUniforms {
    fn of(entity: &Entity) -> Self {
        Self {
            model: math::to_gpu(&entity.model_matrix()),
        }
    }
}

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Held by the live renderer; releasing it allows the next one to start.
#[derive(Debug)]
struct RunningToken(());

impl RunningToken {
    fn acquire() -> RenderResult<Self> {
        RUNNING
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(()))
            .map_err(|_| RenderError::AlreadyRunning)
    }
}

impl Drop for RunningToken {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::Release);
    }
}

/// Everything needed to draw one entity.
#[derive(Debug, Default)]
struct EntityDrawRecord {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    set_layout: vk::DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uniform_buffer: GpuBuffer,
    index_count: u32,
    /// Written once the GPU is done with the previous frame.
    pending: Option<EntityUniforms>,
}

impl EntityDrawRecord {
    fn destroy(&self, device: &ash::Device, pool: vk::DescriptorPool) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        if self.descriptor_set != vk::DescriptorSet::null() {
            if let Err(e) = descriptors::free_set(device, pool, self.descriptor_set) {
                log::warn!("Failed to free entity descriptor set: {}", e);
            }
        }
        unsafe { device.destroy_descriptor_set_layout(self.set_layout, None) };
        self.vertex_buffer.destroy(device);
        self.index_buffer.destroy(device);
        self.uniform_buffer.destroy(device);
    }
}

pub struct Renderer {
    device: Arc<VulkanDevice>,
    swapchain: Swapchain,
    depth: DepthImage,

    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    descriptor_pool: vk::DescriptorPool,

    global_layout: vk::DescriptorSetLayout,
    global_set: vk::DescriptorSet,
    global_uniforms: GpuBuffer,

    sync: FrameSync,

    entities: SlotMap<EntityKey, EntityDrawRecord>,
    draw_order: Vec<EntityKey>,

    clear_color: [f32; 4],
    depth_write: bool,

    _running: RunningToken,
}

impl Renderer {
    /// Start the render backend for `window`.
    ///
    /// Fails with [`RenderError::AlreadyRunning`] while another renderer is
    /// alive. Anything created before a failing step is released again.
    pub fn new(window: &dyn SurfaceProvider, config: &GraphicsConfig, enable_validation: bool) -> RenderResult<Self> {
        let running = RunningToken::acquire()?;

        let extent = window.extent();
        if extent.width == 0 || extent.height == 0 {
            return Err(RenderError::Surface(format!(
                "window '{}' has no drawable area ({}x{})",
                window.title(),
                extent.width,
                extent.height
            )));
        }

        let device = VulkanDevice::new(window, enable_validation)?;
        let swapchain = Swapchain::new(&device, extent, config)?;

        // Null handles until filled in; Drop copes with either
        let mut renderer = Self {
            device,
            swapchain,
            depth: DepthImage::default(),
            command_pool: vk::CommandPool::null(),
            command_buffer: vk::CommandBuffer::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            global_layout: vk::DescriptorSetLayout::null(),
            global_set: vk::DescriptorSet::null(),
            global_uniforms: GpuBuffer::default(),
            sync: FrameSync::default(),
            entities: SlotMap::with_key(),
            draw_order: Vec::new(),
            clear_color: config.clear_color,
            depth_write: config.depth_write,
            _running: running,
        };

        renderer.create_frame_resources()?;

        log::info!(
            "Renderer ready: {}x{}, {} swapchain images",
            renderer.swapchain.extent.width,
            renderer.swapchain.extent.height,
            renderer.swapchain.image_count()
        );

        Ok(renderer)
    }

    /// Start the backend and register `entities` in order.
    pub fn with_entities(
        window: &dyn SurfaceProvider,
        config: &GraphicsConfig,
        enable_validation: bool,
        entities: &[Entity],
    ) -> RenderResult<(Self, Vec<EntityKey>)> {
        let mut renderer = Self::new(window, config, enable_validation)?;
        let keys = entities
            .iter()
            .map(|entity| renderer.register_entity(entity))
            .collect::<RenderResult<Vec<_>>>()?;
        Ok((renderer, keys))
    }

    fn create_frame_resources(&mut self) -> RenderResult<()> {
        let device = &self.device.device;

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(self.device.queue_family);
        self.command_pool = unsafe { device.create_command_pool(&pool_info, None) }.op("vkCreateCommandPool")?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        self.command_buffer =
            unsafe { device.allocate_command_buffers(&alloc_info) }.op("vkAllocateCommandBuffers")?[0];

        self.descriptor_pool = descriptors::create_descriptor_pool(device)?;
        self.sync.create(device, self.swapchain.image_count())?;
        self.depth.create(&self.device, self.swapchain.extent)?;

        self.global_layout = descriptors::create_uniform_layout(device)?;
        self.global_uniforms = GpuBuffer::new(
            &self.device,
            size_of::<GlobalUniforms>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;
        self.global_set = descriptors::allocate_set(device, self.descriptor_pool, self.global_layout)?;
        descriptors::write_uniform_buffer(device, self.global_set, self.global_uniforms.buffer);

        Ok(())
    }

    /// Build GPU draw state for `entity`. It is drawn after every entity
    /// registered before it.
    pub fn register_entity(&mut self, entity: &Entity) -> RenderResult<EntityKey> {
        let mut record = EntityDrawRecord::default();
        if let Err(e) = self.build_record(&mut record, entity) {
            record.destroy(&self.device.device, self.descriptor_pool);
            return Err(e);
        }

        let key = self.entities.insert(record);
        self.draw_order.push(key);

        log::debug!(
            "Registered entity {:?} at {:?} ({} indices)",
            key,
            entity.position,
            entity.mesh().indices().len()
        );
        Ok(key)
    }

    fn build_record(&self, record: &mut EntityDrawRecord, entity: &Entity) -> RenderResult<()> {
        let device = &self.device.device;
        let mesh = entity.mesh();

        record.set_layout = descriptors::create_uniform_layout(device)?;
        record.descriptor_set = descriptors::allocate_set(device, self.descriptor_pool, record.set_layout)?;
        record.uniform_buffer = GpuBuffer::with_data(
            &self.device,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            &[EntityUniforms::of(entity)],
        )?;
        descriptors::write_uniform_buffer(device, record.descriptor_set, record.uniform_buffer.buffer);

        record.pipeline_layout = pipeline::create_pipeline_layout(device, &[self.global_layout, record.set_layout])?;

        let vert = shader::load_shader_module(device, mesh.vertex_shader())?;
        let frag = match shader::load_shader_module(device, mesh.fragment_shader()) {
            Ok(module) => module,
            Err(e) => {
                unsafe { device.destroy_shader_module(vert, None) };
                return Err(e);
            }
        };

        let target = PipelineTarget {
            color_format: self.swapchain.format,
            depth_format: DepthImage::FORMAT,
            extent: self.swapchain.extent,
            depth_write: self.depth_write,
        };
        let pipeline = pipeline::create_graphics_pipeline(device, record.pipeline_layout, vert, frag, &target);

        // Modules are only needed while the pipeline is built
        unsafe {
            device.destroy_shader_module(vert, None);
            device.destroy_shader_module(frag, None);
        }
        record.pipeline = pipeline?;

        record.vertex_buffer =
            GpuBuffer::with_data(&self.device, vk::BufferUsageFlags::VERTEX_BUFFER, mesh.vertices())?;
        record.index_buffer = GpuBuffer::with_data(&self.device, vk::BufferUsageFlags::INDEX_BUFFER, mesh.indices())?;
        record.index_count = mesh.indices().len() as u32;

        Ok(())
    }

    /// Destroy an entity's draw state once the GPU is done with it.
    pub fn unregister_entity(&mut self, key: EntityKey) -> RenderResult<()> {
        if !self.entities.contains_key(key) {
            return Err(RenderError::UnknownEntity);
        }

        // The last submitted frame may still read this record
        self.sync.wait(&self.device.device)?;

        self.draw_order.retain(|&k| k != key);
        if let Some(record) = self.entities.remove(key) {
            record.destroy(&self.device.device, self.descriptor_pool);
        }

        log::debug!("Unregistered entity {:?}", key);
        Ok(())
    }

    /// Queue a new model matrix; it reaches the GPU on the next frame.
    pub fn update_entity(&mut self, key: EntityKey, entity: &Entity) -> RenderResult<()> {
        let record = self.entities.get_mut(key).ok_or(RenderError::UnknownEntity)?;
        record.pending = Some(EntityUniforms::of(entity));
        Ok(())
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.extent.width as f32 / self.swapchain.extent.height as f32
    }

    /// Draw every registered entity as seen from `camera` and present.
    pub fn render(&mut self, camera: &Camera) -> RenderResult<()> {
        let device = &self.device.device;

        // Blocks until the previous frame's GPU work completes
        self.sync.wait(device)?;

        let globals = GlobalUniforms {
            view_projection: math::to_gpu(&camera.view_projection(self.aspect_ratio())),
        };
        self.global_uniforms.write(device, &[globals])?;

        for record in self.entities.values_mut() {
            if let Some(uniforms) = record.pending.take() {
                record.uniform_buffer.write(device, &[uniforms])?;
            }
        }

        let image_index = self.swapchain.acquire_next_image(self.sync.image_available)?;
        self.record_commands(image_index)?;

        let rendered = self.sync.rendered[image_index as usize];
        let wait_semaphores = [self.sync.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer];
        let signal_semaphores = [rendered];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        self.sync.reset(device)?;
        unsafe { device.queue_submit(self.device.queue, &[submit_info], self.sync.in_flight_fence) }
            .op("vkQueueSubmit")?;

        self.swapchain.present(self.device.queue, image_index, rendered)
    }

    fn record_commands(&self, image_index: u32) -> RenderResult<()> {
        let device = &self.device.device;
        let cmd = self.command_buffer;
        let image = self.swapchain.images[image_index as usize];
        let image_view = self.swapchain.image_views[image_index as usize];
        let extent = self.swapchain.extent;

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .op("vkResetCommandBuffer")?;

            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin_info)
                .op("vkBeginCommandBuffer")?;

            // Previous contents are discarded for both attachments
            let to_attachment = [
                vk::ImageMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(color_subresource_range())
                    .build(),
                vk::ImageMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
                    .dst_access_mask(
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    )
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(self.depth.image)
                    .subresource_range(depth_subresource_range())
                    .build(),
            ];
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &to_attachment,
            );

            let color_attachment = vk::RenderingAttachmentInfo::builder()
                .image_view(image_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: self.clear_color,
                    },
                })
                .build();

            let depth_attachment = vk::RenderingAttachmentInfo::builder()
                .image_view(self.depth.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
                })
                .build();

            let color_attachments = [color_attachment];
            let rendering_info = vk::RenderingInfo::builder()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .layer_count(1)
                .color_attachments(&color_attachments)
                .depth_attachment(&depth_attachment);

            device.cmd_begin_rendering(cmd, &rendering_info);

            for &key in &self.draw_order {
                let Some(record) = self.entities.get(key) else {
                    continue;
                };

                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, record.pipeline);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    record.pipeline_layout,
                    0,
                    &[self.global_set, record.descriptor_set],
                    &[],
                );
                device.cmd_bind_vertex_buffers(cmd, 0, &[record.vertex_buffer.buffer], &[0]);

                if record.index_count > 0 {
                    device.cmd_bind_index_buffer(cmd, record.index_buffer.buffer, 0, vk::IndexType::UINT32);
                    device.cmd_draw_indexed(cmd, record.index_count, 1, 0, 0, 0);
                }
            }

            device.cmd_end_rendering(cmd);

            let to_present = vk::ImageMemoryBarrier::builder()
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::empty())
                .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_subresource_range())
                .build();
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_present],
            );

            device.end_command_buffer(cmd).op("vkEndCommandBuffer")?;
        }

        Ok(())
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Shutting down renderer ({} entities)", self.entities.len());

        // Nothing in flight may reference what is destroyed below
        if let Err(e) = self.device.wait_idle() {
            log::error!("Device did not go idle before shutdown: {}", e);
        }

        let device = &self.device.device;

        self.draw_order.clear();
        for (_, record) in self.entities.drain() {
            record.destroy(device, self.descriptor_pool);
        }

        self.global_uniforms.destroy(device);
        unsafe { device.destroy_descriptor_set_layout(self.global_layout, None) };
        self.depth.destroy(device);

        self.sync.destroy(device);
        self.swapchain.destroy(device);

        // Pools free their sets and command buffers with them
        unsafe {
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_command_pool(self.command_pool, None);
        }
        // device, surface and instance go with the last Arc<VulkanDevice>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Matrix4, Vector3};
    use crate::scene::Mesh;

    #[test]
    fn only_one_renderer_may_run() {
        let first = RunningToken::acquire().unwrap();
        assert!(matches!(RunningToken::acquire(), Err(RenderError::AlreadyRunning)));
        drop(first);

        let again = RunningToken::acquire().unwrap();
        drop(again);
    }

    #[test]
    fn uniform_blocks_are_one_matrix() {
        assert_eq!(size_of::<GlobalUniforms>(), 64);
        assert_eq!(size_of::<EntityUniforms>(), 64);
    }

    #[test]
    fn entity_uniforms_are_column_major() {
        let entity = Entity::new(Vector3::new(1.0, 2.0, 3.0), Arc::new(Mesh::cube("v", "f")));
        let uniforms = EntityUniforms::of(&entity);

        // translation lands in the last column, which is the last uploaded row
        assert_eq!(uniforms.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(Matrix4::from_cols_array_2d(&uniforms.model), entity.model_matrix());
    }
}
