// Descriptor pool, layouts and uniform-buffer sets
//
// Two sets are bound per draw: set 0 holds the per-frame globals, set 1 the
// entity's model matrix. Both use the same single-uniform-buffer layout.

use ash::vk;

use crate::error::{RenderResult, VkResultExt};

/// Pool sized for many entities; sets are freed one by one on unregister.
pub fn create_descriptor_pool(device: &ash::Device) -> RenderResult<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 10_000,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            descriptor_count: 100,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 100,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: 100,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 100,
        },
    ];

    let pool_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(10_000)
        .pool_sizes(&pool_sizes);

    unsafe { device.create_descriptor_pool(&pool_info, None) }.op("vkCreateDescriptorPool")
}

/// One uniform buffer at binding 0, visible to every graphics stage.
pub fn create_uniform_layout(device: &ash::Device) -> RenderResult<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding::builder()
        .binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS)
        .build();

    let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(std::slice::from_ref(&binding));

    unsafe { device.create_descriptor_set_layout(&layout_info, None) }.op("vkCreateDescriptorSetLayout")
}

pub fn allocate_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> RenderResult<vk::DescriptorSet> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);

    let sets = unsafe { device.allocate_descriptor_sets(&alloc_info) }.op("vkAllocateDescriptorSets")?;
    Ok(sets[0])
}

/// Point binding 0 of `set` at the whole of `buffer`.
pub fn write_uniform_buffer(device: &ash::Device, set: vk::DescriptorSet, buffer: vk::Buffer) {
    let buffer_info = vk::DescriptorBufferInfo {
        buffer,
        offset: 0,
        range: vk::WHOLE_SIZE,
    };

    let write = vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(&buffer_info))
        .build();

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

pub fn free_set(device: &ash::Device, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> RenderResult<()> {
    unsafe { device.free_descriptor_sets(pool, &[set]) }.op("vkFreeDescriptorSets")
}
