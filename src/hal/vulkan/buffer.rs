// Buffer and memory utilities
//
// Memory type selection, dedicated allocations for buffers and images,
// and the staging path used to fill device-local textures.

use ash::vk;

use super::VulkanDevice;
use crate::hal::{GraphicsError, GraphicsResult};

/// Find a suitable memory type index
pub(crate) fn find_memory_type(
    device: &VulkanDevice,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> GraphicsResult<u32> {
    let mem_properties = &device.memory_properties;

    for i in 0..mem_properties.memory_type_count {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = mem_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        if has_type && has_properties {
            return Ok(i);
        }
    }

    log::error!("No memory type matches {:?} (filter {:#b})", properties, type_filter);
    Err(GraphicsError::Unsupported)
}

/// Allocate memory satisfying `requirements` with the given properties
pub(crate) fn allocate(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> GraphicsResult<vk::DeviceMemory> {
    let memory_type_index =
        find_memory_type(device, requirements.memory_type_bits, properties)?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    Ok(unsafe { device.device.allocate_memory(&alloc_info, None) }?)
}

/// Create a host-visible buffer, bind memory and fill it with `data`
pub(crate) fn create_staging_buffer(
    device: &VulkanDevice,
    data: &[u8],
) -> GraphicsResult<(vk::Buffer, vk::DeviceMemory)> {
    let size = data.len() as vk::DeviceSize;
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }?;
    let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let memory = match allocate(
        device,
        requirements,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    ) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    let filled = unsafe {
        device
            .device
            .bind_buffer_memory(buffer, memory, 0)
            .and_then(|_| write_memory(device, memory, 0, data))
    };
    if let Err(e) = filled {
        unsafe {
            device.device.destroy_buffer(buffer, None);
            device.device.free_memory(memory, None);
        }
        return Err(e.into());
    }

    Ok((buffer, memory))
}

/// Map, copy and unmap host-visible memory
///
/// # Safety
/// `memory` must be host visible, not currently mapped, and at least
/// `offset + data.len()` bytes large.
pub(crate) unsafe fn write_memory(
    device: &VulkanDevice,
    memory: vk::DeviceMemory,
    offset: vk::DeviceSize,
    data: &[u8],
) -> Result<(), vk::Result> {
    let ptr = device.device.map_memory(
        memory,
        offset,
        data.len() as vk::DeviceSize,
        vk::MemoryMapFlags::empty(),
    )? as *mut u8;

    ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
    device.device.unmap_memory(memory);
    Ok(())
}

/// Record commands with `record`, submit them to `queue` and wait for completion
pub(crate) fn submit_one_time(
    device: &VulkanDevice,
    queue: vk::Queue,
    record: impl FnOnce(vk::CommandBuffer),
) -> GraphicsResult<()> {
    let pool = device.upload_pool.lock();

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(*pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }?[0];

    let result = unsafe {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device
            .device
            .begin_command_buffer(cmd, &begin_info)
            .map(|_| record(cmd))
            .and_then(|_| device.device.end_command_buffer(cmd))
            .and_then(|_| {
                let fence = device
                    .device
                    .create_fence(&vk::FenceCreateInfo::builder(), None)?;
                let command_buffers = [cmd];
                let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
                let waited = device
                    .device
                    .queue_submit(queue, &[submit_info.build()], fence)
                    .and_then(|_| device.device.wait_for_fences(&[fence], true, u64::MAX));
                device.device.destroy_fence(fence, None);
                waited
            })
    };

    unsafe { device.device.free_command_buffers(*pool, &[cmd]) };
    Ok(result?)
}

/// Copy tightly packed pixels into a freshly created image and leave it
/// in SHADER_READ_ONLY_OPTIMAL
pub(crate) fn upload_image(
    device: &VulkanDevice,
    queue: vk::Queue,
    image: vk::Image,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> GraphicsResult<()> {
    let (staging_buffer, staging_memory) = create_staging_buffer(device, pixels)?;

    let subresource_range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let result = submit_one_time(device, queue, |cmd| unsafe {
        // UNDEFINED -> TRANSFER_DST_OPTIMAL
        let to_transfer = vk::ImageMemoryBarrier::builder()
            .image(image)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(subresource_range)
            .build();
        device.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        device.device.cmd_copy_buffer_to_image(
            cmd,
            staging_buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        // TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL
        let to_shader = vk::ImageMemoryBarrier::builder()
            .image(image)
            .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .subresource_range(subresource_range)
            .build();
        device.device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    });

    // The submission has completed (or never started) either way
    unsafe {
        device.device.destroy_buffer(staging_buffer, None);
        device.device.free_memory(staging_memory, None);
    }

    result
}
