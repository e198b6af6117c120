// Vulkan implementation of the graphics abstraction layer
//
// Abstraction-layer handles carry the raw Vulkan handle value, so no lookup
// is needed on the hot path. State that Vulkan keeps outside the handle
// (descriptor-set layouts, push-constant ranges, buffer memory) lives in
// side tables on the device.

mod buffer;
mod command;
mod convert;
mod device;
mod pipeline;
mod shader;

pub use command::VulkanCommandRecorder;
pub use convert::format_from_vk;
pub use device::VulkanDevice;

use ash::vk;
use ash::vk::Handle;

use crate::hal::*;

impl Device for VulkanDevice {
    fn graphics_api(&self) -> GraphicsApi {
        GraphicsApi::Vulkan
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> GraphicsResult<PipelineLayout> {
        let (layout, info) = pipeline::create_pipeline_layout(self, desc)?;
        self.tables.lock().layouts.insert(layout.as_raw(), info);
        Ok(PipelineLayout(layout.as_raw()))
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        let info = self.tables.lock().layouts.remove(&layout.0);
        unsafe {
            self.device
                .destroy_pipeline_layout(vk::PipelineLayout::from_raw(layout.0), None);
            for set_layout in info.into_iter().flat_map(|info| info.set_layouts) {
                self.device.destroy_descriptor_set_layout(set_layout, None);
            }
        }
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> GraphicsResult<Pipeline> {
        let layout = vk::PipelineLayout::from_raw(desc.layout.0);
        let pipeline = pipeline::create_graphics_pipeline(self, layout, desc)?;
        Ok(Pipeline(pipeline.as_raw()))
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        unsafe {
            self.device
                .destroy_pipeline(vk::Pipeline::from_raw(pipeline.0), None)
        };
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> GraphicsResult<Sampler> {
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(convert::filter(desc.mag_filter))
            .min_filter(convert::filter(desc.min_filter))
            .mipmap_mode(convert::mipmap_mode(desc.mip_filter))
            .address_mode_u(convert::address_mode(desc.address_u))
            .address_mode_v(convert::address_mode(desc.address_v))
            .address_mode_w(convert::address_mode(desc.address_w))
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { self.device.create_sampler(&create_info, None) }?;
        Ok(Sampler(sampler.as_raw()))
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        unsafe {
            self.device
                .destroy_sampler(vk::Sampler::from_raw(sampler.0), None)
        };
    }

    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<Texture> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::InvalidArgument);
        }

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(convert::format(desc.format))
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(desc.mip_num.max(1))
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }?;
        Ok(Texture(image.as_raw()))
    }

    fn destroy_texture(&self, texture: Texture) {
        unsafe { self.device.destroy_image(vk::Image::from_raw(texture.0), None) };
    }

    fn create_texture_view(&self, desc: &TextureViewDesc) -> GraphicsResult<TextureView> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(vk::Image::from_raw(desc.texture.0))
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(convert::format(desc.format))
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe { self.device.create_image_view(&create_info, None) }?;
        Ok(TextureView(view.as_raw()))
    }

    fn destroy_texture_view(&self, view: TextureView) {
        unsafe {
            self.device
                .destroy_image_view(vk::ImageView::from_raw(view.0), None)
        };
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<Buffer> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(convert::buffer_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&create_info, None) }?;
        Ok(Buffer(buffer.as_raw()))
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        self.tables.lock().buffer_memory.remove(&buffer.0);
        unsafe { self.device.destroy_buffer(vk::Buffer::from_raw(buffer.0), None) };
    }

    fn allocate_and_bind_memory(
        &self,
        location: MemoryLocation,
        resource: Resource,
    ) -> GraphicsResult<Memory> {
        let properties = convert::memory_properties(location);

        match resource {
            Resource::Buffer(handle) => {
                let vk_buffer = vk::Buffer::from_raw(handle.0);
                let requirements = unsafe { self.device.get_buffer_memory_requirements(vk_buffer) };
                let memory = buffer::allocate(self, requirements, properties)?;
                if let Err(e) = unsafe { self.device.bind_buffer_memory(vk_buffer, memory, 0) } {
                    unsafe { self.device.free_memory(memory, None) };
                    return Err(e.into());
                }
                if location == MemoryLocation::HostUpload {
                    self.tables.lock().buffer_memory.insert(handle.0, memory);
                }
                Ok(Memory(memory.as_raw()))
            }
            Resource::Texture(handle) => {
                let image = vk::Image::from_raw(handle.0);
                let requirements = unsafe { self.device.get_image_memory_requirements(image) };
                let memory = buffer::allocate(self, requirements, properties)?;
                if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
                    unsafe { self.device.free_memory(memory, None) };
                    return Err(e.into());
                }
                Ok(Memory(memory.as_raw()))
            }
        }
    }

    fn free_memory(&self, memory: Memory) {
        self.tables
            .lock()
            .buffer_memory
            .retain(|_, bound| bound.as_raw() != memory.0);
        unsafe {
            self.device
                .free_memory(vk::DeviceMemory::from_raw(memory.0), None)
        };
    }

    fn write_buffer(&self, buffer: Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let memory = self
            .tables
            .lock()
            .buffer_memory
            .get(&buffer.0)
            .copied()
            .ok_or(GraphicsError::InvalidArgument)?;

        // Only host-upload memory lands in the table, and it is never left mapped
        unsafe { buffer::write_memory(self, memory, offset, data) }?;
        Ok(())
    }

    fn upload_texture(&self, queue: CommandQueue, desc: &TextureUploadDesc<'_>) -> GraphicsResult<()> {
        let expected = desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel() as usize;
        if desc.pixels.len() != expected {
            return Err(GraphicsError::InvalidArgument);
        }

        buffer::upload_image(
            self,
            vk::Queue::from_raw(queue.0),
            vk::Image::from_raw(desc.texture.0),
            desc.width,
            desc.height,
            desc.pixels,
        )
    }

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> GraphicsResult<DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: desc.texture_max_num.max(1),
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: desc.sampler_max_num.max(1),
            },
        ];

        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(desc.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { self.device.create_descriptor_pool(&create_info, None) }?;
        Ok(DescriptorPool(pool.as_raw()))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPool) {
        unsafe {
            self.device
                .destroy_descriptor_pool(vk::DescriptorPool::from_raw(pool.0), None)
        };
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPool,
        layout: PipelineLayout,
        set_index: u32,
    ) -> GraphicsResult<DescriptorSet> {
        let set_layout = self
            .tables
            .lock()
            .layouts
            .get(&layout.0)
            .and_then(|info| info.set_layouts.get(set_index as usize).copied())
            .ok_or(GraphicsError::InvalidArgument)?;

        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(vk::DescriptorPool::from_raw(pool.0))
            .set_layouts(&set_layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info) }?;
        Ok(DescriptorSet(sets[0].as_raw()))
    }

    fn free_descriptor_set(&self, pool: DescriptorPool, set: DescriptorSet) {
        let result = unsafe {
            self.device.free_descriptor_sets(
                vk::DescriptorPool::from_raw(pool.0),
                &[vk::DescriptorSet::from_raw(set.0)],
            )
        };
        if let Err(e) = result {
            log::warn!("Failed to free descriptor set {:#x}: {:?}", set.0, e);
        }
    }

    fn update_descriptor_set(&self, set: DescriptorSet, update: &DescriptorSetUpdate) {
        let dst_set = vk::DescriptorSet::from_raw(set.0);
        let image_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::null(),
            image_view: vk::ImageView::from_raw(update.texture_view.0),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let sampler_info = [vk::DescriptorImageInfo {
            sampler: vk::Sampler::from_raw(update.sampler.0),
            image_view: vk::ImageView::null(),
            image_layout: vk::ImageLayout::UNDEFINED,
        }];

        // Binding order follows the range order of the layout: texture, sampler
        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(dst_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .image_info(&image_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(dst_set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::SAMPLER)
                .image_info(&sampler_info)
                .build(),
        ];

        unsafe { self.device.update_descriptor_sets(&writes, &[]) };
    }

    fn wait_for_idle(&self, queue: CommandQueue) -> GraphicsResult<()> {
        unsafe { self.device.queue_wait_idle(vk::Queue::from_raw(queue.0)) }?;
        Ok(())
    }
}
