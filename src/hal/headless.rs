// Headless device - graphics layer without a GPU
//
// Hands out unique handles, keeps track of which objects are alive, stores
// buffer and descriptor-set contents, and logs every call. Useful for tests
// and for applications that build GUI frames without presenting them.
// Failures can be injected per operation to exercise error paths.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use super::*;

/// First handle value handed out; smaller values are reserved for queues.
const FIRST_HANDLE: u64 = 0x100;

/// Fallible operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreatePipelineLayout,
    CreateGraphicsPipeline,
    CreateSampler,
    CreateTexture,
    CreateTextureView,
    CreateBuffer,
    AllocateMemory,
    WriteBuffer,
    UploadTexture,
    CreateDescriptorPool,
    AllocateDescriptorSet,
    WaitForIdle,
}

/// One entry of the device call log.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreatePipelineLayout(PipelineLayout),
    DestroyPipelineLayout(PipelineLayout),
    CreateGraphicsPipeline { pipeline: Pipeline, format: Format },
    DestroyPipeline(Pipeline),
    CreateSampler(Sampler),
    DestroySampler(Sampler),
    CreateTexture { texture: Texture, width: u32, height: u32 },
    DestroyTexture(Texture),
    CreateTextureView { view: TextureView, texture: Texture },
    DestroyTextureView(TextureView),
    CreateBuffer { buffer: Buffer, size: u64, usage: BufferUsage },
    DestroyBuffer(Buffer),
    AllocateMemory { memory: Memory, resource: Resource },
    FreeMemory(Memory),
    WriteBuffer { buffer: Buffer, offset: u64, len: usize },
    UploadTexture { texture: Texture, len: usize },
    CreateDescriptorPool(DescriptorPool),
    DestroyDescriptorPool(DescriptorPool),
    AllocateDescriptorSet(DescriptorSet),
    FreeDescriptorSet(DescriptorSet),
    UpdateDescriptorSet { set: DescriptorSet, update: DescriptorSetUpdate },
    WaitForIdle(CommandQueue),
}

#[derive(Default)]
struct State {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    live: HashSet<u64>,
    failures: HashMap<Operation, Vec<GraphicsError>>,
    buffers: HashMap<u64, Vec<u8>>,
    descriptor_sets: HashMap<u64, DescriptorSetUpdate>,
    recycle_descriptor_sets: bool,
    freed_descriptor_sets: Vec<u64>,
}

impl State {
    fn take_failure(&mut self, op: Operation) -> GraphicsResult<()> {
        match self.failures.get_mut(&op).and_then(|queue| queue.pop()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn new_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.live.insert(handle);
        handle
    }

    fn release(&mut self, handle: u64, call: DeviceCall) {
        if !self.live.remove(&handle) {
            log::error!("[headless] {:?} on a handle that is not alive", call);
        }
        self.calls.push(call);
    }
}

/// Device that runs entirely on the CPU.
pub struct HeadlessDevice {
    api: GraphicsApi,
    queue: CommandQueue,
    state: Mutex<State>,
}

impl HeadlessDevice {
    pub fn new(api: GraphicsApi) -> Self {
        Self {
            api,
            queue: CommandQueue(1),
            state: Mutex::new(State {
                next_handle: FIRST_HANDLE,
                ..State::default()
            }),
        }
    }

    /// Hand freed descriptor set handles out again, most recent first, the
    /// way a Vulkan pool with `FREE_DESCRIPTOR_SET` may.
    pub fn with_descriptor_set_recycling(self) -> Self {
        self.state.lock().recycle_descriptor_sets = true;
        self
    }

    /// The single queue this device exposes.
    pub fn queue(&self) -> CommandQueue {
        self.queue
    }

    /// Make the next call of `op` fail with `error`. Stacks when repeated.
    pub fn fail_next(&self, op: Operation, error: GraphicsError) {
        self.state.lock().failures.entry(op).or_default().insert(0, error);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state.lock().calls.clone()
    }

    /// Return the call log and start a fresh one.
    pub fn take_calls(&self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn count_calls(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of created objects that have not been destroyed yet.
    pub fn live_object_count(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_alive(&self, handle: u64) -> bool {
        self.state.lock().live.contains(&handle)
    }

    pub fn buffer_contents(&self, buffer: Buffer) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(&buffer.0).cloned()
    }

    pub fn descriptor_set_contents(&self, set: DescriptorSet) -> Option<DescriptorSetUpdate> {
        self.state.lock().descriptor_sets.get(&set.0).copied()
    }

    fn create(
        &self,
        op: Operation,
        call: impl FnOnce(u64) -> DeviceCall,
    ) -> GraphicsResult<u64> {
        let mut state = self.state.lock();
        state.take_failure(op)?;
        let handle = state.new_handle();
        state.calls.push(call(handle));
        Ok(handle)
    }
}

impl Device for HeadlessDevice {
    fn graphics_api(&self) -> GraphicsApi {
        self.api
    }

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> GraphicsResult<PipelineLayout> {
        if desc.root_constants.iter().any(|rc| rc.size % 4 != 0) {
            return Err(GraphicsError::InvalidArgument);
        }
        self.create(Operation::CreatePipelineLayout, |h| {
            DeviceCall::CreatePipelineLayout(PipelineLayout(h))
        })
        .map(PipelineLayout)
    }

    fn destroy_pipeline_layout(&self, layout: PipelineLayout) {
        self.state
            .lock()
            .release(layout.0, DeviceCall::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> GraphicsResult<Pipeline> {
        if !self.is_alive(desc.layout.0)
            || desc.shaders.iter().any(|s| s.bytecode.is_empty())
            || desc.color_attachments.is_empty()
        {
            return Err(GraphicsError::InvalidArgument);
        }
        let format = desc.color_attachments[0].format;
        self.create(Operation::CreateGraphicsPipeline, |h| {
            DeviceCall::CreateGraphicsPipeline {
                pipeline: Pipeline(h),
                format,
            }
        })
        .map(Pipeline)
    }

    fn destroy_pipeline(&self, pipeline: Pipeline) {
        self.state
            .lock()
            .release(pipeline.0, DeviceCall::DestroyPipeline(pipeline));
    }

    fn create_sampler(&self, _desc: &SamplerDesc) -> GraphicsResult<Sampler> {
        self.create(Operation::CreateSampler, |h| DeviceCall::CreateSampler(Sampler(h)))
            .map(Sampler)
    }

    fn destroy_sampler(&self, sampler: Sampler) {
        self.state
            .lock()
            .release(sampler.0, DeviceCall::DestroySampler(sampler));
    }

    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<Texture> {
        if desc.width == 0 || desc.height == 0 {
            return Err(GraphicsError::InvalidArgument);
        }
        self.create(Operation::CreateTexture, |h| DeviceCall::CreateTexture {
            texture: Texture(h),
            width: desc.width,
            height: desc.height,
        })
        .map(Texture)
    }

    fn destroy_texture(&self, texture: Texture) {
        self.state
            .lock()
            .release(texture.0, DeviceCall::DestroyTexture(texture));
    }

    fn create_texture_view(&self, desc: &TextureViewDesc) -> GraphicsResult<TextureView> {
        self.create(Operation::CreateTextureView, |h| DeviceCall::CreateTextureView {
            view: TextureView(h),
            texture: desc.texture,
        })
        .map(TextureView)
    }

    fn destroy_texture_view(&self, view: TextureView) {
        self.state
            .lock()
            .release(view.0, DeviceCall::DestroyTextureView(view));
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<Buffer> {
        let handle = self.create(Operation::CreateBuffer, |h| DeviceCall::CreateBuffer {
            buffer: Buffer(h),
            size: desc.size,
            usage: desc.usage,
        })?;
        self.state
            .lock()
            .buffers
            .insert(handle, vec![0; desc.size as usize]);
        Ok(Buffer(handle))
    }

    fn destroy_buffer(&self, buffer: Buffer) {
        let mut state = self.state.lock();
        state.buffers.remove(&buffer.0);
        state.release(buffer.0, DeviceCall::DestroyBuffer(buffer));
    }

    fn allocate_and_bind_memory(
        &self,
        _location: MemoryLocation,
        resource: Resource,
    ) -> GraphicsResult<Memory> {
        self.create(Operation::AllocateMemory, |h| DeviceCall::AllocateMemory {
            memory: Memory(h),
            resource,
        })
        .map(Memory)
    }

    fn free_memory(&self, memory: Memory) {
        self.state
            .lock()
            .release(memory.0, DeviceCall::FreeMemory(memory));
    }

    fn write_buffer(&self, buffer: Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        state.take_failure(Operation::WriteBuffer)?;
        let contents = state
            .buffers
            .get_mut(&buffer.0)
            .ok_or(GraphicsError::InvalidArgument)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > contents.len() {
            return Err(GraphicsError::InvalidArgument);
        }
        contents[start..end].copy_from_slice(data);
        state.calls.push(DeviceCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn upload_texture(&self, _queue: CommandQueue, desc: &TextureUploadDesc<'_>) -> GraphicsResult<()> {
        let expected =
            desc.width as usize * desc.height as usize * desc.format.bytes_per_pixel() as usize;
        if desc.pixels.len() != expected {
            return Err(GraphicsError::InvalidArgument);
        }
        let mut state = self.state.lock();
        state.take_failure(Operation::UploadTexture)?;
        state.calls.push(DeviceCall::UploadTexture {
            texture: desc.texture,
            len: desc.pixels.len(),
        });
        Ok(())
    }

    fn create_descriptor_pool(&self, _desc: &DescriptorPoolDesc) -> GraphicsResult<DescriptorPool> {
        self.create(Operation::CreateDescriptorPool, |h| {
            DeviceCall::CreateDescriptorPool(DescriptorPool(h))
        })
        .map(DescriptorPool)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPool) {
        self.state
            .lock()
            .release(pool.0, DeviceCall::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPool,
        layout: PipelineLayout,
        _set_index: u32,
    ) -> GraphicsResult<DescriptorSet> {
        if !self.is_alive(pool.0) || !self.is_alive(layout.0) {
            return Err(GraphicsError::InvalidArgument);
        }
        let mut state = self.state.lock();
        state.take_failure(Operation::AllocateDescriptorSet)?;
        let handle = match state.freed_descriptor_sets.pop() {
            Some(handle) => {
                state.live.insert(handle);
                handle
            }
            None => state.new_handle(),
        };
        let set = DescriptorSet(handle);
        state.calls.push(DeviceCall::AllocateDescriptorSet(set));
        Ok(set)
    }

    fn free_descriptor_set(&self, _pool: DescriptorPool, set: DescriptorSet) {
        let mut state = self.state.lock();
        state.descriptor_sets.remove(&set.0);
        if state.recycle_descriptor_sets && state.live.contains(&set.0) {
            state.freed_descriptor_sets.push(set.0);
        }
        state.release(set.0, DeviceCall::FreeDescriptorSet(set));
    }

    fn update_descriptor_set(&self, set: DescriptorSet, update: &DescriptorSetUpdate) {
        let mut state = self.state.lock();
        state.descriptor_sets.insert(set.0, *update);
        state.calls.push(DeviceCall::UpdateDescriptorSet {
            set,
            update: *update,
        });
    }

    fn wait_for_idle(&self, queue: CommandQueue) -> GraphicsResult<()> {
        let mut state = self.state.lock();
        state.take_failure(Operation::WaitForIdle)?;
        state.calls.push(DeviceCall::WaitForIdle(queue));
        Ok(())
    }
}

// =============================================================================
// COMMAND RECORDING
// =============================================================================

/// One recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPipelineLayout(PipelineLayout),
    SetPipeline(Pipeline),
    SetDescriptorSet { set_index: u32, set: DescriptorSet },
    SetRootConstants { index: u32, data: Vec<u8> },
    SetIndexBuffer { buffer: Buffer, offset: u64, index_type: IndexType },
    SetVertexBuffers { base_slot: u32, buffers: Vec<Buffer>, offsets: Vec<u64> },
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Rect>),
    DrawIndexed(DrawIndexedDesc),
}

/// Command buffer that keeps what was recorded into it.
#[derive(Debug, Clone)]
pub struct RecordingCommandBuffer {
    format: Format,
    commands: Vec<Command>,
}

impl RecordingCommandBuffer {
    pub fn new(format: Format) -> Self {
        Self {
            format,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn draw_calls(&self) -> Vec<DrawIndexedDesc> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed(desc) => Some(*desc),
                _ => None,
            })
            .collect()
    }

    pub fn scissors(&self) -> Vec<Rect> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetScissors(rects) => rects.first().copied(),
                _ => None,
            })
            .collect()
    }

    pub fn bound_descriptor_sets(&self) -> Vec<DescriptorSet> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::SetDescriptorSet { set, .. } => Some(*set),
                _ => None,
            })
            .collect()
    }
}

impl CommandRecorder for RecordingCommandBuffer {
    fn color_attachment_format(&self) -> Format {
        self.format
    }

    fn set_pipeline_layout(&mut self, layout: PipelineLayout) {
        self.commands.push(Command::SetPipelineLayout(layout));
    }

    fn set_pipeline(&mut self, pipeline: Pipeline) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_descriptor_set(&mut self, set_index: u32, set: DescriptorSet) {
        self.commands.push(Command::SetDescriptorSet { set_index, set });
    }

    fn set_root_constants(&mut self, index: u32, data: &[u8]) {
        self.commands.push(Command::SetRootConstants {
            index,
            data: data.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, buffer: Buffer, offset: u64, index_type: IndexType) {
        self.commands.push(Command::SetIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    fn set_vertex_buffers(&mut self, base_slot: u32, buffers: &[Buffer], offsets: &[u64]) {
        self.commands.push(Command::SetVertexBuffers {
            base_slot,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        self.commands.push(Command::SetViewports(viewports.to_vec()));
    }

    fn set_scissors(&mut self, rects: &[Rect]) {
        self.commands.push(Command::SetScissors(rects.to_vec()));
    }

    fn draw_indexed(&mut self, desc: &DrawIndexedDesc) {
        self.commands.push(Command::DrawIndexed(*desc));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_and_tracked() {
        let device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let a = device.create_sampler(&sampler()).unwrap();
        let b = device.create_sampler(&sampler()).unwrap();

        assert_ne!(a, b);
        assert_eq!(device.live_object_count(), 2);

        device.destroy_sampler(a);
        assert_eq!(device.live_object_count(), 1);
        assert!(!device.is_alive(a.0));
    }

    #[test]
    fn injected_failure_is_consumed_once() {
        let device = HeadlessDevice::new(GraphicsApi::Vulkan);
        device.fail_next(Operation::CreateSampler, GraphicsError::OutOfMemory);

        assert_eq!(device.create_sampler(&sampler()), Err(GraphicsError::OutOfMemory));
        assert!(device.create_sampler(&sampler()).is_ok());
    }

    #[test]
    fn writes_land_in_buffer_contents() {
        let device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let buffer = device
            .create_buffer(&BufferDesc {
                size: 8,
                usage: BufferUsage::Index,
            })
            .unwrap();

        device.write_buffer(buffer, 2, &[1, 2, 3]).unwrap();
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![0, 0, 1, 2, 3, 0, 0, 0]);
        assert_eq!(
            device.write_buffer(buffer, 6, &[1, 2, 3]),
            Err(GraphicsError::InvalidArgument)
        );
    }

    #[test]
    fn recycling_device_reuses_freed_descriptor_sets() {
        let device = HeadlessDevice::new(GraphicsApi::Vulkan).with_descriptor_set_recycling();
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDesc {
                descriptor_sets: Vec::new(),
                root_constants: Vec::new(),
            })
            .unwrap();
        let pool = device
            .create_descriptor_pool(&DescriptorPoolDesc {
                max_sets: 4,
                texture_max_num: 4,
                sampler_max_num: 4,
            })
            .unwrap();

        let first = device.allocate_descriptor_set(pool, layout, 0).unwrap();
        device.free_descriptor_set(pool, first);
        let second = device.allocate_descriptor_set(pool, layout, 0).unwrap();

        assert_eq!(first, second);
        assert!(device.is_alive(second.0));
    }

    #[test]
    fn oversized_upload_is_rejected_without_overflow() {
        let device = HeadlessDevice::new(GraphicsApi::Vulkan);
        let result = device.upload_texture(
            device.queue(),
            &TextureUploadDesc {
                texture: Texture(FIRST_HANDLE),
                width: 1 << 16,
                height: 1 << 16,
                format: Format::Rgba8Unorm,
                pixels: &[],
            },
        );

        assert_eq!(result, Err(GraphicsError::InvalidArgument));
    }

    fn sampler() -> SamplerDesc {
        SamplerDesc {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
        }
    }
}
