// Per-frame vertex and index buffers
//
// Each frame in flight owns one vertex and one index buffer in host-upload
// memory. Buffers only grow; a slot is reused once the ring wraps, which the
// caller guarantees is after the GPU finished with it.

use bytemuck::{Pod, Zeroable};

use super::context::BackendContext;
use crate::gui::DrawVert;
use crate::hal::*;

/// Vertex layout consumed by the GUI pipeline: 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameVertex {
    pub pos: [f32; 2],
    /// Normalized 16-bit texture coordinates.
    pub uv: [u16; 2],
    pub col: [u8; 4],
}

fn unorm16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * u16::MAX as f32).round() as u16
}

impl From<&DrawVert> for FrameVertex {
    fn from(v: &DrawVert) -> Self {
        Self {
            pos: v.pos,
            uv: [unorm16(v.uv[0]), unorm16(v.uv[1])],
            col: v.col.to_le_bytes(),
        }
    }
}

/// Capacity after a request for `required` elements. Never shrinks.
pub fn grow_capacity(current: usize, required: usize, minimum: usize) -> usize {
    if required <= current {
        current
    } else {
        required.max(current * 2).max(minimum)
    }
}

/// A buffer plus the memory bound to it; capacity is in elements.
#[derive(Debug, Default)]
pub(crate) struct GpuBuffer {
    pub buffer: Buffer,
    pub memory: Memory,
    pub capacity: usize,
}

impl GpuBuffer {
    pub fn destroy(&mut self, device: &impl Device) {
        if !self.buffer.is_null() {
            device.destroy_buffer(self.buffer);
        }
        if !self.memory.is_null() {
            device.free_memory(self.memory);
        }
        *self = Self::default();
    }

    /// Make room for `required` elements of `element_size` bytes.
    /// Returns false if the buffer could not be (re)created.
    pub fn reserve<D: Device>(
        &mut self,
        ctx: &BackendContext<D>,
        required: usize,
        minimum: usize,
        element_size: usize,
        usage: BufferUsage,
    ) -> bool {
        if required <= self.capacity && !self.buffer.is_null() {
            return true;
        }

        let capacity = grow_capacity(self.capacity, required, minimum);
        log::debug!(
            "Growing {:?} buffer: {} -> {} elements",
            usage,
            self.capacity,
            capacity
        );

        // The slot is not in flight, so the old buffer can go right away
        self.destroy(&*ctx.device);

        let Some(buffer) = ctx.check(ctx.device.create_buffer(&BufferDesc {
            size: (capacity * element_size) as u64,
            usage,
        })) else {
            return false;
        };
        let Some(memory) = ctx.check(
            ctx.device
                .allocate_and_bind_memory(MemoryLocation::HostUpload, Resource::Buffer(buffer)),
        ) else {
            ctx.device.destroy_buffer(buffer);
            return false;
        };

        *self = Self {
            buffer,
            memory,
            capacity,
        };
        true
    }
}

#[derive(Debug, Default)]
pub(crate) struct FrameBuffers {
    pub vertex: GpuBuffer,
    pub index: GpuBuffer,
}

impl FrameBuffers {
    pub fn destroy(&mut self, device: &impl Device) {
        self.vertex.destroy(device);
        self.index.destroy(device);
    }
}

/// One `FrameBuffers` per frame in flight, used round-robin.
#[derive(Debug)]
pub(crate) struct FrameRing {
    frames: Vec<FrameBuffers>,
    frame_count: u64,
}

impl FrameRing {
    pub fn new(len: u32) -> Self {
        Self {
            frames: (0..len).map(|_| FrameBuffers::default()).collect(),
            frame_count: 0,
        }
    }

    /// Slot for the next frame.
    pub fn advance(&mut self) -> &mut FrameBuffers {
        let slot = (self.frame_count % self.frames.len() as u64) as usize;
        self.frame_count += 1;
        &mut self.frames[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameBuffers> {
        self.frames.iter()
    }

    pub fn destroy_all(&mut self, device: &impl Device) {
        for frame in &mut self.frames {
            frame.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_vertex_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<FrameVertex>(), 16);
    }

    #[test]
    fn converts_gui_vertex() {
        let v = FrameVertex::from(&DrawVert {
            pos: [3.0, 4.5],
            uv: [0.0, 1.0],
            col: 0xff20_1008,
        });

        assert_eq!(v.pos, [3.0, 4.5]);
        assert_eq!(v.uv, [0, u16::MAX]);
        assert_eq!(v.col, [0x08, 0x10, 0x20, 0xff]);
    }

    #[test]
    fn capacity_grows_geometrically_and_never_shrinks() {
        assert_eq!(grow_capacity(0, 10, 5000), 5000);
        assert_eq!(grow_capacity(5000, 5001, 5000), 10000);
        assert_eq!(grow_capacity(5000, 20000, 5000), 20000);
        assert_eq!(grow_capacity(10000, 3, 5000), 10000);
    }

    #[test]
    fn ring_cycles_through_slots() {
        let mut ring = FrameRing::new(3);
        let slots: Vec<_> = (0..4)
            .map(|_| ring.advance() as *const FrameBuffers)
            .collect();

        assert_ne!(slots[0], slots[1]);
        assert_ne!(slots[1], slots[2]);
        assert_eq!(slots[0], slots[3]);
    }
}
