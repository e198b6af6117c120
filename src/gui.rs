// GUI library boundary
//
// The plain data an immediate-mode GUI hands to its renderer backend each
// frame: draw lists of vertices, 16-bit indices and draw commands, plus the
// font atlas and the per-context backend slot.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;

/// GUI-native vertex. `col` is packed RGBA with red in the low byte.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrawVert {
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    pub col: u32,
}

pub type DrawIdx = u16;

/// Opaque texture identifier the GUI stores in its draw commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u64);

impl TextureId {
    pub const NONE: Self = Self(0);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCmd {
    /// Draw `count` indices starting at `idx_offset`, clipped to
    /// `clip_rect` (`[min_x, min_y, max_x, max_y]` in display coordinates).
    Elements {
        count: u32,
        clip_rect: [f32; 4],
        texture_id: TextureId,
        vtx_offset: u32,
        idx_offset: u32,
    },
    /// Re-apply the backend's render state before the next command.
    ResetRenderState,
}

#[derive(Debug, Clone, Default)]
pub struct DrawList {
    pub vtx_buffer: Vec<DrawVert>,
    pub idx_buffer: Vec<DrawIdx>,
    pub commands: Vec<DrawCmd>,
}

/// Everything needed to render one frame of GUI output.
#[derive(Debug, Clone)]
pub struct DrawData {
    /// Top-left of the displayed region, in display coordinates.
    pub display_pos: Vec2,
    pub display_size: Vec2,
    /// Framebuffer pixels per display unit (2.0 on most HiDPI screens).
    pub framebuffer_scale: Vec2,
    pub draw_lists: Vec<DrawList>,
}

impl Default for DrawData {
    fn default() -> Self {
        Self {
            display_pos: Vec2::ZERO,
            display_size: Vec2::ZERO,
            framebuffer_scale: Vec2::ONE,
            draw_lists: Vec::new(),
        }
    }
}

impl DrawData {
    pub fn total_vtx_count(&self) -> usize {
        self.draw_lists.iter().map(|l| l.vtx_buffer.len()).sum()
    }

    pub fn total_idx_count(&self) -> usize {
        self.draw_lists.iter().map(|l| l.idx_buffer.len()).sum()
    }

    /// Framebuffer size in pixels.
    pub fn framebuffer_size(&self) -> Vec2 {
        self.display_size * self.framebuffer_scale
    }
}

/// RGBA8 font atlas owned by the GUI context.
#[derive(Debug, Clone, Default)]
pub struct FontAtlas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Set by the backend once the atlas lives on the GPU.
    pub tex_id: TextureId,
    dirty: bool,
}

impl FontAtlas {
    /// Replace the atlas contents; the atlas becomes dirty.
    pub fn set_rgba32(&mut self, width: u32, height: u32, pixels: Vec<u8>) {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        self.width = width;
        self.height = height;
        self.pixels = pixels;
        self.dirty = true;
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// Identifies the renderer backend registered on a context.
///
/// Only a lookup key: the renderer itself stays owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(u64);

impl BackendId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Io {
    pub backend_renderer_name: Option<&'static str>,
    pub backend_renderer: Option<BackendId>,
}

#[derive(Debug, Clone, Default)]
pub struct GuiContext {
    pub io: Io,
    pub fonts: FontAtlas,
}

impl GuiContext {
    pub fn new() -> Self {
        Self::default()
    }
}
