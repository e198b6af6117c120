// Font atlas and texture registry
//
// The font atlas is one device-local RGBA8 texture with a view and a
// descriptor set. It is created all-or-nothing: on any failure the partial
// objects are released and the atlas stays unbound. User textures get a
// descriptor set each. Texture ids come from the registry and are never
// reused, even when the device hands a freed descriptor set out again.

use std::collections::HashMap;

use super::Renderer;
use crate::gui::{FontAtlas, GuiContext, TextureId};
use crate::hal::*;

/// Device objects backing the font atlas. Null handles mean "not created".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FontResources {
    pub id: TextureId,
    pub texture: Texture,
    pub memory: Memory,
    pub view: TextureView,
    pub descriptor_set: DescriptorSet,
}

impl FontResources {
    fn release(&mut self, device: &impl Device, pool: DescriptorPool) {
        if !self.descriptor_set.is_null() {
            device.free_descriptor_set(pool, self.descriptor_set);
        }
        if !self.view.is_null() {
            device.destroy_texture_view(self.view);
        }
        if !self.texture.is_null() {
            device.destroy_texture(self.texture);
        }
        if !self.memory.is_null() {
            device.free_memory(self.memory);
        }
        *self = Self::default();
    }
}

/// Descriptor sets by texture id. Ids start at 1 and only go up.
#[derive(Debug, Default)]
pub(crate) struct TextureRegistry {
    sets: HashMap<TextureId, DescriptorSet>,
    last_id: u64,
}

impl TextureRegistry {
    pub fn insert(&mut self, set: DescriptorSet) -> TextureId {
        self.last_id += 1;
        let id = TextureId(self.last_id);
        self.sets.insert(id, set);
        id
    }

    pub fn remove(&mut self, id: TextureId) -> Option<DescriptorSet> {
        self.sets.remove(&id)
    }

    pub fn get(&self, id: TextureId) -> Option<DescriptorSet> {
        self.sets.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = DescriptorSet> + '_ {
        self.sets.drain().map(|(_, set)| set)
    }
}

impl<D: Device> Renderer<D> {
    /// Make sure the font atlas is on the GPU and up to date.
    ///
    /// Does nothing when the atlas was uploaded and has not been marked
    /// dirty since. Returns whether the atlas is usable.
    pub fn ensure_fonts_texture(&mut self, gui: &mut GuiContext) -> bool {
        if self.fonts.is_some() && !gui.fonts.is_dirty() {
            return true;
        }

        if self.fonts.is_some() {
            log::info!("Font atlas changed, recreating its texture");
            self.destroy_fonts_texture(gui);
        }

        if gui.fonts.width == 0 || gui.fonts.height == 0 {
            log::debug!("Font atlas is empty, nothing to upload");
            gui.fonts.tex_id = TextureId::NONE;
            gui.fonts.clear_dirty();
            return false;
        }

        if !self.create_device_objects() {
            return false;
        }

        let mut resources = FontResources::default();
        if self.build_font_resources(&gui.fonts, &mut resources).is_none() {
            // Keep the atlas dirty so the next frame tries again
            resources.release(&*self.ctx.device, self.objects.descriptor_pool);
            gui.fonts.tex_id = TextureId::NONE;
            return false;
        }

        let id = self.textures.insert(resources.descriptor_set);
        resources.id = id;
        gui.fonts.tex_id = id;
        gui.fonts.clear_dirty();
        self.fonts = Some(resources);

        log::info!(
            "Uploaded {}x{} font atlas as texture {:#x}",
            gui.fonts.width,
            gui.fonts.height,
            id.0
        );
        true
    }

    /// Upload the font atlas again, even if it is up to date.
    pub fn create_fonts_texture(&mut self, gui: &mut GuiContext) -> bool {
        gui.fonts.mark_dirty();
        self.ensure_fonts_texture(gui)
    }

    /// Release the font atlas texture after the queue went idle.
    pub fn destroy_fonts_texture(&mut self, gui: &mut GuiContext) {
        if self.fonts.is_none() {
            return;
        }

        self.ctx
            .check(self.ctx.device.wait_for_idle(self.ctx.queue));
        if let Some(id) = self.release_fonts() {
            if gui.fonts.tex_id == id {
                gui.fonts.tex_id = TextureId::NONE;
            }
        }
    }

    /// Release font resources without waiting; returns the id they had.
    pub(crate) fn release_fonts(&mut self) -> Option<TextureId> {
        let mut resources = self.fonts.take()?;
        let id = resources.id;
        self.textures.remove(id);
        resources.release(&*self.ctx.device, self.objects.descriptor_pool);
        Some(id)
    }

    fn build_font_resources(&self, atlas: &FontAtlas, res: &mut FontResources) -> Option<()> {
        let ctx = &self.ctx;
        let device = &*ctx.device;
        let format = Format::Rgba8Unorm;

        res.texture = ctx.check(device.create_texture(&TextureDesc {
            width: atlas.width,
            height: atlas.height,
            mip_num: 1,
            format,
        }))?;
        res.memory = ctx.check(
            device.allocate_and_bind_memory(MemoryLocation::Device, Resource::Texture(res.texture)),
        )?;
        res.view = ctx.check(device.create_texture_view(&TextureViewDesc {
            texture: res.texture,
            format,
        }))?;
        ctx.check(device.upload_texture(
            ctx.queue,
            &TextureUploadDesc {
                texture: res.texture,
                width: atlas.width,
                height: atlas.height,
                format,
                pixels: &atlas.pixels,
            },
        ))?;
        res.descriptor_set = ctx.check(device.allocate_descriptor_set(
            self.objects.descriptor_pool,
            self.objects.layout,
            0,
        ))?;
        device.update_descriptor_set(
            res.descriptor_set,
            &DescriptorSetUpdate {
                texture_view: res.view,
                sampler: self.objects.sampler,
            },
        );
        Some(())
    }

    /// Make a caller-owned texture view drawable by the GUI.
    pub fn register_texture(&mut self, view: TextureView) -> Option<TextureId> {
        if !self.create_device_objects() {
            return None;
        }

        let set = self.ctx.check(self.ctx.device.allocate_descriptor_set(
            self.objects.descriptor_pool,
            self.objects.layout,
            0,
        ))?;
        self.ctx.device.update_descriptor_set(
            set,
            &DescriptorSetUpdate {
                texture_view: view,
                sampler: self.objects.sampler,
            },
        );

        let id = self.textures.insert(set);
        log::debug!("Registered texture view {:#x} as {:#x}", view.0, id.0);
        Some(id)
    }

    /// Forget a texture registered with [`Renderer::register_texture`].
    pub fn unregister_texture(&mut self, id: TextureId) {
        if self.fonts.is_some_and(|fonts| fonts.id == id) {
            log::warn!("The font atlas texture is owned by the renderer; not unregistering it");
            return;
        }
        match self.textures.remove(id) {
            Some(set) => self
                .ctx
                .device
                .free_descriptor_set(self.objects.descriptor_pool, set),
            None => log::warn!("Texture {:#x} is not registered", id.0),
        }
    }

    pub fn is_texture_registered(&self, id: TextureId) -> bool {
        self.textures.get(id).is_some()
    }

    /// Descriptor set a registered texture id resolves to.
    pub fn texture_descriptor_set(&self, id: TextureId) -> Option<DescriptorSet> {
        self.textures.get(id)
    }
}
