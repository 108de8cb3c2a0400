//! StaticImage overlay item (spec 4.10): a caller-supplied ABGR pixel blob,
//! cropped by a source rectangle. Never dirty unless the blob pointer or
//! size changes -- there is no vector redraw here, so `update_and_draw` only
//! checks the change condition.

use super::{DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::Rectangle;

pub struct StaticImageItem {
    surface_id: u64,
    blob: Vec<u8>,
    blob_width: u32,
    blob_height: u32,
    source_rect: Rectangle,
    item_w: u32,
    item_h: u32,
    active: bool,
    dirty: bool,
}

impl StaticImageItem {
    pub fn new(
        surface_id: u64,
        blob: Vec<u8>,
        blob_width: u32,
        blob_height: u32,
        source_rect: Rectangle,
        item_w: u32,
        item_h: u32,
    ) -> Self {
        Self {
            surface_id,
            blob,
            blob_width,
            blob_height,
            source_rect,
            item_w,
            item_h,
            active: true,
            dirty: true,
        }
    }

    /// Replaces the backing blob. Dirty only if the pointer identity (here,
    /// length+content) or dimensions actually changed (spec 4.10: "never
    /// dirty unless blob pointer or size changes").
    pub fn set_blob(&mut self, blob: Vec<u8>, width: u32, height: u32) {
        if width != self.blob_width || height != self.blob_height || blob != self.blob {
            self.blob = blob;
            self.blob_width = width;
            self.blob_height = height;
            self.dirty = true;
        }
    }
}

impl OverlayItem for StaticImageItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        // No rasterization pass: the blob is already pixel data. `dirty`
        // only gates whether downstream consumers need to re-crop/re-upload.
        self.dirty = false;
        Ok(())
    }

    fn get_draw_info(&self, target_w: u32, target_h: u32) -> Vec<DrawInfo> {
        if self.blob.is_empty() {
            return Vec::new();
        }
        vec![DrawInfo {
            surface_id: self.surface_id,
            rect: Rectangle::new(0, 0, target_w.min(self.item_w), target_h.min(self.item_h)),
            cl_kernel_config: None,
        }]
    }

    fn activate(&mut self) {
        self.active = true;
    }

    fn deactivate(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn destroy(&mut self) {
        self.blob.clear();
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_blob_does_not_mark_dirty() {
        let mut item = StaticImageItem::new(1, vec![1, 2, 3], 1, 3, Rectangle::new(0, 0, 1, 3), 16, 16);
        item.update_and_draw().unwrap();
        item.set_blob(vec![1, 2, 3], 1, 3);
        assert!(!item.dirty);
    }

    #[test]
    fn different_blob_marks_dirty() {
        let mut item = StaticImageItem::new(1, vec![1, 2, 3], 1, 3, Rectangle::new(0, 0, 1, 3), 16, 16);
        item.update_and_draw().unwrap();
        item.set_blob(vec![4, 5, 6], 1, 3);
        assert!(item.dirty);
    }
}
