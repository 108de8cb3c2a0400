//! UserText overlay item (spec 4.10): multi-line caller-supplied text,
//! split on `\n`.

use super::{round_up_128, DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::Rectangle;
use cairo::{Context, Format, ImageSurface};

pub struct UserTextItem {
    surface_id: u64,
    text: String,
    font_size: u32,
    item_w: u32,
    item_h: u32,
    active: bool,
    dirty: bool,
    surface: Option<ImageSurface>,
}

impl UserTextItem {
    pub fn new(surface_id: u64, text: String, font_size: u32, item_w: u32, item_h: u32) -> Self {
        Self {
            surface_id,
            text,
            font_size,
            item_w,
            item_h,
            active: true,
            dirty: true,
            surface: None,
        }
    }

    pub fn set_text(&mut self, text: String) {
        self.text = text;
        self.dirty = true;
    }

    fn offscreen_width(&self) -> u32 {
        round_up_128((self.font_size * 4).max(self.item_w))
    }

    fn lines(&self) -> Vec<&str> {
        self.text.split('\n').collect()
    }

    fn offscreen_height(&self) -> u32 {
        (self.lines().len() as u32 * (self.font_size + self.font_size / 4)).max(self.font_size * 2)
    }
}

impl OverlayItem for UserTextItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        if !self.dirty && self.surface.is_some() {
            return Ok(());
        }
        let w = self.offscreen_width();
        let h = self.offscreen_height();
        let surface = ImageSurface::create(Format::ARgb32, w as i32, h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        let cr = Context::new(&surface)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;

        cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
        let _ = cr.paint();
        cr.set_source_rgba(1.0, 1.0, 1.0, 1.0);
        cr.select_font_face("sans-serif", cairo::FontSlant::Normal, cairo::FontWeight::Normal);
        cr.set_font_size(self.font_size as f64);

        let line_height = (self.font_size + self.font_size / 4) as f64;
        for (i, line) in self.lines().iter().enumerate() {
            cr.move_to(2.0, line_height * (i as f64 + 1.0));
            let _ = cr.show_text(line);
        }

        self.surface = Some(surface);
        self.dirty = false;
        Ok(())
    }

    fn get_draw_info(&self, target_w: u32, target_h: u32) -> Vec<DrawInfo> {
        if self.surface.is_none() {
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
        self.surface = None;
        self.active = false;
    }
}
