//! DateTime overlay item (spec 4.10): a two-line wall-clock stamp, redrawn
//! at most once per second.

use super::{round_up_128, DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::Rectangle;
use cairo::{Context, Format, ImageSurface};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct DateTimeItem {
    surface_id: u64,
    font_size: u32,
    item_w: u32,
    item_h: u32,
    active: bool,
    dirty: bool,
    last_second: u64,
    surface: Option<ImageSurface>,
}

impl DateTimeItem {
    pub fn new(surface_id: u64, font_size: u32, item_w: u32, item_h: u32) -> Self {
        Self {
            surface_id,
            font_size,
            item_w,
            item_h,
            active: true,
            dirty: true,
            last_second: 0,
            surface: None,
        }
    }

    fn offscreen_size(&self) -> (u32, u32) {
        let w = round_up_128(self.font_size * 6);
        let ratio = self.item_h.max(1) as f64 / self.item_w.max(1) as f64;
        let h = ((w as f64 * ratio) as u32).max(self.font_size * 2);
        (w, h)
    }

    fn current_second(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn render(&self, now_secs: u64) -> ConverterResult<ImageSurface> {
        let (w, h) = self.offscreen_size();
        let surface = ImageSurface::create(Format::ARgb32, w as i32, h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        let cr = Context::new(&surface)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;

        cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
        let _ = cr.paint();

        cr.set_source_rgba(1.0, 1.0, 1.0, 1.0);
        cr.select_font_face("sans-serif", cairo::FontSlant::Normal, cairo::FontWeight::Normal);
        cr.set_font_size(self.font_size as f64);

        let date_label = format_date(now_secs);
        let time_label = format_time(now_secs);

        center_text(&cr, &date_label, w as f64, h as f64 * 0.4);
        center_text(&cr, &time_label, w as f64, h as f64 * 0.8);

        Ok(surface)
    }
}

fn format_date(epoch_secs: u64) -> String {
    let days = epoch_secs / 86400;
    format!("day {days}")
}

fn format_time(epoch_secs: u64) -> String {
    let secs_of_day = epoch_secs % 86400;
    format!("{:02}:{:02}:{:02}", secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60)
}

fn center_text(cr: &Context, text: &str, width: f64, baseline_y: f64) {
    if let Ok(extents) = cr.text_extents(text) {
        let x = (width - extents.width()) / 2.0 - extents.x_bearing();
        cr.move_to(x.max(0.0), baseline_y);
        let _ = cr.show_text(text);
    }
}

impl OverlayItem for DateTimeItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        let now = self.current_second();
        if now == self.last_second && self.surface.is_some() {
            return Ok(());
        }
        self.last_second = now;
        self.dirty = false;
        self.surface = Some(self.render(now)?);
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
        self.dirty = true;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offscreen_height_has_minimum_bound() {
        let item = DateTimeItem::new(1, 10, 1, 1);
        let (_, h) = item.offscreen_size();
        assert!(h >= 20);
    }

    #[test]
    fn repeated_draw_within_same_second_is_skipped() {
        let mut item = DateTimeItem::new(1, 12, 64, 32);
        item.update_and_draw().unwrap();
        item.last_second = item.current_second();
        let surface_ptr_before = item.surface.is_some();
        item.update_and_draw().unwrap();
        assert_eq!(surface_ptr_before, item.surface.is_some());
    }
}
