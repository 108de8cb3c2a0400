//! BoundingBox overlay item (spec 4.10): an outline rectangle plus a label,
//! rendered to two separate offscreen surfaces.

use super::{round_up_128, DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::Rectangle;
use cairo::{Context, Format, ImageSurface};

/// Percentage of the item width the label rectangle occupies (spec 4.10:
/// "sized to target_w * kTextPercent / 100").
const TEXT_PERCENT: u32 = 30;

pub struct BoundingBoxItem {
    outline_surface_id: u64,
    label_surface_id: u64,
    label: String,
    item_w: u32,
    item_h: u32,
    stroke_width_request: u32,
    active: bool,
    dirty: bool,
    outline_surface: Option<ImageSurface>,
    label_surface: Option<ImageSurface>,
}

impl BoundingBoxItem {
    pub fn new(
        outline_surface_id: u64,
        label_surface_id: u64,
        label: String,
        item_w: u32,
        item_h: u32,
        stroke_width_request: u32,
    ) -> Self {
        Self {
            outline_surface_id,
            label_surface_id,
            label,
            item_w,
            item_h,
            stroke_width_request,
            active: true,
            dirty: true,
            outline_surface: None,
            label_surface: None,
        }
    }

    fn offscreen_box_width(&self) -> u32 {
        round_up_128(self.item_w)
    }

    fn effective_stroke_width(&self, offscreen_w: u32, base_stroke: f64) -> f64 {
        let scaled = (base_stroke * offscreen_w as f64 / self.item_w.max(1) as f64).ceil();
        (self.stroke_width_request as f64).max(scaled)
    }

    fn label_rect(&self, target_w: u32) -> Rectangle {
        let w = target_w * TEXT_PERCENT / 100;
        Rectangle::new(0, 0, w, (self.item_h / 4).max(12))
    }
}

impl OverlayItem for BoundingBoxItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        if !self.dirty && self.outline_surface.is_some() {
            return Ok(());
        }

        let box_w = self.offscreen_box_width();
        let box_h = round_up_128(self.item_h).max(128);
        let stroke = self.effective_stroke_width(box_w, 2.0);

        let outline = ImageSurface::create(Format::ARgb32, box_w as i32, box_h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        {
            let cr = Context::new(&outline)
                .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;
            cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
            let _ = cr.paint();
            cr.set_source_rgba(1.0, 0.0, 0.0, 1.0);
            cr.set_line_width(stroke);
            cr.rectangle(stroke / 2.0, stroke / 2.0, box_w as f64 - stroke, box_h as f64 - stroke);
            let _ = cr.stroke();
        }

        let label_w = round_up_128((self.item_w * TEXT_PERCENT / 100).max(128));
        let label_h = 64u32;
        let label = ImageSurface::create(Format::ARgb32, label_w as i32, label_h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        {
            let cr = Context::new(&label)
                .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;
            cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
            let _ = cr.paint();
            cr.set_source_rgba(1.0, 1.0, 0.0, 1.0);
            cr.select_font_face("sans-serif", cairo::FontSlant::Normal, cairo::FontWeight::Bold);
            cr.set_font_size(16.0);
            cr.move_to(4.0, label_h as f64 * 0.7);
            let _ = cr.show_text(&self.label);
        }

        self.outline_surface = Some(outline);
        self.label_surface = Some(label);
        self.dirty = false;
        Ok(())
    }

    fn get_draw_info(&self, target_w: u32, target_h: u32) -> Vec<DrawInfo> {
        if self.outline_surface.is_none() {
            return Vec::new();
        }
        vec![
            DrawInfo {
                surface_id: self.outline_surface_id,
                rect: Rectangle::new(0, 0, target_w, target_h),
                cl_kernel_config: None,
            },
            DrawInfo {
                surface_id: self.label_surface_id,
                rect: self.label_rect(target_w),
                cl_kernel_config: None,
            },
        ]
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
        self.outline_surface = None;
        self.label_surface = None;
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stroke_width_respects_user_request_floor() {
        let item = BoundingBoxItem::new(1, 2, "x".into(), 100, 100, 10);
        let stroke = item.effective_stroke_width(128, 2.0);
        assert!(stroke >= 10.0);
    }

    #[test]
    fn label_rect_is_text_percent_of_target_width() {
        let item = BoundingBoxItem::new(1, 2, "x".into(), 100, 100, 1);
        let rect = item.label_rect(200);
        assert_eq!(rect.w, 60);
    }

    #[test]
    fn two_draw_infos_emitted_after_draw() {
        let mut item = BoundingBoxItem::new(1, 2, "label".into(), 64, 64, 2);
        item.update_and_draw().unwrap();
        assert_eq!(item.get_draw_info(64, 64).len(), 2);
    }
}
