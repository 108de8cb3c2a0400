//! PrivacyMask overlay item (spec 4.10): rectangle, circle, or polygon,
//! each with a normal and an inverse ("punch out the shape from a filled
//! surface") variant using even-odd fill.

use super::{round_up_128, DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::{Point, Rectangle};
use cairo::{Context, Format, ImageSurface};

/// Offscreen buffer cap for privacy masks (spec 4.10: "min(item_w,
/// kMaskBoxBufWidth) rounded up to 128").
const MASK_BOX_BUF_WIDTH: u32 = 1024;

#[derive(Debug, Clone)]
pub enum MaskShape {
    Rectangle,
    Circle { center: Point, radius: f64 },
    Polygon { points: Vec<Point> },
}

pub struct PrivacyMaskItem {
    surface_id: u64,
    shape: MaskShape,
    inverse: bool,
    item_w: u32,
    item_h: u32,
    active: bool,
    dirty: bool,
    surface: Option<ImageSurface>,
}

impl PrivacyMaskItem {
    pub fn new(surface_id: u64, shape: MaskShape, inverse: bool, item_w: u32, item_h: u32) -> Self {
        Self {
            surface_id,
            shape,
            inverse,
            item_w,
            item_h,
            active: true,
            dirty: true,
            surface: None,
        }
    }

    fn offscreen_width(&self) -> u32 {
        round_up_128(self.item_w.min(MASK_BOX_BUF_WIDTH))
    }

    fn trace_shape(&self, cr: &Context, w: f64, h: f64) {
        match &self.shape {
            MaskShape::Rectangle => {
                cr.rectangle(w * 0.1, h * 0.1, w * 0.8, h * 0.8);
            }
            MaskShape::Circle { center, radius } => {
                cr.arc(center.x as f64, center.y as f64, *radius, 0.0, std::f64::consts::TAU);
            }
            MaskShape::Polygon { points } => {
                if let Some(first) = points.first() {
                    cr.move_to(first.x as f64, first.y as f64);
                    for p in &points[1..] {
                        cr.line_to(p.x as f64, p.y as f64);
                    }
                    cr.close_path();
                }
            }
        }
    }
}

impl OverlayItem for PrivacyMaskItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        if !self.dirty && self.surface.is_some() {
            return Ok(());
        }

        let w = self.offscreen_width();
        let ratio = self.item_h.max(1) as f64 / self.item_w.max(1) as f64;
        let h = (w as f64 * ratio).max(128.0) as u32;

        let surface = ImageSurface::create(Format::ARgb32, w as i32, h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        let cr = Context::new(&surface)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;

        cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
        let _ = cr.paint();
        cr.set_source_rgba(0.0, 0.0, 0.0, 1.0);

        if self.inverse {
            cr.set_fill_rule(cairo::FillRule::EvenOdd);
            cr.rectangle(0.0, 0.0, w as f64, h as f64);
            self.trace_shape(&cr, w as f64, h as f64);
            let _ = cr.fill();
        } else {
            self.trace_shape(&cr, w as f64, h as f64);
            let _ = cr.fill();
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offscreen_width_caps_at_mask_box_buf_width() {
        let item = PrivacyMaskItem::new(1, MaskShape::Rectangle, false, 4000, 2000);
        assert_eq!(item.offscreen_width(), MASK_BOX_BUF_WIDTH);
    }

    #[test]
    fn small_item_rounds_up_to_128() {
        let item = PrivacyMaskItem::new(1, MaskShape::Rectangle, false, 50, 50);
        assert_eq!(item.offscreen_width(), 128);
    }
}
