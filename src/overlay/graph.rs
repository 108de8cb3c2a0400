//! Graph overlay item (spec 4.10): a small vector graph of key points and
//! links, downscaled from item coordinates to the offscreen buffer.

use super::{DrawInfo, OverlayItem};
use crate::error::ConverterResult;
use crate::geometry::{Point, Rectangle};
use cairo::{Context, Format, ImageSurface};

pub const MAX_POINTS: usize = 20;
pub const MAX_LINKS: usize = 40;

#[derive(Debug, Clone, Copy)]
pub struct Link {
    pub from: usize,
    pub to: usize,
}

pub struct GraphItem {
    surface_id: u64,
    points: Vec<Point>,
    links: Vec<Link>,
    item_w: u32,
    item_h: u32,
    offscreen_w: u32,
    offscreen_h: u32,
    active: bool,
    dirty: bool,
    surface: Option<ImageSurface>,
}

impl GraphItem {
    pub fn new(surface_id: u64, item_w: u32, item_h: u32, offscreen_w: u32, offscreen_h: u32) -> Self {
        Self {
            surface_id,
            points: Vec::new(),
            links: Vec::new(),
            item_w,
            item_h,
            offscreen_w,
            offscreen_h,
            active: true,
            dirty: true,
            surface: None,
        }
    }

    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points.into_iter().take(MAX_POINTS).collect();
        self.dirty = true;
    }

    pub fn set_links(&mut self, links: Vec<Link>) {
        self.links = links.into_iter().take(MAX_LINKS).collect();
        self.dirty = true;
    }

    fn downscale_ratio(&self) -> f64 {
        self.item_w.max(1) as f64 / self.offscreen_w.max(1) as f64
    }

    /// Valid points after dropping any with a negative coordinate (spec
    /// 4.10: "ignore points with negative coordinates").
    fn valid_points(&self) -> impl Iterator<Item = (usize, &Point)> {
        self.points.iter().enumerate().filter(|(_, p)| p.x >= 0 && p.y >= 0)
    }
}

impl OverlayItem for GraphItem {
    fn update_and_draw(&mut self) -> ConverterResult<()> {
        if !self.dirty && self.surface.is_some() {
            return Ok(());
        }

        let surface = ImageSurface::create(Format::ARgb32, self.offscreen_w as i32, self.offscreen_h as i32)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo surface create failed: {e}")))?;
        let cr = Context::new(&surface)
            .map_err(|e| crate::error::ConverterError::driver(format!("cairo context create failed: {e}")))?;

        cr.set_source_rgba(0.0, 0.0, 0.0, 0.0);
        let _ = cr.paint();

        let ratio = self.downscale_ratio();
        let scaled: Vec<(usize, f64, f64)> = self
            .valid_points()
            .map(|(i, p)| (i, p.x as f64 / ratio, p.y as f64 / ratio))
            .collect();

        cr.set_source_rgba(0.0, 1.0, 0.0, 1.0);
        cr.set_line_width(1.5);
        for link in &self.links {
            let from = scaled.iter().find(|(i, ..)| *i == link.from);
            let to = scaled.iter().find(|(i, ..)| *i == link.to);
            if let (Some((_, fx, fy)), Some((_, tx, ty))) = (from, to) {
                cr.move_to(*fx, *fy);
                cr.line_to(*tx, *ty);
                let _ = cr.stroke();
            }
        }

        for (_, x, y) in &scaled {
            cr.arc(*x, *y, 2.5, 0.0, std::f64::consts::TAU);
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
    fn negative_coordinate_points_are_filtered() {
        let mut item = GraphItem::new(1, 256, 256, 128, 128);
        item.set_points(vec![Point::new(-1, 5), Point::new(10, 10)]);
        assert_eq!(item.valid_points().count(), 1);
    }

    #[test]
    fn points_beyond_max_are_truncated() {
        let mut item = GraphItem::new(1, 256, 256, 128, 128);
        let many: Vec<Point> = (0..30).map(|i| Point::new(i, i)).collect();
        item.set_points(many);
        assert_eq!(item.points.len(), MAX_POINTS);
    }
}
