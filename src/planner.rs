//! Transform Planner: decides the ordered chain of sub-operations for one
//! blit, per the eight rules in spec 4.4, applied in exactly this order,
//! each conditional on its predicate. After each step the destination stage
//! becomes the source of the next; a carried rotate/flip is not consumed by
//! an unrelated step.

use crate::compose::{Flip, Rotation};
use crate::format::{FormatFamily, PixelFormat};

/// One planned sub-operation in the transform chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    PrepColorConvertToYuv,
    Downscale,
    Rotate(Rotation),
    Flip(Flip),
    UpscaleForRgbDestination,
    FinalColorConvert,
    UpscaleForNonRgbDestination,
    UnalignedFixupOrNormalize,
}

/// A planned operation, paired with whether it runs in-place on the current
/// stage buffer rather than allocating a fresh destination stage (spec 9:
/// "reified as an explicit 'transfer ownership' step... the planner returns
/// a list of (op, in-place?)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedOp {
    pub op: Op,
    pub in_place: bool,
}

/// Inputs the planner needs to decide the chain for one blit.
pub struct PlanRequest {
    pub src_format: PixelFormat,
    pub dst_format: PixelFormat,
    pub src_width: u32,
    pub src_height: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub rotate: Rotation,
    pub flip: Flip,
    pub normalize: bool,
}

impl PlanRequest {
    fn scale_ratio(&self) -> f64 {
        let src_area = self.src_width as f64 * self.src_height as f64;
        let dst_area = self.dst_width as f64 * self.dst_height as f64;
        if dst_area == 0.0 {
            0.0
        } else {
            src_area / dst_area
        }
    }

    fn is_trivial_copy(&self) -> bool {
        self.src_width == 1
            && self.src_height == 1
            && self.rotate == Rotation::Rotate0
            && self.flip == Flip::None
            && self.src_format == self.dst_format
            && !self.dst_format.is_10bit()
    }

    fn is_downscale(&self) -> bool {
        self.scale_ratio() <= 1.0 || self.is_trivial_copy()
    }

    fn is_upscale(&self) -> bool {
        !self.is_downscale()
    }
}

/// Produces the ordered operation chain for one blit, per spec 4.4.
pub fn plan(req: &PlanRequest) -> Vec<PlannedOp> {
    let mut ops = Vec::new();

    let transform_pending =
        req.is_downscale() || req.is_upscale() || req.rotate != Rotation::Rotate0 || req.flip != Flip::None;

    // 1. Prep color-convert to YUV.
    let prep_convert = transform_pending
        && req.src_format.family() == FormatFamily::Rgb
        && !(req.src_format == req.dst_format);
    if prep_convert {
        ops.push(PlannedOp {
            op: Op::PrepColorConvertToYuv,
            in_place: false,
        });
    }

    // Effective source format after an optional prep conversion: NV12.
    let staged_format = if prep_convert { PixelFormat::Nv12 } else { req.src_format };

    // 2. Downscale.
    if req.is_downscale() && (req.src_width != req.dst_width || req.src_height != req.dst_height) {
        ops.push(PlannedOp {
            op: Op::Downscale,
            in_place: false,
        });
    }

    // 3. Rotate.
    if req.rotate != Rotation::Rotate0 {
        ops.push(PlannedOp {
            op: Op::Rotate(req.rotate),
            in_place: false,
        });
    }

    // 4. Flip -- in-place when a resize is also pending and we already have
    // a staged intermediate to flip directly.
    if req.flip != Flip::None {
        let resize_pending = req.is_upscale() || (req.is_downscale() && req.src_width != req.dst_width);
        let already_staged = prep_convert || req.rotate != Rotation::Rotate0;
        ops.push(PlannedOp {
            op: Op::Flip(req.flip),
            in_place: resize_pending && already_staged,
        });
    }

    // 5. Upscale when destination is RGB -- runs before the final convert so
    // color conversion happens at final resolution.
    if req.is_upscale() && req.dst_format.family() == FormatFamily::Rgb {
        ops.push(PlannedOp {
            op: Op::UpscaleForRgbDestination,
            in_place: false,
        });
    }

    // 6. Final color-convert.
    if staged_format != req.dst_format {
        ops.push(PlannedOp {
            op: Op::FinalColorConvert,
            in_place: false,
        });
    }

    // 7. Upscale when destination is not RGB.
    if req.is_upscale() && req.dst_format.family() != FormatFamily::Rgb {
        ops.push(PlannedOp {
            op: Op::UpscaleForNonRgbDestination,
            in_place: false,
        });
    }

    // 8. Unaligned fix-up or normalization.
    let unaligned = req.dst_width % 8 != 0;
    let needs_fixup = (req.dst_format.family() == FormatFamily::Rgb
        || req.dst_format.family() == FormatFamily::Gray)
        && (unaligned || req.normalize);
    if needs_fixup {
        ops.push(PlannedOp {
            op: Op::UnalignedFixupOrNormalize,
            in_place: false,
        });
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PlanRequest {
        PlanRequest {
            src_format: PixelFormat::Nv12,
            dst_format: PixelFormat::Nv12,
            src_width: 128,
            src_height: 128,
            dst_width: 128,
            dst_height: 128,
            rotate: Rotation::Rotate0,
            flip: Flip::None,
            normalize: false,
        }
    }

    #[test]
    fn identity_same_size_same_format_plans_no_ops() {
        let ops = plan(&base());
        assert!(ops.is_empty());
    }

    #[test]
    fn rgb_source_with_rotation_gets_yuv_prep_step_first() {
        let mut req = base();
        req.src_format = PixelFormat::Rgba8888;
        req.dst_format = PixelFormat::Nv12;
        req.rotate = Rotation::Rotate90;
        let ops = plan(&req);
        assert_eq!(ops[0].op, Op::PrepColorConvertToYuv);
    }

    #[test]
    fn downscale_detected_for_smaller_destination() {
        let mut req = base();
        req.dst_width = 64;
        req.dst_height = 64;
        let ops = plan(&req);
        assert!(ops.iter().any(|o| o.op == Op::Downscale));
    }

    #[test]
    fn upscale_for_rgb_destination_precedes_final_convert() {
        let mut req = base();
        req.dst_format = PixelFormat::Rgba8888;
        req.dst_width = 256;
        req.dst_height = 256;
        let ops = plan(&req);
        let upscale_idx = ops.iter().position(|o| o.op == Op::UpscaleForRgbDestination).unwrap();
        let convert_idx = ops.iter().position(|o| o.op == Op::FinalColorConvert).unwrap();
        assert!(upscale_idx < convert_idx);
    }

    #[test]
    fn upscale_for_non_rgb_destination_follows_final_convert() {
        let mut req = base();
        req.src_format = PixelFormat::Nv21;
        req.dst_format = PixelFormat::Nv12;
        req.dst_width = 256;
        req.dst_height = 256;
        let ops = plan(&req);
        let upscale_idx = ops.iter().position(|o| o.op == Op::UpscaleForNonRgbDestination).unwrap();
        let convert_idx = ops.iter().position(|o| o.op == Op::FinalColorConvert).unwrap();
        assert!(convert_idx < upscale_idx);
    }

    #[test]
    fn unaligned_rgb_width_triggers_fixup() {
        let mut req = base();
        req.dst_format = PixelFormat::Rgba8888;
        req.src_format = PixelFormat::Rgba8888;
        req.dst_width = 130; // not a multiple of 8
        let ops = plan(&req);
        assert!(ops.iter().any(|o| o.op == Op::UnalignedFixupOrNormalize));
    }

    #[test]
    fn normalization_triggers_fixup_even_when_aligned() {
        let mut req = base();
        req.dst_format = PixelFormat::Rgba8888;
        req.src_format = PixelFormat::Rgba8888;
        req.normalize = true;
        let ops = plan(&req);
        assert!(ops.iter().any(|o| o.op == Op::UnalignedFixupOrNormalize));
    }

    #[test]
    fn trivial_one_by_one_copy_counts_as_downscale_predicate() {
        let mut req = base();
        req.src_width = 1;
        req.src_height = 1;
        req.dst_width = 1;
        req.dst_height = 1;
        assert!(req.is_downscale());
    }
}
