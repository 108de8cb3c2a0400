//! Blit/Composition request types and the wire-level format-mode flags.

use crate::frame::VideoFrame;
use crate::geometry::{Quadrilateral, Rectangle};
use bitflags::bitflags;

/// Rotation applied to a blit's source before it lands in the destination.
/// Closed set mirroring `GstVideoConvRotate`: only these four values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Whether this rotation swaps width/height of the destination.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// Mirroring applied to a blit's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Flip {
    pub fn horizontal(self) -> bool {
        matches!(self, Flip::Horizontal | Flip::Both)
    }

    pub fn vertical(self) -> bool {
        matches!(self, Flip::Vertical | Flip::Both)
    }
}

/// Data type of output samples, for the ML-tensor-shaped output modes.
/// Only `U8` is ever produced by a backend in this crate; the others are
/// carried through as tags (spec 6: "reserved for ML tensor outputs").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    #[default]
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F16,
    F32,
}

bitflags! {
    /// Bitwise configuration mask for a [`Blit`], mirroring
    /// `GST_VCE_MASK_*`: distinguishes "field explicitly set" from
    /// "field defaulted", which the Transform Planner needs to tell a
    /// zero-sized destination rect apart from an unset one.
    pub struct BlitMask: u32 {
        const SOURCE          = 1 << 0;
        const DESTINATION      = 1 << 1;
        const FLIP_VERTICAL    = 1 << 2;
        const FLIP_HORIZONTAL  = 1 << 3;
        const ROTATION         = 1 << 4;
    }
}

bitflags! {
    /// Wire-level format-mode flags (spec 6), bit-for-bit as specified.
    pub struct FormatFlags: u64 {
        const FLIP_H          = 1 << 0;
        const FLIP_V          = 1 << 1;
        const ROTATE_MASK     = 0b11 << 2;
        const ROTATE_90CW     = 1 << 2;
        const ROTATE_180      = 2 << 2;
        const ROTATE_90CCW    = 3 << 2;
        const UBWC_FORMAT     = 1 << 6;
        const CLEAR_BACKGROUND = 1 << 7;
        const F16             = 1 << 8;
        const F32             = 2 << 8;
        const I32             = 3 << 8;
        const U32             = 4 << 8;
    }
}

impl FormatFlags {
    pub fn rotation(self) -> Rotation {
        match (self & FormatFlags::ROTATE_MASK).bits() {
            v if v == FormatFlags::ROTATE_90CW.bits() => Rotation::Rotate90,
            v if v == FormatFlags::ROTATE_180.bits() => Rotation::Rotate180,
            v if v == FormatFlags::ROTATE_90CCW.bits() => Rotation::Rotate270,
            _ => Rotation::Rotate0,
        }
    }

    pub fn flip(self) -> Flip {
        match (self.contains(FormatFlags::FLIP_H), self.contains(FormatFlags::FLIP_V)) {
            (true, true) => Flip::Both,
            (true, false) => Flip::Horizontal,
            (false, true) => Flip::Vertical,
            (false, false) => Flip::None,
        }
    }
}

/// One source quadrilateral paired with a destination rectangle within a
/// single [`Blit`].
#[derive(Debug, Clone, Copy)]
pub struct BlitRegion {
    pub source: Quadrilateral,
    pub destination: Rectangle,
}

/// One input to a composition: a source frame, a list of region mappings,
/// and the per-blit transform/alpha configuration.
///
/// `regions.is_empty()` means "entire source to entire destination" (spec 3:
/// `n_regions = 0`).
pub struct Blit<'a> {
    pub frame: VideoFrame<'a>,
    pub regions: Vec<BlitRegion>,
    pub alpha: u8,
    pub rotate: Rotation,
    pub flip: Flip,
    pub mask: BlitMask,
    /// `true` for special-mode outputs such as float16/float32/UBWC; carried
    /// through to the backend but never altering blit geometry.
    pub special_mode: bool,
}

impl<'a> Blit<'a> {
    pub fn new(frame: VideoFrame<'a>) -> Self {
        Self {
            frame,
            regions: Vec::new(),
            alpha: 255,
            rotate: Rotation::Rotate0,
            flip: Flip::None,
            mask: BlitMask::empty(),
            special_mode: false,
        }
    }

    pub fn is_full_frame(&self) -> bool {
        self.regions.is_empty()
    }
}

/// An ordered set of blits applied to one output frame. Index 0 is painted
/// first (spec 3, "Z-order").
pub struct Composition<'a> {
    pub blits: Vec<Blit<'a>>,
    pub output: VideoFrame<'a>,
    /// Background color, packed per the backend's documented convention
    /// (`0xRRGGBBAA` for overlay/OpenCV, `0xBBGGRRAA` for GLES).
    pub bgcolor: u32,
    pub clear_background: bool,
    pub offsets: [f64; 4],
    pub scales: [f64; 4],
    pub datatype: SampleType,
}

impl<'a> Composition<'a> {
    pub fn new(output: VideoFrame<'a>) -> Self {
        Self {
            blits: Vec::new(),
            output,
            bgcolor: 0,
            clear_background: false,
            offsets: [0.0; 4],
            scales: [1.0; 4],
            datatype: SampleType::U8,
        }
    }

    pub fn needs_normalization(&self) -> bool {
        self.offsets != [0.0; 4] || self.scales != [1.0; 4]
    }
}
