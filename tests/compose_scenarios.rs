//! Integration tests exercising full `compose()` calls against the OpenCV
//! reference backend, covering the scenarios from the engine's testable
//! properties: solid fill, identity copy, rotate-90, two-blit z-order, and
//! fence lifecycle.

use vconv_engine::prelude::*;

fn nv12_planes(width: u32, height: u32) -> Vec<Plane> {
    vec![
        Plane::new(0, width, width, height),
        Plane::new((width * height) as usize, width, width, height.div_ceil(2)),
    ]
}

fn nv12_bytes(width: u32, height: u32) -> Vec<u8> {
    vec![0u8; (width * height * 3 / 2) as usize]
}

#[test]
fn solid_color_background_fill_matches_bt601_constants() {
    let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
    let (width, height) = (32u32, 32u32);
    let mut out_bytes = nv12_bytes(width, height);
    let out_frame = VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);

    let mut composition = Composition::new(out_frame);
    composition.clear_background = true;
    composition.bgcolor = 0x00FF00FF; // green, RRGGBBAA

    engine.compose(std::slice::from_mut(&mut composition)).unwrap();

    let (y, cb, cr) = rgb_to_ycbcr(0x00, 0xFF, 0x00);
    let luma_size = (width * height) as usize;
    assert!(out_bytes[..luma_size].iter().all(|&v| v == y));
    let chroma = &out_bytes[luma_size..];
    assert!(chroma.iter().step_by(2).all(|&v| v == cb));
    assert!(chroma.iter().skip(1).step_by(2).all(|&v| v == cr));
}

#[test]
fn identity_full_frame_copy_is_byte_exact() {
    let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
    let (width, height) = (24u32, 24u32);
    let mut src_bytes = nv12_bytes(width, height);
    for (i, v) in src_bytes.iter_mut().enumerate() {
        *v = (i % 200) as u8;
    }
    let expected = src_bytes.clone();
    let src_frame = VideoFrame::from_bytes(PixelFormat::Nv12, width, height, nv12_planes(width, height), &src_bytes, None);

    let mut out_bytes = nv12_bytes(width, height);
    let out_frame = VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
    let mut composition = Composition::new(out_frame);
    composition.blits.push(Blit::new(src_frame));

    engine.compose(std::slice::from_mut(&mut composition)).unwrap();

    assert_eq!(out_bytes, expected);
}

#[test]
fn rotate_90_swaps_dimensions_and_transposes_luma() {
    let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
    let (src_w, src_h) = (16u32, 32u32);
    let mut src_bytes = nv12_bytes(src_w, src_h);
    for y in 0..src_h {
        for x in 0..src_w {
            src_bytes[(y * src_w + x) as usize] = y as u8;
        }
    }
    let src_frame = VideoFrame::from_bytes(PixelFormat::Nv12, src_w, src_h, nv12_planes(src_w, src_h), &src_bytes, None);

    let (dst_w, dst_h) = (src_h, src_w);
    let mut out_bytes = nv12_bytes(dst_w, dst_h);
    let out_frame = VideoFrame::from_bytes_mut(PixelFormat::Nv12, dst_w, dst_h, nv12_planes(dst_w, dst_h), &mut out_bytes, None);
    let mut composition = Composition::new(out_frame);
    let mut blit = Blit::new(src_frame);
    blit.rotate = Rotation::Rotate90;
    composition.blits.push(blit);

    engine.compose(std::slice::from_mut(&mut composition)).unwrap();

    for y in 0..dst_h as usize {
        for x in 0..dst_w as usize {
            assert_eq!(out_bytes[y * dst_w as usize + x], x as u8, "mismatch at ({x},{y})");
        }
    }
}

#[test]
fn two_blit_composition_paints_in_submitted_order() {
    let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
    let (width, height) = (16u32, 16u32);

    let mut first_bytes = nv12_bytes(width, height);
    first_bytes[..(width * height) as usize].fill(50);
    let first = VideoFrame::from_bytes(PixelFormat::Nv12, width, height, nv12_planes(width, height), &first_bytes, None);

    let mut second_bytes = nv12_bytes(width, height);
    second_bytes[..(width * height) as usize].fill(200);
    let second = VideoFrame::from_bytes(PixelFormat::Nv12, width, height, nv12_planes(width, height), &second_bytes, None);

    let mut out_bytes = nv12_bytes(width, height);
    let out_frame = VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
    let mut composition = Composition::new(out_frame);
    composition.blits.push(Blit::new(first));
    composition.blits.push(Blit::new(second));

    engine.compose(std::slice::from_mut(&mut composition)).unwrap();

    // Index 1 (submitted second) is painted last, so it wins (spec: "Z-order").
    assert!(out_bytes[..(width * height) as usize].iter().all(|&v| v == 200));
}

#[test]
fn async_fence_signals_and_flush_resets_state() {
    let engine = ConverterEngine::new(BackendKind::OpenCv, EngineSettings::default());
    let (width, height) = (8u32, 8u32);
    let mut out_bytes = nv12_bytes(width, height);
    let out_frame = VideoFrame::from_bytes_mut(PixelFormat::Nv12, width, height, nv12_planes(width, height), &mut out_bytes, None);
    let mut composition = Composition::new(out_frame);

    let mut fence_slot: Option<Fence> = None;
    engine
        .compose_async(std::slice::from_mut(&mut composition), &mut fence_slot)
        .unwrap();
    let fence = fence_slot.expect("async compose must issue a fence");
    engine.wait_fence(fence).unwrap();

    engine.flush();
    assert_eq!(engine.state(), EngineState::Initialized);
}
