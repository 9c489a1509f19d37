use std::path::Path;

use image::{Rgba, RgbaImage};
use watermark_probe::codec::{decode, encode};
use watermark_probe::{
    Anchor, Error, FontSize, ImageWatermark, Layout, MatchOptions, Metric, TextWatermark,
    WatermarkEngine,
};

/// Deterministic pseudo-random image so correlation peaks are unambiguous.
fn noise(width: u32, height: u32, seed: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let mut h = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ seed;
        h ^= h >> 13;
        h = h.wrapping_mul(0x5bd1_e995);
        h ^= h >> 15;
        let b = h.to_le_bytes();
        Rgba([b[0], b[1], b[2], 255])
    })
}

fn write_png(img: &RgbaImage, path: &Path) {
    encode(img, path, 95).unwrap();
}

#[test]
fn text_watermark_file_matches_in_memory_result() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    let output = dir.path().join("out.png");
    let base = noise(160, 120, 1);
    write_png(&base, &input);

    let engine = WatermarkEngine::default();
    let wm = TextWatermark {
        text: "Probe".to_string(),
        opacity: 0.6,
        ..TextWatermark::default()
    };
    let written = engine.embed_text_watermark(&input, &output, &wm).unwrap();
    assert_eq!(written, output);

    let mut expected = base.clone();
    engine.apply_text(&mut expected, &wm).unwrap();
    let actual = decode(&output).unwrap();
    assert_eq!(actual, expected);
    assert_ne!(actual, base);
}

#[test]
fn zero_opacity_leaves_png_pixels_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    let base = noise(90, 70, 2);
    write_png(&base, &input);

    let wm = TextWatermark {
        opacity: 0.0,
        layout: Layout::Tiled,
        margin: 4,
        ..TextWatermark::default()
    };
    WatermarkEngine::default()
        .embed_text_watermark(&input, &output, &wm)
        .unwrap();
    assert_eq!(decode(&output).unwrap(), base);
}

#[test]
fn jpeg_output_is_opaque_and_keeps_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.jpg");
    let base = RgbaImage::from_pixel(64, 48, Rgba([30, 60, 90, 128]));
    write_png(&base, &input);

    WatermarkEngine::default()
        .embed_text_watermark(&input, &output, &TextWatermark::default())
        .unwrap();
    let out = decode(&output).unwrap();
    assert_eq!(out.dimensions(), (64, 48));
    assert!(out.pixels().all(|p| p[3] == 255));
}

#[test]
fn output_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("nested").join("deeper").join("out.png");
    write_png(&noise(40, 40, 3), &input);

    WatermarkEngine::default()
        .embed_text_watermark(&input, &output, &TextWatermark::default())
        .unwrap();
    assert!(output.exists());
}

#[test]
fn image_watermark_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let logo = dir.path().join("logo.png");
    write_png(&noise(300, 200, 4), &input);
    let mark = RgbaImage::from_fn(50, 30, |x, _| Rgba([200, 10, 10, if x < 25 { 255 } else { 0 }]));
    write_png(&mark, &logo);

    let engine = WatermarkEngine::default();
    let wm = ImageWatermark {
        layout: Layout::Tiled,
        ..ImageWatermark::default()
    };
    let first = dir.path().join("a.png");
    let second = dir.path().join("b.png");
    engine.embed_image_watermark(&input, &logo, &first, &wm).unwrap();
    engine.embed_image_watermark(&input, &logo, &second, &wm).unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
}

#[test]
fn transparent_watermark_pixels_leave_background_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let logo = dir.path().join("logo.png");
    let output = dir.path().join("out.png");
    let base = noise(100, 100, 5);
    write_png(&base, &input);
    write_png(&RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 0])), &logo);

    let wm = ImageWatermark {
        scale: 0.2,
        opacity: 1.0,
        layout: Layout::Anchored(Anchor::Center),
        margin: 0,
    };
    WatermarkEngine::default()
        .embed_image_watermark(&input, &logo, &output, &wm)
        .unwrap();
    assert_eq!(decode(&output).unwrap(), base);
}

#[test]
fn invalid_options_fail_before_reading_input() {
    let engine = WatermarkEngine::default();
    let missing = Path::new("/no/such/input.png");
    let out = Path::new("/no/such/output.png");

    let wm = TextWatermark {
        opacity: -0.5,
        ..TextWatermark::default()
    };
    assert!(matches!(
        engine.embed_text_watermark(missing, out, &wm),
        Err(Error::InvalidArgument(_))
    ));

    let wm = ImageWatermark {
        scale: 2.0,
        ..ImageWatermark::default()
    };
    assert!(matches!(
        engine.embed_image_watermark(missing, missing, out, &wm),
        Err(Error::InvalidArgument(_))
    ));

    let opts = MatchOptions {
        threshold: 1.5,
        ..MatchOptions::default()
    };
    assert!(matches!(
        engine.detect(missing, missing, &opts),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn missing_input_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = WatermarkEngine::default().embed_text_watermark(
        &dir.path().join("absent.png"),
        &dir.path().join("out.png"),
        &TextWatermark::default(),
    );
    assert!(matches!(result, Err(Error::Decode { .. })));
}

#[test]
fn unsupported_output_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    write_png(&noise(32, 32, 6), &input);
    let result = WatermarkEngine::default().embed_text_watermark(
        &input,
        &dir.path().join("out.xyz"),
        &TextWatermark::default(),
    );
    assert!(matches!(result, Err(Error::UnsupportedFormat(_))));
}

#[test]
fn unknown_anchor_keyword_is_rejected() {
    assert!(matches!(
        "upper_middle".parse::<Anchor>(),
        Err(Error::UnsupportedOperation(_))
    ));
    assert!(matches!(
        "laplacian".parse::<Metric>(),
        Err(Error::UnsupportedOperation(_))
    ));
}

#[test]
fn detect_finds_cropped_region_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("target.png");
    let template_path = dir.path().join("template.png");
    let target = noise(120, 80, 7);
    let template = image::imageops::crop_imm(&target, 40, 15, 24, 20).to_image();
    write_png(&target, &target_path);
    write_png(&template, &template_path);

    let result = WatermarkEngine::default()
        .detect(&target_path, &template_path, &MatchOptions::default())
        .unwrap();
    let best = result.best.as_ref().unwrap();
    assert!((best.scale - 1.0).abs() < 1e-12);
    assert_eq!(best.top_left, (40, 15));
    assert_eq!(best.bottom_right, (64, 35));
    assert!(best.score > 0.99);
    assert!(result.is_detected());
    assert_eq!(result.template_size_original, (24, 20));
    assert_eq!(result.image_size, (120, 80));
    assert_eq!(result.matches.len(), 5);
}

#[test]
fn embedded_watermark_is_detected_at_its_anchor() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let logo_path = dir.path().join("logo.png");
    let output = dir.path().join("wm_in.png");
    write_png(&noise(200, 200, 8), &input);
    let logo = noise(40, 40, 9_999);
    write_png(&logo, &logo_path);

    let engine = WatermarkEngine::default();
    // 200 * 0.2 = 40, so the logo is composited without resampling
    let wm = ImageWatermark {
        scale: 0.2,
        opacity: 1.0,
        layout: Layout::Anchored(Anchor::BottomRight),
        margin: 20,
    };
    engine
        .embed_image_watermark(&input, &logo_path, &output, &wm)
        .unwrap();

    let result = engine
        .detect(&output, &logo_path, &MatchOptions::default())
        .unwrap();
    let best = result.best.unwrap();
    assert_eq!(best.top_left, (140, 140));
    assert!((best.scale - 1.0).abs() < 1e-12);
}

#[test]
fn resized_watermark_is_detected_at_matching_scale() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let logo_path = dir.path().join("logo.png");
    let output = dir.path().join("wm_in.png");
    write_png(&noise(200, 200, 11), &input);
    // 3px blocks keep the pattern stable under resampling
    let cells = noise(10, 10, 4_242);
    let logo = RgbaImage::from_fn(30, 30, |x, y| *cells.get_pixel(x / 3, y / 3));
    write_png(&logo, &logo_path);

    let engine = WatermarkEngine::default();
    // floor(200 * 0.18) = 36, i.e. the 30px logo is enlarged 1.2x
    let wm = ImageWatermark {
        scale: 0.18,
        opacity: 1.0,
        layout: Layout::Anchored(Anchor::BottomRight),
        margin: 20,
    };
    engine
        .embed_image_watermark(&input, &logo_path, &output, &wm)
        .unwrap();

    let result = engine
        .detect(&output, &logo_path, &MatchOptions::default())
        .unwrap();
    assert_eq!(result.matches.len(), 5);
    let best = result.best.as_ref().unwrap();
    assert!((best.scale - 1.2).abs() < 1e-12, "best scale {}", best.scale);
    assert_eq!(best.template_size, (36, 36));
    assert_eq!(best.top_left, (144, 144));
    assert!(best.score > 0.8, "score {}", best.score);
    assert!(result.is_detected());
}

#[test]
fn detect_missing_template_is_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let target_path = dir.path().join("target.png");
    write_png(&noise(30, 30, 10), &target_path);
    let result = WatermarkEngine::default().detect(
        &target_path,
        &dir.path().join("nope.png"),
        &MatchOptions::default(),
    );
    assert!(matches!(result, Err(Error::Decode { .. })));
}

#[test]
fn explicit_font_size_changes_footprint() {
    let engine = WatermarkEngine::default();
    let base = RgbaImage::from_pixel(200, 100, Rgba([0, 0, 0, 255]));
    let covered = |size: u32| {
        let mut img = base.clone();
        let wm = TextWatermark {
            text: "AB".to_string(),
            opacity: 1.0,
            font_size: FontSize::Px(size),
            layout: Layout::Anchored(Anchor::TopLeft),
            margin: 0,
        };
        engine.apply_text(&mut img, &wm).unwrap();
        img.pixels().filter(|p| p[0] == 255).count()
    };
    // bitmap glyphs scale by whole multiples of 8px
    assert_eq!(covered(16), covered(8) * 4);
}
