//! Final composition: trimmed, enhanced subject centered on a gradient canvas.

use super::PipelineError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgb, RgbImage, Rgba, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Pixels within this distance of the corner colour count as empty margin.
const TRIM_THRESHOLD: u8 = 10;
const BRIGHTNESS: f32 = 1.06;
const SATURATION: f32 = 1.08;
const SHARPEN_SIGMA: f32 = 0.5;

/// Radial highlight: centre (fractions of the side), radius (fraction of the side), peak opacity.
const HIGHLIGHT_CENTER: (f32, f32) = (0.5, 0.35);
const HIGHLIGHT_RADIUS: f32 = 0.6;
const HIGHLIGHT_OPACITY: f32 = 0.35;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeSettings {
    /// Side of the square output canvas, in pixels.
    pub target_size: u32,
    /// Fraction of the canvas side the subject may occupy, in (0, 1].
    pub content_ratio: f32,
    pub jpeg_quality: u8,
    pub gradient_top: Rgb<u8>,
    pub gradient_bottom: Rgb<u8>,
    pub radial_highlight: bool,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            target_size: 800,
            content_ratio: 0.62,
            jpeg_quality: 90,
            gradient_top: Rgb([0xcf, 0xef, 0xff]),
            gradient_bottom: Rgb([0x8e, 0xca, 0xff]),
            radial_highlight: true,
        }
    }
}

impl ComposeSettings {
    /// Largest side the subject is resized to.
    pub fn max_subject_side(&self) -> u32 {
        ((self.target_size as f32 * self.content_ratio).floor() as u32).max(1)
    }
}

/// Decodes `input`, composes it and writes a JPEG to `output`. Blocking.
pub fn compose_on_gradient(
    input: &Path,
    output: &Path,
    settings: &ComposeSettings,
) -> Result<(), PipelineError> {
    let subject = ImageReader::open(input)?.with_guessed_format()?.decode()?;
    let canvas = render(&subject, settings);

    let mut writer = BufWriter::new(File::create(output)?);
    JpegEncoder::new_with_quality(&mut writer, settings.jpeg_quality).encode_image(&canvas)?;
    Ok(())
}

/// The full composition without any I/O.
pub fn render(subject: &DynamicImage, settings: &ComposeSettings) -> RgbImage {
    let trimmed = trim(&subject.to_rgba8(), TRIM_THRESHOLD);
    let mut fitted = fit_inside(&trimmed, settings.max_subject_side());
    enhance(&mut fitted, BRIGHTNESS, SATURATION);
    let sharpened = imageops::unsharpen(&fitted, SHARPEN_SIGMA, 0);

    let mut canvas = gradient_background(
        settings.target_size,
        settings.gradient_top,
        settings.gradient_bottom,
        settings.radial_highlight,
    );
    let x = (i64::from(settings.target_size) - i64::from(sharpened.width())) / 2;
    let y = (i64::from(settings.target_size) - i64::from(sharpened.height())) / 2;
    imageops::overlay(&mut canvas, &sharpened, x, y);

    DynamicImage::ImageRgba8(canvas).to_rgb8()
}

fn is_margin(px: &Rgba<u8>, corner: &Rgba<u8>, threshold: u8) -> bool {
    if px[3] == 0 && corner[3] == 0 {
        return true;
    }
    px.0.iter()
        .zip(corner.0.iter())
        .all(|(a, b)| a.abs_diff(*b) <= threshold)
}

/// Crops borders that match the top-left pixel. Returns the image unchanged if it is all margin.
pub fn trim(img: &RgbaImage, threshold: u8) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let corner = *img.get_pixel(0, 0);

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (w, h, 0, 0);
    for (x, y, px) in img.enumerate_pixels() {
        if !is_margin(px, &corner, threshold) {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }
    if min_x > max_x || min_y > max_y {
        return img.clone();
    }
    imageops::crop_imm(img, min_x, min_y, max_x - min_x + 1, max_y - min_y + 1).to_image()
}

/// Scales so the longer side equals `max_side`, preserving aspect ratio. Never crops; enlarges small inputs.
pub fn fit_inside(img: &RgbaImage, max_side: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let scale = max_side as f64 / w.max(h) as f64;
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_side);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_side);
    if (nw, nh) == (w, h) {
        return img.clone();
    }
    imageops::resize(img, nw, nh, FilterType::Lanczos3)
}

/// Brightness multiplier followed by a saturation push away from luma. Alpha is untouched.
pub fn enhance(img: &mut RgbaImage, brightness: f32, saturation: f32) {
    for px in img.pixels_mut() {
        let [r, g, b, a] = px.0;
        let (r, g, b) = (
            r as f32 * brightness,
            g as f32 * brightness,
            b as f32 * brightness,
        );
        let luma = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        let adjust = |c: f32| (luma + (c - luma) * saturation).round().clamp(0.0, 255.0) as u8;
        *px = Rgba([adjust(r), adjust(g), adjust(b), a]);
    }
}

/// Vertical linear gradient from `top` to `bottom`, optionally with a soft white highlight.
pub fn gradient_background(size: u32, top: Rgb<u8>, bottom: Rgb<u8>, radial: bool) -> RgbaImage {
    let side = size.max(1) as f32;
    let denom = (side - 1.0).max(1.0);
    let (cx, cy) = (HIGHLIGHT_CENTER.0 * side, HIGHLIGHT_CENTER.1 * side);
    let radius = HIGHLIGHT_RADIUS * side;

    RgbaImage::from_fn(size, size, |x, y| {
        let t = y as f32 / denom;
        let mut rgb = [0f32; 3];
        for (i, c) in rgb.iter_mut().enumerate() {
            *c = top[i] as f32 + (bottom[i] as f32 - top[i] as f32) * t;
        }
        if radial {
            let d = ((x as f32 + 0.5 - cx).powi(2) + (y as f32 + 0.5 - cy).powi(2)).sqrt();
            let alpha = HIGHLIGHT_OPACITY * (1.0 - d / radius).max(0.0);
            for c in rgb.iter_mut() {
                *c += (255.0 - *c) * alpha;
            }
        }
        Rgba([
            rgb[0].round() as u8,
            rgb[1].round() as u8,
            rgb[2].round() as u8,
            255,
        ])
    })
}

/// Parses `#rgb` or `#rrggbb`.
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().strip_prefix('#')?;
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => return None,
    };
    let channel = |i: usize| u8::from_str_radix(expanded.get(i..i + 2)?, 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
