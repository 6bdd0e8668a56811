//! Overlay drawing: boxes (and optionally labels) for the rendered classes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use anyhow::Context;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::bbox::BBoxesByClass;

const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [26, 147, 52],
    [0, 212, 187],
    [52, 69, 147],
    [255, 55, 199],
];

pub fn class_color(class_idx: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_idx % PALETTE.len()])
}

/// Set of class ids drawn on the overlay. Classes outside of it are still
/// detected and reported, just not rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFilter {
    classes: Option<BTreeSet<usize>>,
}

impl ClassFilter {
    pub fn all() -> Self {
        Self { classes: None }
    }

    pub fn only(classes: impl IntoIterator<Item = usize>) -> Self {
        Self {
            classes: Some(classes.into_iter().collect()),
        }
    }

    pub fn renders(&self, class_idx: usize) -> bool {
        self.classes
            .as_ref()
            .map_or(true, |classes| classes.contains(&class_idx))
    }
}

impl Default for ClassFilter {
    /// Classes 1-4; class 0 (swimmer body) is detected but not drawn.
    fn default() -> Self {
        Self::only([1, 2, 3, 4])
    }
}

/// Sans-serif fonts commonly installed on Linux, macOS and Windows.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// How boxes are drawn.
pub struct AnnotationStyle {
    pub thickness: u32,
    pub class_names: Vec<String>,
    /// Labels are only drawn when a font is loaded.
    pub font: Option<FontVec>,
    pub font_scale: f32,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            class_names: Vec::new(),
            font: None,
            font_scale: 16.0,
        }
    }
}

impl AnnotationStyle {
    pub fn load_font(&mut self, path: &Path) -> anyhow::Result<()> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read font {path:?}"))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| anyhow::anyhow!("Invalid font {path:?}: {e}"))?;
        self.font = Some(font);
        Ok(())
    }

    /// Loads the first usable font from the usual system locations,
    /// returning its path.
    pub fn load_system_font(&mut self) -> Option<PathBuf> {
        SYSTEM_FONTS
            .iter()
            .map(Path::new)
            .filter(|path| path.is_file())
            .find(|path| self.load_font(path).is_ok())
            .map(Path::to_path_buf)
    }

    pub fn class_name(&self, class_idx: usize) -> String {
        self.class_names
            .get(class_idx)
            .cloned()
            .unwrap_or_else(|| format!("class{class_idx}"))
    }
}

/// Draws the boxes of every rendered class onto a copy of `image`.
pub fn draw_bboxes(
    image: &DynamicImage,
    bboxes: &BBoxesByClass,
    filter: &ClassFilter,
    style: &AnnotationStyle,
) -> DynamicImage {
    let mut canvas: RgbImage = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for (class_idx, class_bboxes) in bboxes.iter().enumerate() {
        if !filter.renders(class_idx) {
            continue;
        }
        let color = class_color(class_idx);
        for bbox in class_bboxes {
            let bbox = bbox.clamp(width as f32, height as f32);
            let x = bbox.xmin.round() as i32;
            let y = bbox.ymin.round() as i32;
            let w = bbox.width().round() as u32;
            let h = bbox.height().round() as u32;

            for t in 0..style.thickness {
                if w <= 2 * t || h <= 2 * t {
                    break;
                }
                let rect = Rect::at(x + t as i32, y + t as i32).of_size(w - 2 * t, h - 2 * t);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &style.font {
                let label = format!("{} {:.2}", style.class_name(class_idx), bbox.confidence);
                let scale = PxScale::from(style.font_scale);
                let (text_w, text_h) = text_size(scale, font, &label);
                let label_y = (y - text_h as i32).max(0);
                if text_w > 0 && text_h > 0 {
                    draw_filled_rect_mut(
                        &mut canvas,
                        Rect::at(x, label_y).of_size(text_w, text_h),
                        color,
                    );
                }
                draw_text_mut(&mut canvas, Rgb([255, 255, 255]), x, label_y, scale, font, &label);
            }
        }
    }

    DynamicImage::ImageRgb8(canvas)
}
