use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::template::Slot;

/// Source region chosen by crop-to-fit, in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceCrop {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl SourceCrop {
    /// Round to a pixel rectangle that stays inside a `source_width` x `source_height` image.
    pub fn to_pixel_rect(&self, source_width: u32, source_height: u32) -> (u32, u32, u32, u32) {
        let width = (self.width.round() as u32).clamp(1, source_width.max(1));
        let height = (self.height.round() as u32).clamp(1, source_height.max(1));
        let x = (self.x.round() as u32).min(source_width.saturating_sub(width));
        let y = (self.y.round() as u32).min(source_height.saturating_sub(height));
        (x, y, width, height)
    }

    pub fn is_full_source(&self, source_width: u32, source_height: u32) -> bool {
        self.to_pixel_rect(source_width, source_height) == (0, 0, source_width, source_height)
    }
}

/// Center-crop a `(iw, ih)` source so it fills a `(w, h)` target exactly.
///
/// A source wider than the target loses columns on both sides; otherwise it
/// loses rows top and bottom. The result never exceeds the source bounds.
pub fn crop_to_fit(iw: u32, ih: u32, w: u32, h: u32) -> SourceCrop {
    let (iw, ih) = (iw as f64, ih as f64);
    let source_ratio = iw / ih;
    let target_ratio = w as f64 / h as f64;

    if source_ratio > target_ratio {
        let width = (ih * target_ratio).min(iw);
        SourceCrop {
            x: (iw - width) / 2.0,
            y: 0.0,
            width,
            height: ih,
        }
    } else {
        let height = (iw / target_ratio).min(ih);
        SourceCrop {
            x: 0.0,
            y: (ih - height) / 2.0,
            width: iw,
            height,
        }
    }
}

/// Crop `source` to the slot's aspect ratio, scale it to the slot size and
/// write it into `canvas` at the slot position.
pub fn draw_cropped(canvas: &mut RgbImage, source: &RgbImage, slot: &Slot) {
    let (iw, ih) = source.dimensions();
    if iw == 0 || ih == 0 || slot.width == 0 || slot.height == 0 {
        log::warn!("Skipping empty frame or slot ({}x{} into {:?})", iw, ih, slot);
        return;
    }

    let crop = crop_to_fit(iw, ih, slot.width, slot.height);
    let (x, y, width, height) = crop.to_pixel_rect(iw, ih);
    log::debug!(
        "Cropping {}x{} source to {}x{}+{}+{} for slot at ({}, {})",
        iw, ih, width, height, x, y, slot.x, slot.y
    );

    let region = imageops::crop_imm(source, x, y, width, height).to_image();
    let scaled = if (width, height) == (slot.width, slot.height) {
        region
    } else {
        imageops::resize(&region, slot.width, slot.height, FilterType::Triangle)
    };

    imageops::replace(canvas, &scaled, slot.x as i64, slot.y as i64);
}
