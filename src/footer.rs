use anyhow::{Context, Result};
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use std::path::Path;

use crate::config::{parse_hex_color, FooterConfig};

/// Brand label and date drawn under the slots of every composed image.
#[derive(Clone)]
pub struct FooterStamp {
    brand_text: String,
    brand: Option<TextStyle>,
    date: Option<TextStyle>,
    baseline_offset: u32,
    date_line_offset: u32,
}

/// Face from egui's default font set, used when a configured font file is missing.
const BUNDLED_FONT: &str = "Ubuntu-Light";

fn bundled_font() -> Option<Font<'static>> {
    let data = egui::FontDefinitions::default().font_data.remove(BUNDLED_FONT)?;
    Font::try_from_vec(data.font.into_owned())
}

fn read_font(path: &Path) -> Result<Font<'static>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read font file {}", path.display()))?;
    Font::try_from_vec(bytes).ok_or_else(|| anyhow::anyhow!("Invalid font data in {}", path.display()))
}

#[derive(Clone)]
struct TextStyle {
    font: Font<'static>,
    scale: Scale,
    color: Rgb<u8>,
}

impl TextStyle {
    fn load(path: &Path, size: f32, color: &str) -> Result<Self> {
        let color = parse_hex_color(color)?;
        let font = match read_font(path) {
            Ok(font) => font,
            Err(e) => {
                log::warn!("{:#}, using bundled {}", e, BUNDLED_FONT);
                bundled_font().ok_or_else(|| anyhow::anyhow!("Bundled font {} unavailable", BUNDLED_FONT))?
            }
        };
        Ok(Self {
            font,
            scale: Scale::uniform(size),
            color,
        })
    }

    /// Draw `text` centered on `center_x` with its baseline at `baseline_y`.
    fn draw_centered(&self, canvas: &mut RgbImage, text: &str, center_x: i32, baseline_y: i32) {
        let (width, _) = text_size(self.scale, &self.font, text);
        let ascent = self.font.v_metrics(self.scale).ascent.round() as i32;
        draw_text_mut(
            canvas,
            self.color,
            center_x - width / 2,
            baseline_y - ascent,
            self.scale,
            &self.font,
            text,
        );
    }
}

impl FooterStamp {
    /// Build the stamp from configuration. Missing font files fall back to the
    /// bundled face; a line that still cannot be styled is left out instead of
    /// failing composition.
    pub fn from_config(config: &FooterConfig) -> Self {
        let brand = TextStyle::load(&config.brand_font, config.brand_size, &config.brand_color)
            .map_err(|e| log::warn!("Footer brand label disabled: {:#}", e))
            .ok();
        let date = TextStyle::load(&config.date_font, config.date_size, &config.date_color)
            .map_err(|e| log::warn!("Footer date line disabled: {:#}", e))
            .ok();

        Self {
            brand_text: config.brand_text.clone(),
            brand,
            date,
            baseline_offset: config.baseline_offset,
            date_line_offset: config.date_line_offset,
        }
    }

    /// A stamp that draws nothing.
    pub fn blank() -> Self {
        Self {
            brand_text: String::new(),
            brand: None,
            date: None,
            baseline_offset: 50,
            date_line_offset: 35,
        }
    }

    /// Brand baseline position for a canvas of the given size.
    pub fn anchor(&self, canvas_width: u32, canvas_height: u32) -> (i32, i32) {
        (
            (canvas_width / 2) as i32,
            canvas_height.saturating_sub(self.baseline_offset) as i32,
        )
    }

    pub fn draw(&self, canvas: &mut RgbImage, date: NaiveDate) {
        let (x, y) = self.anchor(canvas.width(), canvas.height());

        if let Some(style) = &self.brand {
            if !self.brand_text.is_empty() {
                style.draw_centered(canvas, &self.brand_text, x, y);
            }
        }
        if let Some(style) = &self.date {
            let text = format_footer_date(date);
            style.draw_centered(canvas, &text, x, y + self.date_line_offset as i32);
        }
    }
}

/// `OCTOBER 16, 2026`
pub fn format_footer_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string().to_uppercase()
}
