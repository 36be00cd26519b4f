use chrono::NaiveDate;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageOutputFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::crop::draw_cropped;
use crate::error::{PhotoboothError, PhotoboothResult};
use crate::footer::FooterStamp;
use crate::frame::FrameSnapshot;
use crate::template::{LayoutMetrics, Template};

/// Finished collage ready for display, download or print.
#[derive(Debug, Clone)]
pub struct ComposedImage {
    image: Arc<RgbImage>,
    template: Template,
}

impl ComposedImage {
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn template(&self) -> Template {
        self.template
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn encode_jpeg(&self, quality: u8) -> PhotoboothResult<Vec<u8>> {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality)
            .encode_image(&*self.image)
            .map_err(|e| PhotoboothError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    pub fn encode_png(&self) -> PhotoboothResult<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.image
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .map_err(|e| PhotoboothError::Encode(e.to_string()))?;
        Ok(cursor.into_inner())
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> PhotoboothResult<()> {
        let bytes = self.encode_png()?;
        std::fs::write(path.as_ref(), bytes).map_err(|e| {
            PhotoboothError::Export(format!("Failed to write {}: {}", path.as_ref().display(), e))
        })
    }
}

/// Crops captured frames into template slots and stamps the footer.
#[derive(Clone)]
pub struct Composer {
    metrics: LayoutMetrics,
    background: Rgb<u8>,
    footer: Arc<FooterStamp>,
}

impl Composer {
    pub fn new(metrics: LayoutMetrics, background: Rgb<u8>, footer: FooterStamp) -> Self {
        Self {
            metrics,
            background,
            footer: Arc::new(footer),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.layout.metrics(),
            config.layout.background_color()?,
            FooterStamp::from_config(&config.footer),
        ))
    }

    pub fn metrics(&self) -> &LayoutMetrics {
        &self.metrics
    }

    /// Compose `frames` (in shot order) into `template`, dating the footer with `date`.
    pub fn compose(
        &self,
        frames: &[FrameSnapshot],
        template: Template,
        date: NaiveDate,
    ) -> PhotoboothResult<ComposedImage> {
        let slots = template.slots(&self.metrics);
        if frames.len() != slots.len() {
            return Err(PhotoboothError::FrameCountMismatch {
                template,
                expected: slots.len(),
                actual: frames.len(),
            });
        }

        let (width, height) = template.canvas_size(&self.metrics);
        log::debug!("Composing {} frames into {} canvas {}x{}", frames.len(), template, width, height);

        let mut canvas = RgbImage::from_pixel(width, height, self.background);
        for (frame, slot) in frames.iter().zip(slots.iter()) {
            draw_cropped(&mut canvas, frame.image(), slot);
        }
        self.footer.draw(&mut canvas, date);

        log::info!("Composed {} image {}x{}", template, width, height);
        Ok(ComposedImage {
            image: Arc::new(canvas),
            template,
        })
    }
}
