use image::RgbImage;
use std::sync::Arc;

/// One captured still, already mirrored to match the preview.
///
/// The pixel buffer is shared, so clones are cheap and nothing can mutate it
/// after capture.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    image: Arc<RgbImage>,
}

impl FrameSnapshot {
    /// Wrap a raw grab from the video source, flipping it horizontally when
    /// the preview is shown mirrored.
    pub fn capture(raw: RgbImage, mirror: bool) -> Self {
        let image = if mirror {
            image::imageops::flip_horizontal(&raw)
        } else {
            raw
        };
        Self { image: Arc::new(image) }
    }

    /// Wrap an image that needs no further processing.
    pub fn from_image(image: RgbImage) -> Self {
        Self::capture(image, false)
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn left_red_right_blue() -> RgbImage {
        RgbImage::from_fn(4, 2, |x, _| if x < 2 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) })
    }

    #[test]
    fn test_capture_mirrors_horizontally() {
        let frame = FrameSnapshot::capture(left_red_right_blue(), true);
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(*frame.image().get_pixel(0, 0), Rgb([0, 0, 255]));
        assert_eq!(*frame.image().get_pixel(3, 1), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_capture_without_mirror_keeps_pixels() {
        let frame = FrameSnapshot::capture(left_red_right_blue(), false);
        assert_eq!(*frame.image().get_pixel(0, 0), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_clones_share_buffer() {
        let frame = FrameSnapshot::from_image(left_red_right_blue());
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.image(), copy.image()));
    }
}
