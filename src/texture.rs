use egui::{Context, TextureHandle, TextureOptions};
use image::RgbImage;

fn color_image(image: &RgbImage) -> egui::ColorImage {
    let size = [image.width() as usize, image.height() as usize];
    let pixels = image.as_flat_samples();
    egui::ColorImage::from_rgb(size, pixels.as_slice())
}

/// Upload `image` into `slot`, reusing the existing texture when the size matches.
pub fn upload(ctx: &Context, slot: &mut Option<TextureHandle>, name: &str, image: &RgbImage) {
    // Skip invalid frames to prevent a white flash
    if image.width() == 0 || image.height() == 0 {
        return;
    }

    let size = [image.width() as usize, image.height() as usize];
    let color_image = color_image(image);

    match slot {
        Some(texture) if texture.size() == size => {
            texture.set(color_image, TextureOptions::LINEAR);
        }
        _ => {
            *slot = Some(ctx.load_texture(name, color_image, TextureOptions::LINEAR));
        }
    }
}
