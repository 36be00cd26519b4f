use anyhow::Result;
use eframe::egui;
use log::info;

mod booth;
mod camera_controller;
mod clock;
mod composer;
mod config;
mod crop;
mod error;
mod export;
mod footer;
mod frame;
mod session;
mod template;
mod texture;
mod ui;
mod view;

use crate::booth::Booth;
use crate::camera_controller::open_video_source;
use crate::clock::TokioClock;
use crate::composer::Composer;
use crate::config::Config;
use crate::session::{SessionController, SessionTiming};
use crate::ui::{BoothLink, PhotoboothApp};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("📸 Starting photobooth");

    let config = Config::load()?;
    config.validate()?;
    config.create_directories()?;
    info!(
        "Configuration loaded: {}x{} display, default template {}",
        config.display.width, config.display.height, config.session.default_template
    );

    let booth = match open_video_source(&config.camera).await {
        Ok(source) => {
            info!("Video source ready: {}", source.name());
            let controller = SessionController::new(
                SessionTiming::from(&config.session),
                config.session.default_template,
            );
            let composer = Composer::from_config(&config)?;
            let (booth, handle, events) =
                Booth::new(controller, source.clone(), composer, TokioClock, config.camera.mirror);
            tokio::spawn(booth.run());
            Ok(BoothLink { source, handle, events })
        }
        Err(e) => {
            log::error!("Video source unavailable: {}", e);
            Err(e.to_string())
        }
    };

    let (width, height) = (config.display.width as f32, config.display.height as f32);
    let mut viewport = egui::ViewportBuilder::default()
        .with_inner_size([width, height])
        .with_min_inner_size([width, height])
        .with_decorations(!config.display.fullscreen)
        .with_resizable(false);
    if config.display.fullscreen {
        viewport = viewport.with_fullscreen(true).with_always_on_top();
    }
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    info!("Launching GUI application...");

    eframe::run_native(
        "Photobooth",
        options,
        Box::new(|cc| {
            setup_touch_style(&cc.egui_ctx);
            Box::new(PhotoboothApp::new(config, booth))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run application: {}", e))?;

    info!("Application shut down gracefully");
    Ok(())
}

fn setup_touch_style(ctx: &egui::Context) {
    let mut style = (*ctx.style()).clone();

    // Larger UI elements for touch interaction
    style.spacing.button_padding = egui::vec2(16.0, 12.0);
    style.spacing.item_spacing = egui::vec2(12.0, 8.0);
    style.spacing.window_margin = egui::Margin::same(16.0);

    style.text_styles.insert(
        egui::TextStyle::Button,
        egui::FontId::new(20.0, egui::FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Body,
        egui::FontId::new(18.0, egui::FontFamily::Proportional),
    );

    ctx.set_style(style);
}
