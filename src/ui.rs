use chrono::Local;
use eframe::egui;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::booth::{BoothCommand, BoothHandle};
use crate::camera_controller::VideoSource;
use crate::config::Config;
use crate::export::Exporter;
use crate::frame::FrameSnapshot;
use crate::session::UiEvent;
use crate::template::Template;
use crate::texture;
use crate::view::ViewState;

// ============================================================================
// CONSTANTS FOR UI STYLING
// ============================================================================
const UI_PADDING: f32 = 20.0;
const SHUTTER_RADIUS: f32 = 70.0;
const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);
const MESSAGE_SECONDS: u64 = 3;
const FLASH_ALPHA: u8 = 204; // 0.8 opacity

const BACKGROUND: egui::Color32 = egui::Color32::from_rgb(40, 40, 40);
const PANEL: egui::Color32 = egui::Color32::from_rgb(30, 30, 34);

/// What the UI needs from a running booth task.
pub struct BoothLink {
    pub source: Arc<dyn VideoSource>,
    pub handle: BoothHandle,
    pub events: mpsc::UnboundedReceiver<UiEvent>,
}

// ============================================================================
// MAIN APP STRUCT
// ============================================================================

pub struct PhotoboothApp {
    config: Config,
    view: ViewState,
    booth: Option<BoothLink>,
    exporter: Exporter,

    // Textures
    preview_texture: Option<egui::TextureHandle>,
    result_texture: Option<egui::TextureHandle>,
    last_preview_update: Option<Instant>,

    // Print preview overlay, shown until the deadline and then printed
    print_at: Option<Instant>,

    // Export status
    export_message: Option<(bool, String)>,
    export_message_time: Option<Instant>,

    // Splash screen
    show_splash: bool,
    splash_start_time: Instant,
}

impl PhotoboothApp {
    /// `booth` is the error message when the video source could not be opened.
    pub fn new(config: Config, booth: Result<BoothLink, String>) -> Self {
        let mut view = ViewState::new(config.session.default_template);
        let booth = match booth {
            Ok(link) => {
                view.source_ready();
                Some(link)
            }
            Err(message) => {
                view.source_unavailable(message);
                None
            }
        };

        Self {
            exporter: Exporter::new(config.export.clone()),
            config,
            view,
            booth,
            preview_texture: None,
            result_texture: None,
            last_preview_update: None,
            print_at: None,
            export_message: None,
            export_message_time: None,
            show_splash: true,
            splash_start_time: Instant::now(),
        }
    }

    fn send(&self, command: BoothCommand) {
        if let Some(link) = &self.booth {
            link.handle.send(command);
        }
    }

    fn show_message(&mut self, success: bool, message: impl Into<String>) {
        self.export_message = Some((success, message.into()));
        self.export_message_time = Some(Instant::now());
    }
}

// ============================================================================
// MAIN UPDATE LOOP
// ============================================================================

impl eframe::App for PhotoboothApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ESC key to exit (for debugging in kiosk mode with keyboard)
        if ctx.input(|i| i.key_pressed(egui::Key::Escape)) {
            self.send(BoothCommand::Shutdown);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
        }

        // Events keep flowing during the splash so nothing queues up
        self.pump_events(ctx);

        if self.show_splash {
            let elapsed = self.splash_start_time.elapsed().as_secs_f32();
            let total = self.config.display.splash_ms as f32 / 1000.0;
            if elapsed > total {
                self.show_splash = false;
            } else {
                self.render_splash_screen(ctx, elapsed, total);
                ctx.request_repaint();
                return;
            }
        }

        if ctx.input(|i| i.key_pressed(egui::Key::Space)) {
            self.press_shutter();
        }

        self.update_camera_preview(ctx);
        self.run_pending_print();
        self.render_ui(ctx);

        ctx.request_repaint_after(PREVIEW_INTERVAL);
    }
}

// ============================================================================
// BOOTH PLUMBING
// ============================================================================

impl PhotoboothApp {
    fn pump_events(&mut self, ctx: &egui::Context) {
        let Some(link) = self.booth.as_mut() else {
            return;
        };

        let now = Instant::now();
        while let Ok(event) = link.events.try_recv() {
            self.view.apply(event, now);
        }

        if self.view.result_dirty {
            match &self.view.result {
                Some(image) => texture::upload(ctx, &mut self.result_texture, "result", image.image()),
                None => self.result_texture = None,
            }
            self.view.result_dirty = false;
        }

        if let Some(reason) = self.view.last_abort.take() {
            self.show_message(false, format!("✗ Session aborted: {}", reason));
        }
    }

    fn update_camera_preview(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let should_update = match self.last_preview_update {
            None => true,
            Some(last) => now.duration_since(last) >= PREVIEW_INTERVAL,
        };
        if !should_update {
            return;
        }

        let Some(link) = &self.booth else {
            return;
        };
        match link.source.latest_frame() {
            Ok(raw) => {
                let preview = FrameSnapshot::capture(raw, self.config.camera.mirror);
                texture::upload(ctx, &mut self.preview_texture, "preview", preview.image());
                self.last_preview_update = Some(now);
            }
            Err(e) => log::debug!("No preview frame: {}", e),
        }
    }

    fn press_shutter(&mut self) {
        if !self.view.shutter_enabled || self.booth.is_none() {
            return;
        }
        // Lock locally until the booth confirms, so a double tap sends one start
        self.view.shutter_enabled = false;
        self.send(BoothCommand::StartSession);
    }

    fn choose_template(&mut self, template: Template) {
        if self.view.select_template(template) {
            self.send(BoothCommand::SelectTemplate(template));
        }
    }

    fn download(&mut self) {
        let Some(image) = self.view.result.clone() else {
            return;
        };
        let now = Local::now();

        let outcome = if self.exporter.asks_location() {
            match self.exporter.pick_download_path(now) {
                Some(path) => self.exporter.save_to(&image, &path).map(|_| path),
                None => return,
            }
        } else {
            self.exporter.save_download(&image, now)
        };

        match outcome {
            Ok(path) => self.show_message(true, format!("✓ Saved {}", path.display())),
            Err(e) => {
                log::error!("Download failed: {:#}", e);
                self.show_message(false, format!("✗ Save failed: {}", e));
            }
        }
    }

    fn request_print(&mut self) {
        if self.view.result.is_some() && self.print_at.is_none() {
            self.print_at = Some(Instant::now() + self.exporter.print_delay());
        }
    }

    fn run_pending_print(&mut self) {
        let Some(deadline) = self.print_at else {
            return;
        };
        if Instant::now() < deadline {
            return;
        }
        self.print_at = None;

        let Some(image) = self.view.result.clone() else {
            return;
        };
        match self.exporter.print(&image) {
            Ok(_) => self.show_message(true, "✓ Sent to printer"),
            Err(e) => {
                log::error!("Print failed: {:#}", e);
                self.show_message(false, format!("✗ Print failed: {}", e));
            }
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

impl PhotoboothApp {
    fn render_splash_screen(&self, ctx: &egui::Context, elapsed: f32, total: f32) {
        // Fade in over 0.3s, fade out over the last 0.5s
        let alpha = if elapsed < 0.3 {
            elapsed / 0.3
        } else if elapsed > total - 0.5 {
            ((total - elapsed) / 0.5).max(0.0)
        } else {
            1.0
        };
        let color = egui::Color32::from_white_alpha((alpha * 255.0) as u8);

        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let screen_rect = ui.max_rect();
                ui.painter().rect_filled(screen_rect, 0.0, egui::Color32::BLACK);

                let center = screen_rect.center();
                let galley = ui.painter().layout_no_wrap(
                    self.config.footer.brand_text.clone(),
                    egui::FontId::proportional(64.0),
                    color,
                );
                ui.painter().galley(center - galley.size() / 2.0, galley);
            });
    }

    fn render_ui(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let full_rect = ui.max_rect();
                ui.painter().rect_filled(full_rect, 0.0, BACKGROUND);

                // Preview on the left, result panel on the right
                let split = full_rect.min.x + full_rect.width() * 0.6;
                let preview_rect = egui::Rect::from_min_max(full_rect.min, egui::pos2(split, full_rect.max.y));
                let result_rect = egui::Rect::from_min_max(egui::pos2(split, full_rect.min.y), full_rect.max);

                self.render_preview(ui, preview_rect);
                self.render_result_panel(ui, result_rect);
            });

        let screen_rect = ctx.screen_rect();
        self.render_status_bar(ctx, screen_rect);
        self.render_template_buttons(ctx, screen_rect);
        self.render_shutter(ctx, screen_rect);
        self.render_error_banner(ctx);
        self.render_print_preview(ctx, screen_rect);
        self.render_export_message(ctx);
    }

    fn render_preview(&self, ui: &mut egui::Ui, rect: egui::Rect) {
        let inner = rect.shrink(UI_PADDING);

        if let Some(texture) = &self.preview_texture {
            let display_size = fit_image_in_rect(texture.size_vec2(), inner.size());
            let centered_rect = center_rect_in_rect(display_size, inner);
            ui.allocate_ui_at_rect(centered_rect, |ui| {
                ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
            });
        } else {
            ui.allocate_ui_at_rect(inner, |ui| {
                ui.centered_and_justified(|ui| {
                    ui.label("No camera available");
                });
            });
        }

        let painter = ui.painter();
        if let Some(n) = self.view.countdown {
            let galley = painter.layout_no_wrap(
                n.to_string(),
                egui::FontId::proportional(220.0),
                egui::Color32::from_white_alpha(230),
            );
            painter.galley(inner.center() - galley.size() / 2.0, galley);
        }

        if self.view.flash_visible(Instant::now(), self.config.session.flash()) {
            painter.rect_filled(rect, 0.0, egui::Color32::from_white_alpha(FLASH_ALPHA));
        }
    }

    fn render_result_panel(&mut self, ui: &mut egui::Ui, rect: egui::Rect) {
        ui.painter().rect_filled(rect, 0.0, PANEL);
        let inner = rect.shrink(UI_PADDING);
        let buttons_height = 70.0;
        let image_rect = egui::Rect::from_min_max(
            inner.min + egui::vec2(0.0, 60.0),
            egui::pos2(inner.max.x, inner.max.y - buttons_height - UI_PADDING),
        );

        let Some(texture) = &self.result_texture else {
            let galley = ui.painter().layout_no_wrap(
                "Your photos will appear here".to_string(),
                egui::FontId::proportional(22.0),
                egui::Color32::from_gray(150),
            );
            ui.painter().galley(image_rect.center() - galley.size() / 2.0, galley);
            return;
        };

        let display_size = fit_image_in_rect(texture.size_vec2(), image_rect.size());
        let centered_rect = center_rect_in_rect(display_size, image_rect);
        ui.allocate_ui_at_rect(centered_rect, |ui| {
            ui.add(egui::Image::new(texture).fit_to_exact_size(display_size));
        });

        let buttons_rect = egui::Rect::from_min_max(
            egui::pos2(inner.min.x, inner.max.y - buttons_height),
            inner.max,
        );
        let mut download = false;
        let mut print = false;
        ui.allocate_ui_at_rect(buttons_rect, |ui| {
            ui.horizontal_centered(|ui| {
                let size = egui::vec2(160.0, 56.0);
                download = ui
                    .add(egui::Button::new(egui::RichText::new("Download").size(22.0)).min_size(size))
                    .clicked();
                print = ui
                    .add_enabled(
                        self.print_at.is_none(),
                        egui::Button::new(egui::RichText::new("Print").size(22.0)).min_size(size),
                    )
                    .clicked();
            });
        });

        if download {
            self.download();
        }
        if print {
            self.request_print();
        }
    }

    fn render_status_bar(&self, ctx: &egui::Context, screen_rect: egui::Rect) {
        let preview_center = screen_rect.min.x + screen_rect.width() * 0.3;
        egui::Area::new("status_bar")
            .fixed_pos(egui::pos2(preview_center - 150.0, UI_PADDING))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(egui::Color32::from_black_alpha(160))
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(20.0, 10.0))
                    .show(ui, |ui| {
                        ui.set_min_width(260.0);
                        ui.vertical_centered(|ui| {
                            ui.label(
                                egui::RichText::new(&self.view.status_text)
                                    .color(egui::Color32::WHITE)
                                    .size(24.0),
                            );
                        });
                    });
            });
    }

    fn render_template_buttons(&mut self, ctx: &egui::Context, screen_rect: egui::Rect) {
        let enabled = self.view.can_select_template();
        let selected = self.view.selected_template;
        let mut clicked = None;

        egui::Area::new("template_buttons")
            .fixed_pos(egui::pos2(screen_rect.min.x + UI_PADDING, screen_rect.max.y - 80.0))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    for &template in Template::all() {
                        let label = egui::SelectableLabel::new(
                            template == selected,
                            egui::RichText::new(template.label()).size(22.0),
                        );
                        if ui.add_enabled(enabled, label).clicked() {
                            clicked = Some(template);
                        }
                    }
                });
            });

        if let Some(template) = clicked {
            self.choose_template(template);
        }
    }

    fn render_shutter(&mut self, ctx: &egui::Context, screen_rect: egui::Rect) {
        let preview_right = screen_rect.min.x + screen_rect.width() * 0.6;
        let center = egui::pos2(
            preview_right - SHUTTER_RADIUS - UI_PADDING * 2.0,
            screen_rect.max.y - SHUTTER_RADIUS - UI_PADDING,
        );
        let enabled = self.view.shutter_enabled && self.booth.is_some();
        let fill = if enabled {
            egui::Color32::from_rgba_unmultiplied(200, 50, 60, 220)
        } else {
            egui::Color32::from_rgba_unmultiplied(70, 70, 80, 140)
        };

        let mut pressed = false;
        egui::Area::new("shutter_btn")
            .fixed_pos(center - egui::vec2(SHUTTER_RADIUS, SHUTTER_RADIUS))
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                pressed = circular_button(ui, SHUTTER_RADIUS, "SNAP", fill, enabled);
            });

        if pressed {
            self.press_shutter();
        }
    }

    fn render_error_banner(&self, ctx: &egui::Context) {
        let Some(message) = &self.view.error_banner else {
            return;
        };

        egui::Area::new("error_banner")
            .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
            .order(egui::Order::Tooltip)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(egui::Color32::from_rgb(180, 40, 40))
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(24.0, 18.0))
                    .show(ui, |ui| {
                        ui.set_max_width(600.0);
                        ui.label(
                            egui::RichText::new("Camera unavailable")
                                .color(egui::Color32::WHITE)
                                .size(26.0)
                                .strong(),
                        );
                        ui.label(egui::RichText::new(message).color(egui::Color32::WHITE).size(18.0));
                    });
            });
    }

    fn render_print_preview(&self, ctx: &egui::Context, screen_rect: egui::Rect) {
        if self.print_at.is_none() {
            return;
        }
        let Some(texture) = &self.result_texture else {
            return;
        };

        egui::Area::new("print_preview")
            .fixed_pos(screen_rect.min)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                let painter = ui.painter();
                painter.rect_filled(screen_rect, 0.0, egui::Color32::from_black_alpha(220));

                let display_size = fit_image_in_rect(texture.size_vec2(), screen_rect.shrink(UI_PADDING * 3.0).size());
                let image_rect = center_rect_in_rect(display_size, screen_rect);
                painter.image(
                    texture.id(),
                    image_rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            });
    }

    fn render_export_message(&mut self, ctx: &egui::Context) {
        if let Some(message_time) = self.export_message_time {
            if message_time.elapsed().as_secs() > MESSAGE_SECONDS {
                self.export_message = None;
                self.export_message_time = None;
            }
        }

        let Some((success, message)) = &self.export_message else {
            return;
        };

        egui::Area::new("export_message")
            .anchor(egui::Align2::CENTER_TOP, egui::vec2(0.0, UI_PADDING * 5.0))
            .order(egui::Order::Tooltip)
            .show(ctx, |ui| {
                egui::Frame::none()
                    .fill(if *success {
                        egui::Color32::from_rgb(40, 120, 40)
                    } else {
                        egui::Color32::from_rgb(180, 40, 40)
                    })
                    .rounding(8.0)
                    .inner_margin(egui::Margin::symmetric(20.0, 15.0))
                    .show(ui, |ui| {
                        ui.label(egui::RichText::new(message).color(egui::Color32::WHITE).size(20.0));
                    });
            });
    }
}

// ============================================================================
// WIDGETS
// ============================================================================

fn circular_button(ui: &mut egui::Ui, radius: f32, text: &str, base_fill: egui::Color32, enabled: bool) -> bool {
    let size = egui::vec2(radius * 2.0, radius * 2.0);
    let sense = if enabled { egui::Sense::click() } else { egui::Sense::hover() };
    let (rect, response) = ui.allocate_exact_size(size, sense);

    if ui.is_rect_visible(rect) {
        let painter = ui.painter();
        let center = rect.center();

        let (fill_color, stroke_color) = if !enabled {
            (base_fill, egui::Color32::from_rgb(90, 90, 100))
        } else if response.is_pointer_button_down_on() {
            let r = base_fill.r().saturating_sub(30);
            let g = base_fill.g().saturating_sub(30);
            let b = base_fill.b().saturating_sub(30);
            (egui::Color32::from_rgb(r, g, b), egui::Color32::from_rgb(120, 120, 130))
        } else if response.hovered() {
            let r = base_fill.r().saturating_add(20);
            let g = base_fill.g().saturating_add(20);
            let b = base_fill.b().saturating_add(20);
            (egui::Color32::from_rgb(r, g, b), egui::Color32::from_rgb(150, 150, 160))
        } else {
            (base_fill, egui::Color32::from_rgb(230, 230, 235))
        };

        // Shadow
        painter.circle(
            center + egui::vec2(3.0, 3.0),
            radius,
            egui::Color32::from_black_alpha(80),
            egui::Stroke::NONE,
        );
        painter.circle(center, radius, fill_color, egui::Stroke::new(4.0, stroke_color));

        let text_color = if enabled { egui::Color32::WHITE } else { egui::Color32::from_gray(150) };
        let galley = painter.layout_no_wrap(text.to_string(), egui::FontId::proportional(radius / 3.0), text_color);
        painter.galley(center - galley.size() / 2.0, galley);

        if enabled && response.hovered() {
            ui.ctx().set_cursor_icon(egui::CursorIcon::PointingHand);
        }
    }

    enabled && response.clicked()
}

fn fit_image_in_rect(image_size: egui::Vec2, container_size: egui::Vec2) -> egui::Vec2 {
    let scale = (container_size.x / image_size.x).min(container_size.y / image_size.y);
    image_size * scale
}

fn center_rect_in_rect(content_size: egui::Vec2, container: egui::Rect) -> egui::Rect {
    let offset = (container.size() - content_size) * 0.5;
    egui::Rect::from_min_size(container.min + offset, content_size)
}
