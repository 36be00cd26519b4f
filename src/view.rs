use std::time::{Duration, Instant};

use crate::composer::ComposedImage;
use crate::session::{UiEvent, READY_STATUS, UNAVAILABLE_STATUS};
use crate::template::Template;

/// Everything the kiosk screen shows, folded from booth events.
pub struct ViewState {
    pub status_text: String,
    pub countdown: Option<u8>,
    pub flash_started: Option<Instant>,
    pub shutter_enabled: bool,
    pub selected_template: Template,
    pub result: Option<ComposedImage>,
    /// Set when `result` changed and the texture must be rebuilt.
    pub result_dirty: bool,
    pub error_banner: Option<String>,
    pub last_abort: Option<String>,
}

impl ViewState {
    pub fn new(template: Template) -> Self {
        Self {
            status_text: "Starting camera...".to_string(),
            countdown: None,
            flash_started: None,
            shutter_enabled: false,
            selected_template: template,
            result: None,
            result_dirty: false,
            error_banner: None,
            last_abort: None,
        }
    }

    /// Video source opened: ready for the first session.
    pub fn source_ready(&mut self) {
        self.status_text = READY_STATUS.to_string();
        self.shutter_enabled = true;
        self.error_banner = None;
    }

    /// Video source failed: block capture with an error banner.
    pub fn source_unavailable(&mut self, message: impl Into<String>) {
        self.status_text = UNAVAILABLE_STATUS.to_string();
        self.shutter_enabled = false;
        self.error_banner = Some(message.into());
    }

    /// Template buttons are locked while a session runs.
    pub fn can_select_template(&self) -> bool {
        self.shutter_enabled && self.error_banner.is_none()
    }

    pub fn select_template(&mut self, template: Template) -> bool {
        if !self.can_select_template() {
            return false;
        }
        self.selected_template = template;
        true
    }

    pub fn flash_visible(&self, now: Instant, flash: Duration) -> bool {
        self.flash_started
            .map_or(false, |started| now.saturating_duration_since(started) < flash)
    }

    pub fn apply(&mut self, event: UiEvent, now: Instant) {
        match event {
            UiEvent::Status(text) => self.status_text = text,
            UiEvent::Countdown(n) => self.countdown = Some(n),
            UiEvent::CountdownCleared => self.countdown = None,
            UiEvent::Flash => self.flash_started = Some(now),
            UiEvent::ShutterEnabled(enabled) => self.shutter_enabled = enabled,
            UiEvent::ResultCleared => {
                self.result = None;
                self.result_dirty = true;
                self.last_abort = None;
            }
            UiEvent::Composed(image) => {
                self.result = Some(image);
                self.result_dirty = true;
            }
            UiEvent::SessionAborted(reason) => self.last_abort = Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::footer::FooterStamp;
    use crate::frame::FrameSnapshot;
    use crate::template::LayoutMetrics;
    use chrono::NaiveDate;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_source_states() {
        let mut view = ViewState::new(Template::Strip);
        assert!(!view.shutter_enabled);

        view.source_ready();
        assert_eq!(view.status_text, READY_STATUS);
        assert!(view.shutter_enabled);

        view.source_unavailable("Please allow camera permissions.");
        assert_eq!(view.status_text, UNAVAILABLE_STATUS);
        assert!(!view.shutter_enabled);
        assert!(!view.select_template(Template::Grid));
        assert_eq!(view.selected_template, Template::Strip);
    }

    #[test]
    fn test_countdown_and_flash() {
        let mut view = ViewState::new(Template::Strip);
        let now = Instant::now();
        view.apply(UiEvent::Countdown(3), now);
        assert_eq!(view.countdown, Some(3));
        view.apply(UiEvent::CountdownCleared, now);
        assert_eq!(view.countdown, None);

        view.apply(UiEvent::Flash, now);
        let flash = Duration::from_millis(150);
        assert!(view.flash_visible(now, flash));
        assert!(view.flash_visible(now + Duration::from_millis(100), flash));
        assert!(!view.flash_visible(now + Duration::from_millis(200), flash));
    }

    #[test]
    fn test_session_locks_template_selection() {
        let mut view = ViewState::new(Template::Strip);
        view.source_ready();
        assert!(view.select_template(Template::Single));

        view.apply(UiEvent::ShutterEnabled(false), Instant::now());
        assert!(!view.select_template(Template::Grid));
        assert_eq!(view.selected_template, Template::Single);
    }

    #[test]
    fn test_result_lifecycle() {
        let mut view = ViewState::new(Template::Single);
        let composer = Composer::new(LayoutMetrics::default(), Rgb([255, 255, 255]), FooterStamp::blank());
        let frame = FrameSnapshot::from_image(RgbImage::from_pixel(40, 30, Rgb([9, 9, 9])));
        let image = composer
            .compose(&[frame], Template::Single, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
            .unwrap();

        view.apply(UiEvent::Composed(image), Instant::now());
        assert!(view.result.is_some());
        assert!(view.result_dirty);

        view.result_dirty = false;
        view.apply(UiEvent::ResultCleared, Instant::now());
        assert!(view.result.is_none());
        assert!(view.result_dirty);
    }
}
