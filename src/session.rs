use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::time::Duration;

use crate::composer::ComposedImage;
use crate::config::SessionConfig;
use crate::error::{PhotoboothError, PhotoboothResult};
use crate::frame::FrameSnapshot;
use crate::template::Template;

pub const READY_STATUS: &str = "Ready to snap";
pub const DEVELOPING_STATUS: &str = "Developing...";
pub const UNAVAILABLE_STATUS: &str = "Unavailable";

pub fn taking_status(shot: usize, total: usize) -> String {
    format!("Taking {}/{}", shot, total)
}

/// Discrete presentation updates emitted by the controller.
#[derive(Debug, Clone)]
pub enum UiEvent {
    Status(String),
    Countdown(u8),
    CountdownCleared,
    Flash,
    ShutterEnabled(bool),
    /// Hide the previous result and show the empty state.
    ResultCleared,
    Composed(ComposedImage),
    SessionAborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevelopStage {
    /// Waiting out the develop delay.
    Processing,
    /// Delay elapsed, frames can be handed to the composer.
    Ready,
    /// Frames handed off, waiting for the composed image.
    Composing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CountingDown { remaining: u8 },
    Capturing { captured: bool },
    Developing { stage: DevelopStage },
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::CountingDown { remaining } => write!(f, "counting down ({})", remaining),
            Phase::Capturing { captured: false } => write!(f, "capturing"),
            Phase::Capturing { captured: true } => write!(f, "settling after capture"),
            Phase::Developing { stage } => write!(f, "developing ({:?})", stage),
        }
    }
}

/// What the driver has to do next to move the session forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Sleep, then call [`SessionController::timer_fired`].
    Wait(Duration),
    /// Grab a frame, then call [`SessionController::record_frame`] or [`SessionController::abort`].
    Capture,
    /// Take the frames with [`SessionController::take_composition_input`] and compose them.
    Compose,
}

/// Delays between the steps of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub countdown_from: u8,
    pub tick: Duration,
    pub settle: Duration,
    pub develop: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionTiming {
    fn from(config: &SessionConfig) -> Self {
        Self {
            countdown_from: config.countdown_from.max(1),
            tick: config.tick(),
            settle: config.settle(),
            develop: config.develop(),
        }
    }
}

/// Frames collected for one run of the booth. Append-only.
#[derive(Debug, Clone)]
pub struct Session {
    template: Template,
    frames: Vec<FrameSnapshot>,
    started_at: DateTime<Local>,
}

impl Session {
    pub fn new(template: Template) -> Self {
        Self {
            template,
            frames: Vec::with_capacity(template.shot_count()),
            started_at: Local::now(),
        }
    }

    pub fn template(&self) -> Template {
        self.template
    }

    pub fn frames(&self) -> &[FrameSnapshot] {
        &self.frames
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn shot_count(&self) -> usize {
        self.template.shot_count()
    }

    pub fn is_complete(&self) -> bool {
        self.frames.len() == self.shot_count()
    }

    pub fn push(&mut self, frame: FrameSnapshot) -> PhotoboothResult<()> {
        if self.is_complete() {
            return Err(PhotoboothError::InvalidTransition {
                phase: format!("{} session already has {} frames", self.template, self.frames.len()),
                operation: "append a frame",
            });
        }
        self.frames.push(frame);
        Ok(())
    }
}

/// Countdown/capture/develop state machine with a single active session.
///
/// The controller never sleeps or touches the camera itself; a driver asks
/// for [`next_action`](Self::next_action) and reports back what happened.
pub struct SessionController {
    timing: SessionTiming,
    selected: Template,
    phase: Phase,
    session: Option<Session>,
    events: VecDeque<UiEvent>,
}

impl SessionController {
    pub fn new(timing: SessionTiming, template: Template) -> Self {
        Self {
            timing,
            selected: template,
            phase: Phase::Idle,
            session: None,
            events: VecDeque::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn selected_template(&self) -> Template {
        self.selected
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn timing(&self) -> &SessionTiming {
        &self.timing
    }

    /// Change the template for the next session. Ignored unless idle.
    pub fn select_template(&mut self, template: Template) -> bool {
        if !self.is_idle() {
            log::debug!("Ignoring template change to {} while {}", template, self.phase);
            return false;
        }
        self.selected = template;
        true
    }

    /// Begin a session. Returns `false` and changes nothing if one is running.
    pub fn start_session(&mut self, template: Template) -> bool {
        if !self.is_idle() {
            log::debug!("{} (phase: {})", PhotoboothError::SessionBusy, self.phase);
            return false;
        }

        log::info!("Starting {} session ({} shots)", template, template.shot_count());
        self.selected = template;
        self.session = Some(Session::new(template));
        self.emit(UiEvent::ShutterEnabled(false));
        self.emit(UiEvent::ResultCleared);
        self.begin_shot();
        true
    }

    pub fn next_action(&self) -> Action {
        match self.phase {
            Phase::Idle => Action::None,
            Phase::CountingDown { .. } => Action::Wait(self.timing.tick),
            Phase::Capturing { captured: false } => Action::Capture,
            Phase::Capturing { captured: true } => Action::Wait(self.timing.settle),
            Phase::Developing { stage: DevelopStage::Processing } => Action::Wait(self.timing.develop),
            Phase::Developing { stage: DevelopStage::Ready } => Action::Compose,
            Phase::Developing { stage: DevelopStage::Composing } => Action::None,
        }
    }

    /// Advance after the wait returned by [`next_action`](Self::next_action) elapsed.
    pub fn timer_fired(&mut self) -> PhotoboothResult<()> {
        match self.phase {
            Phase::CountingDown { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining > 0 {
                    self.emit(UiEvent::Countdown(remaining));
                    self.phase = Phase::CountingDown { remaining };
                } else {
                    self.emit(UiEvent::CountdownCleared);
                    self.phase = Phase::Capturing { captured: false };
                }
                Ok(())
            }
            Phase::Capturing { captured: true } => {
                if self.session.as_ref().map_or(false, Session::is_complete) {
                    log::info!("All shots taken, developing");
                    self.emit(UiEvent::Status(DEVELOPING_STATUS.to_string()));
                    self.phase = Phase::Developing { stage: DevelopStage::Processing };
                } else {
                    self.begin_shot();
                }
                Ok(())
            }
            Phase::Developing { stage: DevelopStage::Processing } => {
                self.phase = Phase::Developing { stage: DevelopStage::Ready };
                Ok(())
            }
            _ => Err(self.invalid("advance on a timer")),
        }
    }

    /// Append a captured frame to the session.
    pub fn record_frame(&mut self, frame: FrameSnapshot) -> PhotoboothResult<()> {
        if self.phase != (Phase::Capturing { captured: false }) {
            return Err(self.invalid("record a frame"));
        }
        let session = self.session.as_mut().ok_or_else(|| PhotoboothError::InvalidTransition {
            phase: "capturing without a session".to_string(),
            operation: "record a frame",
        })?;

        let (width, height) = frame.dimensions();
        session.push(frame)?;
        log::debug!(
            "Captured frame {}/{} ({}x{})",
            session.frames().len(),
            session.shot_count(),
            width,
            height
        );
        self.emit(UiEvent::Flash);
        self.phase = Phase::Capturing { captured: true };
        Ok(())
    }

    /// Hand the completed session to the composer. The controller keeps no frames afterwards.
    pub fn take_composition_input(&mut self) -> PhotoboothResult<Session> {
        if self.phase != (Phase::Developing { stage: DevelopStage::Ready }) {
            return Err(self.invalid("hand frames to the composer"));
        }
        match self.session.take() {
            Some(session) if session.is_complete() => {
                self.phase = Phase::Developing { stage: DevelopStage::Composing };
                Ok(session)
            }
            other => {
                let actual = other.as_ref().map_or(0, |s| s.frames().len());
                self.session = other;
                Err(PhotoboothError::FrameCountMismatch {
                    template: self.selected,
                    expected: self.selected.shot_count(),
                    actual,
                })
            }
        }
    }

    /// Publish the composed image and return to idle.
    pub fn finish(&mut self, image: ComposedImage) -> PhotoboothResult<()> {
        if self.phase != (Phase::Developing { stage: DevelopStage::Composing }) {
            return Err(self.invalid("finish a session"));
        }
        self.emit(UiEvent::Composed(image));
        self.emit(UiEvent::Status(READY_STATUS.to_string()));
        self.emit(UiEvent::ShutterEnabled(true));
        self.phase = Phase::Idle;
        log::info!("Session finished");
        Ok(())
    }

    /// Drop the running session and return to idle.
    pub fn abort(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.is_idle() {
            return;
        }
        log::error!("Session aborted while {}: {}", self.phase, reason);
        self.session = None;
        self.phase = Phase::Idle;
        self.emit(UiEvent::CountdownCleared);
        self.emit(UiEvent::SessionAborted(reason));
        self.emit(UiEvent::Status(READY_STATUS.to_string()));
        self.emit(UiEvent::ShutterEnabled(true));
    }

    pub fn drain_events(&mut self) -> Vec<UiEvent> {
        self.events.drain(..).collect()
    }

    fn begin_shot(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let shot = session.frames().len() + 1;
        let total = session.shot_count();
        self.emit(UiEvent::Status(taking_status(shot, total)));
        self.emit(UiEvent::Countdown(self.timing.countdown_from));
        self.phase = Phase::CountingDown { remaining: self.timing.countdown_from };
    }

    fn emit(&mut self, event: UiEvent) {
        self.events.push_back(event);
    }

    fn invalid(&self, operation: &'static str) -> PhotoboothError {
        PhotoboothError::InvalidTransition {
            phase: self.phase.to_string(),
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::Composer;
    use crate::footer::FooterStamp;
    use crate::template::LayoutMetrics;
    use chrono::NaiveDate;
    use image::{Rgb, RgbImage};

    fn controller() -> SessionController {
        SessionController::new(SessionTiming::default(), Template::Strip)
    }

    fn frame() -> FrameSnapshot {
        FrameSnapshot::from_image(RgbImage::from_pixel(80, 60, Rgb([1, 2, 3])))
    }

    #[derive(Debug, Default, PartialEq)]
    struct Tally {
        countdowns: usize,
        captures: usize,
        waits: Vec<Duration>,
    }

    /// Drive a session to completion the way the booth does, without sleeping.
    fn run_to_completion(controller: &mut SessionController) -> Tally {
        let mut tally = Tally::default();
        loop {
            match controller.next_action() {
                Action::None => break,
                Action::Wait(d) => {
                    tally.waits.push(d);
                    controller.timer_fired().unwrap();
                }
                Action::Capture => {
                    tally.captures += 1;
                    controller.record_frame(frame()).unwrap();
                }
                Action::Compose => {
                    let session = controller.take_composition_input().unwrap();
                    let composer = Composer::new(LayoutMetrics::default(), Rgb([255, 255, 255]), FooterStamp::blank());
                    let image = composer
                        .compose(session.frames(), session.template(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
                        .unwrap();
                    controller.finish(image).unwrap();
                }
            }
            for event in controller.drain_events() {
                if let UiEvent::Countdown(n) = event {
                    if n == controller.timing().countdown_from {
                        tally.countdowns += 1;
                    }
                }
            }
        }
        tally
    }

    #[test]
    fn test_starts_idle() {
        let controller = controller();
        assert!(controller.is_idle());
        assert_eq!(controller.next_action(), Action::None);
        assert!(controller.session().is_none());
    }

    #[test]
    fn test_single_session_runs_one_cycle() {
        let mut controller = controller();
        assert!(controller.start_session(Template::Single));
        let tally = run_to_completion(&mut controller);
        assert_eq!(tally.countdowns, 1);
        assert_eq!(tally.captures, 1);
        assert!(controller.is_idle());
    }

    #[test]
    fn test_strip_and_grid_sessions_run_four_cycles() {
        for template in [Template::Strip, Template::Grid] {
            let mut controller = controller();
            assert!(controller.start_session(template));
            let tally = run_to_completion(&mut controller);
            assert_eq!(tally.countdowns, 4, "{}", template);
            assert_eq!(tally.captures, 4, "{}", template);
        }
    }

    #[test]
    fn test_wait_sequence_for_single_session() {
        let mut controller = controller();
        controller.start_session(Template::Single);
        let tally = run_to_completion(&mut controller);
        let timing = SessionTiming::default();
        assert_eq!(
            tally.waits,
            vec![timing.tick, timing.tick, timing.tick, timing.settle, timing.develop]
        );
    }

    #[test]
    fn test_event_sequence_for_single_session() {
        let mut controller = controller();
        controller.start_session(Template::Single);

        let mut events = controller.drain_events();
        while controller.next_action() != Action::Capture {
            controller.timer_fired().unwrap();
            events.extend(controller.drain_events());
        }
        controller.record_frame(frame()).unwrap();
        events.extend(controller.drain_events());
        controller.timer_fired().unwrap();
        events.extend(controller.drain_events());

        let rendered: Vec<String> = events
            .iter()
            .map(|e| match e {
                UiEvent::Status(s) => format!("status:{}", s),
                UiEvent::Countdown(n) => format!("count:{}", n),
                UiEvent::CountdownCleared => "cleared".to_string(),
                UiEvent::Flash => "flash".to_string(),
                UiEvent::ShutterEnabled(on) => format!("shutter:{}", on),
                UiEvent::ResultCleared => "result-cleared".to_string(),
                UiEvent::Composed(_) => "composed".to_string(),
                UiEvent::SessionAborted(_) => "aborted".to_string(),
            })
            .collect();

        assert_eq!(
            rendered,
            vec![
                "shutter:false",
                "result-cleared",
                "status:Taking 1/1",
                "count:3",
                "count:2",
                "count:1",
                "cleared",
                "flash",
                "status:Developing...",
            ]
        );
    }

    #[test]
    fn test_frames_appended_in_capture_order() {
        let mut controller = controller();
        controller.start_session(Template::Grid);
        let mut shade = 0u8;
        while controller.next_action() != Action::Compose {
            match controller.next_action() {
                Action::Wait(_) => controller.timer_fired().unwrap(),
                Action::Capture => {
                    shade += 1;
                    let image = RgbImage::from_pixel(4, 3, Rgb([shade, 0, 0]));
                    controller.record_frame(FrameSnapshot::from_image(image)).unwrap();
                }
                other => panic!("unexpected action {:?}", other),
            }
        }
        let session = controller.take_composition_input().unwrap();
        let shades: Vec<u8> = session.frames().iter().map(|f| f.image().get_pixel(0, 0)[0]).collect();
        assert_eq!(shades, vec![1, 2, 3, 4]);
        assert!(controller.session().is_none());
    }

    #[test]
    fn test_start_while_busy_changes_nothing() {
        let mut controller = controller();
        assert!(controller.start_session(Template::Strip));
        controller.timer_fired().unwrap();
        controller.drain_events();
        let phase = controller.phase();

        assert!(!controller.start_session(Template::Single));
        assert_eq!(controller.phase(), phase);
        assert_eq!(controller.selected_template(), Template::Strip);
        assert_eq!(controller.session().unwrap().template(), Template::Strip);
        assert_eq!(controller.session().unwrap().frames().len(), 0);
        assert!(controller.drain_events().is_empty());
    }

    #[test]
    fn test_busy_guard_keeps_captured_frames() {
        let mut controller = controller();
        controller.start_session(Template::Strip);
        while controller.next_action() != Action::Capture {
            controller.timer_fired().unwrap();
        }
        controller.record_frame(frame()).unwrap();
        assert!(!controller.start_session(Template::Strip));
        assert_eq!(controller.session().unwrap().frames().len(), 1);
    }

    #[test]
    fn test_select_template_only_when_idle() {
        let mut controller = controller();
        assert!(controller.select_template(Template::Grid));
        assert_eq!(controller.selected_template(), Template::Grid);

        controller.start_session(Template::Grid);
        assert!(!controller.select_template(Template::Single));
        assert_eq!(controller.selected_template(), Template::Grid);
    }

    #[test]
    fn test_out_of_phase_calls_are_rejected() {
        let mut controller = controller();
        assert!(controller.timer_fired().is_err());
        assert!(controller.record_frame(frame()).is_err());
        assert!(controller.take_composition_input().is_err());

        controller.start_session(Template::Single);
        // still counting down
        assert!(controller.record_frame(frame()).is_err());
        assert!(controller.take_composition_input().is_err());
        assert!(matches!(controller.phase(), Phase::CountingDown { remaining: 3 }));
    }

    #[test]
    fn test_abort_returns_to_idle_and_allows_restart() {
        let mut controller = controller();
        controller.start_session(Template::Strip);
        while controller.next_action() != Action::Capture {
            controller.timer_fired().unwrap();
        }
        controller.drain_events();

        controller.abort("camera disconnected");
        assert!(controller.is_idle());
        assert!(controller.session().is_none());

        let events = controller.drain_events();
        assert!(events.iter().any(|e| matches!(e, UiEvent::SessionAborted(r) if r == "camera disconnected")));
        assert!(matches!(events.last(), Some(UiEvent::ShutterEnabled(true))));

        assert!(controller.start_session(Template::Single));
        let tally = run_to_completion(&mut controller);
        assert_eq!(tally.captures, 1);
    }

    #[test]
    fn test_finish_emits_result_and_ready_status() {
        let mut controller = controller();
        controller.start_session(Template::Single);
        run_to_completion(&mut controller);
        // run_to_completion drains events; start another run and inspect the tail
        controller.start_session(Template::Single);
        loop {
            match controller.next_action() {
                Action::Wait(_) => controller.timer_fired().unwrap(),
                Action::Capture => controller.record_frame(frame()).unwrap(),
                Action::Compose => break,
                Action::None => unreachable!(),
            }
        }
        controller.drain_events();
        let session = controller.take_composition_input().unwrap();
        let composer = Composer::new(LayoutMetrics::default(), Rgb([255, 255, 255]), FooterStamp::blank());
        let image = composer
            .compose(session.frames(), session.template(), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap())
            .unwrap();
        controller.finish(image).unwrap();

        let events = controller.drain_events();
        assert!(matches!(events[0], UiEvent::Composed(ref img) if img.template() == Template::Single));
        assert!(matches!(events[1], UiEvent::Status(ref s) if s == READY_STATUS));
        assert!(matches!(events[2], UiEvent::ShutterEnabled(true)));
        assert!(controller.is_idle());
    }

    #[test]
    fn test_session_rejects_extra_frames() {
        let mut session = Session::new(Template::Single);
        session.push(frame()).unwrap();
        assert!(session.is_complete());
        assert!(session.push(frame()).is_err());
        assert_eq!(session.frames().len(), 1);
    }
}
