use chrono::Local;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::camera_controller::VideoSource;
use crate::clock::Clock;
use crate::composer::{ComposedImage, Composer};
use crate::error::{PhotoboothError, PhotoboothResult};
use crate::frame::FrameSnapshot;
use crate::session::{Action, SessionController, UiEvent};
use crate::template::Template;

/// Requests from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothCommand {
    SelectTemplate(Template),
    StartSession,
    Shutdown,
}

/// Handle the UI keeps to talk to a running booth task.
#[derive(Clone)]
pub struct BoothHandle {
    commands: mpsc::UnboundedSender<BoothCommand>,
}

impl BoothHandle {
    pub fn send(&self, command: BoothCommand) {
        if let Err(e) = self.commands.send(command) {
            log::error!("Booth task is gone, dropping {:?}", e.0);
        }
    }
}

/// Async driver that owns the session controller and runs sessions against a
/// video source, a clock and the composer.
pub struct Booth<C: Clock> {
    controller: SessionController,
    source: Arc<dyn VideoSource>,
    composer: Composer,
    clock: C,
    mirror: bool,
    events: mpsc::UnboundedSender<UiEvent>,
    commands: mpsc::UnboundedReceiver<BoothCommand>,
    shutdown_requested: bool,
}

impl<C: Clock + 'static> Booth<C> {
    /// Create a booth plus the handle and event stream the UI uses.
    pub fn new(
        controller: SessionController,
        source: Arc<dyn VideoSource>,
        composer: Composer,
        clock: C,
        mirror: bool,
    ) -> (Self, BoothHandle, mpsc::UnboundedReceiver<UiEvent>) {
        let (command_sender, commands) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let booth = Self {
            controller,
            source,
            composer,
            clock,
            mirror,
            events,
            commands,
            shutdown_requested: false,
        };
        (booth, BoothHandle { commands: command_sender }, event_receiver)
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        log::info!("Booth ready (source: {})", self.source.name());
        while let Some(command) = self.commands.recv().await {
            if !self.handle(command).await || self.shutdown_requested {
                break;
            }
        }
        log::info!("Booth stopped");
    }

    /// Returns `false` when the booth should stop.
    async fn handle(&mut self, command: BoothCommand) -> bool {
        match command {
            BoothCommand::SelectTemplate(template) => {
                if self.controller.select_template(template) {
                    log::info!("Template set to {}", template);
                }
                true
            }
            BoothCommand::StartSession => {
                let template = self.controller.selected_template();
                if let Err(e) = self.run_session(template).await {
                    log::error!("Session failed: {}", e);
                }
                true
            }
            BoothCommand::Shutdown => false,
        }
    }

    /// Run one complete session. Returns `Ok(None)` if a session was already active.
    pub async fn run_session(&mut self, template: Template) -> PhotoboothResult<Option<ComposedImage>> {
        if !self.controller.start_session(template) {
            return Ok(None);
        }
        self.flush_events();

        let mut result = None;
        loop {
            match self.controller.next_action() {
                Action::None => break,
                Action::Wait(duration) => {
                    self.clock.sleep(duration).await;
                    self.controller.timer_fired()?;
                }
                Action::Capture => {
                    if let Err(e) = self.capture().await {
                        self.controller.abort(e.to_string());
                        self.flush_events();
                        return Err(e);
                    }
                }
                Action::Compose => match self.compose().await {
                    Ok(image) => {
                        result = Some(image.clone());
                        self.controller.finish(image)?;
                    }
                    Err(e) => {
                        self.controller.abort(e.to_string());
                        self.flush_events();
                        return Err(e);
                    }
                },
            }
            self.flush_events();
            self.reject_pending_commands();
        }

        Ok(result)
    }

    async fn capture(&mut self) -> PhotoboothResult<()> {
        let raw = self.source.grab_frame().await.map_err(|e| match e {
            PhotoboothError::CaptureFault(_) => e,
            other => PhotoboothError::capture(other.to_string()),
        })?;
        self.controller.record_frame(FrameSnapshot::capture(raw, self.mirror))
    }

    async fn compose(&mut self) -> PhotoboothResult<ComposedImage> {
        let session = self.controller.take_composition_input()?;
        log::info!(
            "Composing {} session started at {}",
            session.template(),
            session.started_at().format("%H:%M:%S")
        );
        let composer = self.composer.clone();
        let date = Local::now().date_naive();

        tokio::task::spawn_blocking(move || {
            composer.compose(session.frames(), session.template(), date)
        })
        .await
        .map_err(|e| PhotoboothError::Other(anyhow::anyhow!("composition task failed: {}", e)))?
    }

    fn flush_events(&mut self) {
        for event in self.controller.drain_events() {
            // A closed receiver only means the UI went away
            let _ = self.events.send(event);
        }
    }

    /// Commands that arrive mid-session go through the controller's guards.
    /// Once the session is over the rest stay queued for [`run`](Self::run).
    fn reject_pending_commands(&mut self) {
        while !self.controller.is_idle() {
            let Ok(command) = self.commands.try_recv() else {
                break;
            };
            match command {
                BoothCommand::SelectTemplate(template) => {
                    self.controller.select_template(template);
                }
                BoothCommand::StartSession => {
                    let template = self.controller.selected_template();
                    self.controller.start_session(template);
                }
                BoothCommand::Shutdown => {
                    log::warn!("Shutdown requested mid-session; finishing the session first");
                    self.shutdown_requested = true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footer::FooterStamp;
    use crate::session::{SessionTiming, READY_STATUS};
    use crate::template::LayoutMetrics;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Returns immediately and records every requested delay.
    #[derive(Clone, Default)]
    struct RecordingClock {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Serves solid colored frames in order, failing after `fail_after` grabs.
    struct ScriptedSource {
        colors: Vec<Rgb<u8>>,
        grabs: Mutex<usize>,
        fail_after: Option<usize>,
    }

    impl ScriptedSource {
        fn new(colors: Vec<Rgb<u8>>) -> Self {
            Self { colors, grabs: Mutex::new(0), fail_after: None }
        }

        fn failing_after(colors: Vec<Rgb<u8>>, n: usize) -> Self {
            Self { fail_after: Some(n), ..Self::new(colors) }
        }
    }

    #[async_trait]
    impl VideoSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn latest_frame(&self) -> PhotoboothResult<RgbImage> {
            Ok(RgbImage::from_pixel(800, 600, self.colors[0]))
        }

        async fn grab_frame(&self) -> PhotoboothResult<RgbImage> {
            let mut grabs = self.grabs.lock().unwrap();
            if Some(*grabs) == self.fail_after {
                return Err(PhotoboothError::capture("camera disconnected"));
            }
            let color = self.colors[*grabs % self.colors.len()];
            *grabs += 1;
            Ok(RgbImage::from_pixel(800, 600, color))
        }
    }

    const RED: Rgb<u8> = Rgb([255, 0, 0]);
    const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
    const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

    fn booth(
        source: ScriptedSource,
        clock: RecordingClock,
    ) -> (Booth<RecordingClock>, BoothHandle, mpsc::UnboundedReceiver<UiEvent>) {
        let controller = SessionController::new(SessionTiming::default(), Template::Strip);
        let composer = Composer::new(LayoutMetrics::default(), Rgb([255, 255, 255]), FooterStamp::blank());
        Booth::new(controller, Arc::new(source), composer, clock, true)
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_grid_session_composes_frames_in_order() {
        let clock = RecordingClock::default();
        let (mut booth, _handle, mut events) =
            booth(ScriptedSource::new(vec![RED, GREEN, BLUE, YELLOW]), clock.clone());

        let image = booth.run_session(Template::Grid).await.unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (1350, 1170));
        assert_eq!(*image.image().get_pixel(300, 250), RED);
        assert_eq!(*image.image().get_pixel(1000, 250), GREEN);
        assert_eq!(*image.image().get_pixel(300, 800), BLUE);
        assert_eq!(*image.image().get_pixel(1000, 800), YELLOW);

        let events = drain(&mut events);
        let flashes = events.iter().filter(|e| matches!(e, UiEvent::Flash)).count();
        assert_eq!(flashes, 4);
        assert!(events.iter().any(|e| matches!(e, UiEvent::Composed(_))));
        assert!(booth.controller().is_idle());

        let timing = SessionTiming::default();
        let sleeps = clock.sleeps.lock().unwrap().clone();
        assert_eq!(sleeps.iter().filter(|d| **d == timing.tick).count(), 12);
        assert_eq!(sleeps.iter().filter(|d| **d == timing.settle).count(), 4);
        assert_eq!(sleeps.last(), Some(&timing.develop));
    }

    #[tokio::test]
    async fn test_capture_failure_aborts_to_idle() {
        let (mut booth, _handle, mut events) =
            booth(ScriptedSource::failing_after(vec![RED], 2), RecordingClock::default());

        let result = booth.run_session(Template::Strip).await;
        assert!(matches!(result, Err(PhotoboothError::CaptureFault(_))));
        assert!(booth.controller().is_idle());
        assert!(booth.controller().session().is_none());

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(e, UiEvent::SessionAborted(_))));
        assert!(events.iter().any(|e| matches!(e, UiEvent::Status(s) if s == READY_STATUS)));
        assert!(!events.iter().any(|e| matches!(e, UiEvent::Composed(_))));
    }

    #[tokio::test]
    async fn test_commands_during_session_are_ignored() {
        let (mut booth, handle, _events) =
            booth(ScriptedSource::new(vec![RED]), RecordingClock::default());

        handle.send(BoothCommand::SelectTemplate(Template::Single));
        handle.send(BoothCommand::StartSession);
        let image = booth.run_session(Template::Grid).await.unwrap().unwrap();

        assert_eq!(image.template(), Template::Grid);
        assert_eq!(booth.controller().selected_template(), Template::Grid);
        assert!(booth.controller().is_idle());
    }

    #[tokio::test]
    async fn test_run_loop_handles_commands() {
        let (booth, handle, mut events) =
            booth(ScriptedSource::new(vec![BLUE]), RecordingClock::default());

        handle.send(BoothCommand::SelectTemplate(Template::Single));
        handle.send(BoothCommand::StartSession);
        handle.send(BoothCommand::Shutdown);
        booth.run().await;

        let composed: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Composed(image) => Some(image),
                _ => None,
            })
            .collect();
        assert_eq!(composed.len(), 1);
        assert_eq!(composed[0].template(), Template::Single);
        assert_eq!((composed[0].width(), composed[0].height()), (720, 690));
    }
}
