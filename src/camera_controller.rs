use async_trait::async_trait;
use image::{ImageBuffer, RgbImage};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::{CameraConfig, SourceKind};
use crate::error::{PhotoboothError, PhotoboothResult};

/// Live frame provider the booth captures from.
#[async_trait]
pub trait VideoSource: Send + Sync {
    fn name(&self) -> &str;

    /// Most recent frame, for the live preview. Never blocks on the device.
    fn latest_frame(&self) -> PhotoboothResult<RgbImage>;

    /// Grab a single still for a session.
    async fn grab_frame(&self) -> PhotoboothResult<RgbImage> {
        self.latest_frame()
    }
}

/// Open the source described by `config`.
///
/// Fails with [`PhotoboothError::SourceUnavailable`] when the camera tooling is
/// missing, unless the test-pattern fallback is enabled.
pub async fn open_video_source(config: &CameraConfig) -> PhotoboothResult<Arc<dyn VideoSource>> {
    match config.source {
        SourceKind::TestPattern => {
            log::info!("Using test pattern video source");
            Ok(Arc::new(TestPatternSource::new(config.width, config.height)))
        }
        SourceKind::Camera => match CameraController::new(config.clone()).await {
            Ok(camera) => {
                camera.start_preview()?;
                Ok(Arc::new(camera))
            }
            Err(e) if config.fallback_to_test_pattern => {
                log::warn!("{}. Falling back to test pattern.", e);
                Ok(Arc::new(TestPatternSource::new(config.width, config.height)))
            }
            Err(e) => Err(e),
        },
    }
}

/// Camera controller for the Raspberry Pi camera using the rpicam/libcamera apps
pub struct CameraController {
    config: CameraConfig,
    /// Binary that answered the probe (`rpicam-still` or the legacy fallback)
    command: String,
    /// Preview process handle
    preview_process: Mutex<Option<Child>>,
}

impl CameraController {
    /// Probe the camera tooling and create a controller
    pub async fn new(config: CameraConfig) -> PhotoboothResult<Self> {
        log::info!("Initializing camera controller...");

        let mut last_error = String::new();
        let candidates = [config.command.clone(), config.fallback_command.clone()];
        for command in candidates {
            if command.is_empty() {
                continue;
            }
            match tokio::process::Command::new(&command).arg("--help").output().await {
                Ok(_) => {
                    log::info!("Camera initialized successfully (using {})", command);
                    return Ok(Self {
                        config,
                        command,
                        preview_process: Mutex::new(None),
                    });
                }
                Err(e) => {
                    log::warn!("{} not found: {}", command, e);
                    last_error = format!("{}: {}", command, e);
                }
            }
        }

        Err(PhotoboothError::source_unavailable(format!(
            "camera tooling not found ({})",
            last_error
        )))
    }

    fn is_legacy(&self) -> bool {
        self.command == "raspistill"
    }

    /// Arguments for a single immediate still written to `output`.
    fn still_args(&self, output: &Path) -> Vec<String> {
        let c = &self.config;
        if self.is_legacy() {
            vec![
                "-o".into(), output.display().to_string(),
                "-w".into(), c.width.to_string(),
                "-h".into(), c.height.to_string(),
                "-q".into(), c.quality.to_string(),
                "-t".into(), "100".into(),
                "-n".into(),
            ]
        } else {
            vec![
                "-o".into(), output.display().to_string(),
                "--width".into(), c.width.to_string(),
                "--height".into(), c.height.to_string(),
                "--quality".into(), c.quality.to_string(),
                "--immediate".into(),
                "--nopreview".into(),
                "--timeout".into(), "100".into(),
            ]
        }
    }

    /// Arguments for the looping preview process.
    fn preview_args(&self) -> Vec<String> {
        let output = self.config.preview_path.display().to_string();
        if self.is_legacy() {
            return vec![
                "-o".into(), output,
                "-w".into(), "800".into(),
                "-h".into(), "450".into(),
                "-q".into(), "70".into(),
                "-t".into(), "0".into(),
                "-tl".into(), "100".into(),
                "-n".into(),
            ];
        }
        vec![
            "-o".into(), output,
            "--width".into(), "800".into(),
            "--height".into(), "450".into(),
            "--quality".into(), "70".into(),
            "--timeout".into(), "0".into(),
            "--nopreview".into(),
            "--timelapse".into(), "100".into(),
        ]
    }

    /// Start the live preview (continuous capture into the preview file)
    pub fn start_preview(&self) -> PhotoboothResult<()> {
        self.stop_preview();

        let args = self.preview_args();
        log::info!("Preview command: {} {}", self.command, args.join(" "));

        let child = Command::new(&self.command)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PhotoboothError::source_unavailable(format!("failed to start preview: {}", e)))?;

        if let Ok(mut process) = self.preview_process.lock() {
            *process = Some(child);
        }
        log::info!("Camera preview started successfully");
        Ok(())
    }

    /// Stop live preview
    pub fn stop_preview(&self) {
        if let Ok(mut guard) = self.preview_process.lock() {
            if let Some(mut process) = guard.take() {
                let _ = process.kill();
                let _ = process.wait();
                log::info!("Camera preview stopped");
            }
        }
    }

    fn is_previewing(&self) -> bool {
        self.preview_process
            .lock()
            .map(|process| process.is_some())
            .unwrap_or(false)
    }

    fn capture_path(&self) -> PathBuf {
        self.config.capture_path.clone()
    }

    /// Run the still command once and load the image it wrote.
    async fn capture_still(&self) -> PhotoboothResult<RgbImage> {
        let path = self.capture_path();
        if path.exists() {
            let _ = tokio::fs::remove_file(&path).await;
        }

        let args = self.still_args(&path);
        log::info!("Capture command: {} {}", self.command, args.join(" "));

        let output = tokio::process::Command::new(&self.command)
            .args(&args)
            .output()
            .await
            .map_err(|e| PhotoboothError::capture(format!("{} failed to run: {}", self.command, e)))?;

        if !output.status.success() {
            log::warn!("stderr: {}", String::from_utf8_lossy(&output.stderr));
            return Err(PhotoboothError::capture(format!(
                "{} exited with {}",
                self.command, output.status
            )));
        }

        let img = image::open(&path)
            .map_err(|e| PhotoboothError::capture(format!("failed to load captured image: {}", e)))?;
        let _ = tokio::fs::remove_file(&path).await;

        let rgb_img = img.to_rgb8();
        log::info!("Photo captured successfully: {}x{}", rgb_img.width(), rgb_img.height());
        Ok(rgb_img)
    }
}

#[async_trait]
impl VideoSource for CameraController {
    fn name(&self) -> &str {
        &self.command
    }

    fn latest_frame(&self) -> PhotoboothResult<RgbImage> {
        let path = &self.config.preview_path;
        if !path.exists() {
            return Err(PhotoboothError::capture(format!(
                "preview image not written yet: {}",
                path.display()
            )));
        }

        match image::open(path) {
            Ok(img) => Ok(img.to_rgb8()),
            Err(e) => {
                // The preview process may be halfway through rewriting the file
                log::debug!("Preview frame not readable: {}", e);
                Err(PhotoboothError::capture(format!("preview frame not readable: {}", e)))
            }
        }
    }

    /// The camera belongs to one process at a time, so the preview is paused
    /// around the still and restarted whether or not the capture worked.
    async fn grab_frame(&self) -> PhotoboothResult<RgbImage> {
        let previewing = self.is_previewing();
        if previewing {
            self.stop_preview();
        }

        let result = self.capture_still().await;

        if previewing {
            if let Err(e) = self.start_preview() {
                log::warn!("Failed to restart preview after capture: {}", e);
            }
        }
        result
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        self.stop_preview();

        for path in [&self.config.preview_path, &self.config.capture_path] {
            if path.exists() {
                let _ = std::fs::remove_file(path);
            }
        }
        log::info!("Camera controller dropped");
    }
}

/// Animated gradient frames for development machines without a camera.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    started: Instant,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            started: Instant::now(),
        }
    }

    /// Frame for a given animation time in seconds.
    pub fn frame_at(&self, time: f32) -> RgbImage {
        let (w, h) = (self.width.max(1), self.height.max(1));
        ImageBuffer::from_fn(w, h, |x, y| {
            let r = (x as f32 / w as f32 * 155.0) + (time * 1.3).sin() * 50.0 + 50.0;
            let g = (y as f32 / h as f32 * 155.0) + (time * 0.7).cos() * 50.0 + 50.0;
            let b = ((x + y) as f32 / (w + h) as f32 * 155.0) + (time * 1.9).sin() * 50.0 + 50.0;
            image::Rgb([r as u8, g as u8, b as u8])
        })
    }
}

#[async_trait]
impl VideoSource for TestPatternSource {
    fn name(&self) -> &str {
        "test pattern"
    }

    fn latest_frame(&self) -> PhotoboothResult<RgbImage> {
        Ok(self.frame_at(self.started.elapsed().as_secs_f32()))
    }
}
