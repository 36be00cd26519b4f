use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::composer::ComposedImage;
use crate::config::ExportConfig;

/// Saves composed images and hands them to the print spooler.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// `photobooth-<unix millis>.jpg`
    pub fn download_file_name(&self, at: DateTime<Local>) -> String {
        format!("{}-{}.jpg", self.config.file_prefix, at.timestamp_millis())
    }

    pub fn print_delay(&self) -> Duration {
        Duration::from_millis(self.config.print_delay_ms)
    }

    pub fn asks_location(&self) -> bool {
        self.config.ask_location
    }

    /// Let the user pick where the download goes. `None` if the dialog was cancelled.
    pub fn pick_download_path(&self, at: DateTime<Local>) -> Option<PathBuf> {
        rfd::FileDialog::new()
            .set_directory(&self.config.output_dir)
            .set_file_name(&self.download_file_name(at))
            .add_filter("JPEG image", &["jpg", "jpeg"])
            .save_file()
    }

    /// Write the image into the export directory under a timestamped name.
    pub fn save_download(&self, image: &ComposedImage, at: DateTime<Local>) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create export directory {}", self.config.output_dir.display())
        })?;

        let path = self.config.output_dir.join(self.download_file_name(at));
        self.save_to(image, &path)?;
        Ok(path)
    }

    pub fn save_to(&self, image: &ComposedImage, path: &Path) -> Result<()> {
        let bytes = image.encode_jpeg(self.config.jpeg_quality)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to save image to {}", path.display()))?;

        log::info!("Saved {}x{} image to {}", image.width(), image.height(), path.display());
        Ok(())
    }

    /// Write a lossless copy to the temp directory and submit it to the print command.
    ///
    /// The spooler runs in the background; its exit status and stderr are
    /// logged once it finishes.
    pub fn print(&self, image: &ComposedImage) -> Result<PathBuf> {
        let path = std::env::temp_dir().join(format!("{}-print.png", self.config.file_prefix));
        image.save_png(&path)?;

        let child = self.spawn_print(&path)?;
        let command = self.config.print_command.clone();
        std::thread::spawn(move || match wait_for_print(child, &command) {
            Ok(()) => log::info!("Print job accepted by {}", command),
            Err(e) => log::error!("{:#}", e),
        });

        Ok(path)
    }

    fn spawn_print(&self, path: &Path) -> Result<Child> {
        log::info!("Print command: {} {:?} {}", self.config.print_command, self.config.print_args, path.display());
        Command::new(&self.config.print_command)
            .args(&self.config.print_args)
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to run print command '{}'", self.config.print_command))
    }
}

/// Reap the spooler process and turn a failed exit into an error carrying its stderr.
fn wait_for_print(child: Child, command: &str) -> Result<()> {
    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for print command '{}'", command))?;
    if !output.status.success() {
        anyhow::bail!(
            "Print command '{}' exited with {}: {}",
            command,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}
