use anyhow::{Context, Result};
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::template::{LayoutMetrics, Template};

pub const CONFIG_FILE: &str = "photobooth_config.toml";

/// Upper bound for any single layout metric, in pixels.
pub const MAX_LAYOUT_METRIC: u32 = 4096;
/// Upper bound for either side of a composed canvas, in pixels.
pub const MAX_CANVAS_SIDE: u32 = 16384;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub camera: CameraConfig,
    pub session: SessionConfig,
    pub layout: LayoutConfig,
    pub footer: FooterConfig,
    pub export: ExportConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Camera,
    TestPattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub source: SourceKind,
    pub command: String,
    pub fallback_command: String,
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub mirror: bool,
    pub fallback_to_test_pattern: bool,
    pub preview_path: PathBuf,
    pub capture_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_template: Template,
    pub countdown_from: u8,
    pub tick_ms: u64,
    pub settle_ms: u64,
    pub develop_ms: u64,
    pub flash_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub slot_width: u32,
    pub slot_height: u32,
    pub gap: u32,
    pub padding: u32,
    pub footer_height: u32,
    pub background: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FooterConfig {
    pub brand_text: String,
    pub brand_font: PathBuf,
    pub date_font: PathBuf,
    pub brand_size: f32,
    pub date_size: f32,
    pub brand_color: String,
    pub date_color: String,
    pub baseline_offset: u32,
    pub date_line_offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub jpeg_quality: u8,
    pub ask_location: bool,
    pub print_command: String,
    pub print_args: Vec<String>,
    pub print_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub splash_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Camera,
            command: "rpicam-still".to_string(),
            fallback_command: "raspistill".to_string(),
            width: 1280,
            height: 720,
            quality: 95,
            mirror: true,
            fallback_to_test_pattern: false,
            preview_path: PathBuf::from("/tmp/photobooth_preview.jpg"),
            capture_path: PathBuf::from("/tmp/photobooth_capture.jpg"),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_template: Template::Strip,
            countdown_from: 3,
            tick_ms: 1000,
            settle_ms: 800,
            develop_ms: 800,
            flash_ms: 150,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let metrics = LayoutMetrics::default();
        Self {
            slot_width: metrics.slot_width,
            slot_height: metrics.slot_height,
            gap: metrics.gap,
            padding: metrics.padding,
            footer_height: metrics.footer_height,
            background: "#ffffff".to_string(),
        }
    }
}

impl Default for FooterConfig {
    fn default() -> Self {
        Self {
            brand_text: "photobooth".to_string(),
            brand_font: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSerif-Italic.ttf"),
            date_font: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            brand_size: 40.0,
            date_size: 16.0,
            brand_color: "#2D2D35".to_string(),
            date_color: "#999999".to_string(),
            baseline_offset: 50,
            date_line_offset: 35,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("photos"),
            file_prefix: "photobooth".to_string(),
            jpeg_quality: 95,
            ask_location: false,
            print_command: "lp".to_string(),
            print_args: Vec::new(),
            print_delay_ms: 500,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 860,
            fullscreen: true,
            splash_ms: 2500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            session: SessionConfig::default(),
            layout: LayoutConfig::default(),
            footer: FooterConfig::default(),
            export: ExportConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

impl LayoutConfig {
    pub fn metrics(&self) -> LayoutMetrics {
        LayoutMetrics {
            slot_width: self.slot_width,
            slot_height: self.slot_height,
            gap: self.gap,
            padding: self.padding,
            footer_height: self.footer_height,
        }
    }

    pub fn background_color(&self) -> Result<Rgb<u8>> {
        parse_hex_color(&self.background)
    }
}

impl SessionConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn develop(&self) -> Duration {
        Duration::from_millis(self.develop_ms)
    }

    pub fn flash(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from(CONFIG_FILE);

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            log::info!("Config file not found, creating default configuration");
            let default_config = Self::default();
            default_config.save_to_file(&config_path)?;
            Ok(default_config)
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| "Failed to parse configuration file")?;

        log::info!("Configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
            }
        }

        std::fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow::anyhow!("Invalid camera resolution"));
        }

        if self.session.countdown_from == 0 {
            return Err(anyhow::anyhow!("Countdown must start at 1 or more"));
        }

        let layout = &self.layout;
        if layout.slot_width == 0 || layout.slot_height == 0 {
            return Err(anyhow::anyhow!("Invalid slot dimensions"));
        }
        let metrics = [
            layout.slot_width,
            layout.slot_height,
            layout.gap,
            layout.padding,
            layout.footer_height,
        ];
        if metrics.iter().any(|&v| v > MAX_LAYOUT_METRIC) {
            return Err(anyhow::anyhow!(
                "Layout metrics must be at most {} pixels",
                MAX_LAYOUT_METRIC
            ));
        }
        for template in Template::all() {
            let (w, h) = template.canvas_size(&layout.metrics());
            if w > MAX_CANVAS_SIDE || h > MAX_CANVAS_SIDE {
                return Err(anyhow::anyhow!(
                    "{} canvas would be {}x{}, larger than {} pixels per side",
                    template, w, h, MAX_CANVAS_SIDE
                ));
            }
        }
        layout.background_color().context("Invalid layout background")?;

        if self.footer.baseline_offset > layout.footer_height + layout.padding {
            return Err(anyhow::anyhow!("Footer baseline lies outside the footer band"));
        }
        if self.footer.brand_size <= 0.0 || self.footer.date_size <= 0.0 {
            return Err(anyhow::anyhow!("Invalid footer font size"));
        }
        parse_hex_color(&self.footer.brand_color).context("Invalid footer brand color")?;
        parse_hex_color(&self.footer.date_color).context("Invalid footer date color")?;

        if !(1..=100).contains(&self.export.jpeg_quality) {
            return Err(anyhow::anyhow!("Invalid JPEG quality: {}", self.export.jpeg_quality));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow::anyhow!("Invalid display dimensions"));
        }

        Ok(())
    }

    pub fn create_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.export.output_dir)
            .with_context(|| format!("Failed to create export directory: {}",
                self.export.output_dir.display()))?;

        log::info!("Created necessary directories");
        Ok(())
    }
}

/// Parse `#rrggbb` (or `rrggbb`) into an RGB pixel.
pub fn parse_hex_color(color: &str) -> Result<Rgb<u8>> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(anyhow::anyhow!("Expected #rrggbb color, got '{}'", color));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .with_context(|| format!("Invalid hex digits in color '{}'", color))
    };
    Ok(Rgb([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
}

// Configuration builder for easier setup
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn source(mut self, source: SourceKind) -> Self {
        self.config.camera.source = source;
        self
    }

    pub fn default_template(mut self, template: Template) -> Self {
        self.config.session.default_template = template;
        self
    }

    pub fn timing(mut self, tick_ms: u64, settle_ms: u64, develop_ms: u64) -> Self {
        self.config.session.tick_ms = tick_ms;
        self.config.session.settle_ms = settle_ms;
        self.config.session.develop_ms = develop_ms;
        self
    }

    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.export.output_dir = dir.into();
        self
    }

    pub fn fullscreen(mut self, enabled: bool) -> Self {
        self.config.display.fullscreen = enabled;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Environment-specific configuration presets
impl Config {
    pub fn raspberry_pi_7inch() -> Self {
        Config {
            display: DisplayConfig {
                width: 800,
                height: 480,
                fullscreen: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn development_desktop() -> Self {
        Config {
            camera: CameraConfig {
                source: SourceKind::TestPattern,
                fallback_to_test_pattern: true,
                ..Default::default()
            },
            display: DisplayConfig {
                width: 1280,
                height: 800,
                fullscreen: false,
                splash_ms: 500,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.layout.metrics(), LayoutMetrics::default());
        assert_eq!(config.session.tick(), Duration::from_secs(1));
        assert_eq!(config.session.default_template, Template::Strip);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .source(SourceKind::TestPattern)
            .default_template(Template::Grid)
            .timing(10, 5, 5)
            .fullscreen(false)
            .build()
            .unwrap();

        assert_eq!(config.camera.source, SourceKind::TestPattern);
        assert_eq!(config.session.default_template, Template::Grid);
        assert_eq!(config.session.settle(), Duration::from_millis(5));
        assert!(!config.display.fullscreen);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.export.jpeg_quality = 0;
        assert!(config.validate().is_err());

        config.export.jpeg_quality = 95;
        config.session.countdown_from = 0;
        assert!(config.validate().is_err());

        config.session.countdown_from = 3;
        config.layout.background = "white".to_string();
        assert!(config.validate().is_err());

        config.layout.background = "#fff000".to_string();
        config.footer.baseline_offset = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_layout_metrics_are_capped() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Would overflow the canvas arithmetic
        config.layout.slot_height = u32::MAX;
        assert!(config.validate().is_err());

        // Each metric is in range but the strip canvas is too tall
        config.layout.slot_height = 4090;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("strip"), "{}", err);

        config.layout.slot_height = 450;
        config.layout.gap = MAX_LAYOUT_METRIC + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ffffff").unwrap(), Rgb([255, 255, 255]));
        assert_eq!(parse_hex_color("#2D2D35").unwrap(), Rgb([45, 45, 53]));
        assert_eq!(parse_hex_color("999999").unwrap(), Rgb([153, 153, 153]));
        assert!(parse_hex_color("#999").is_err());
        assert!(parse_hex_color("#gg0000").is_err());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("test_config.toml");

        let original_config = Config::development_desktop();
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = Config::load_from_file(&config_path).unwrap();

        assert_eq!(original_config.camera.source, loaded_config.camera.source);
        assert_eq!(original_config.display.width, loaded_config.display.width);
        assert_eq!(original_config.session.default_template, loaded_config.session.default_template);
        assert_eq!(original_config.footer.brand_text, loaded_config.footer.brand_text);
    }

    #[test]
    fn test_template_serializes_lowercase() {
        let contents = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(contents.contains("default_template = \"strip\""));
        assert!(contents.contains("source = \"camera\""));
    }

    #[test]
    fn test_preset_configs() {
        assert!(Config::raspberry_pi_7inch().validate().is_ok());
        assert!(Config::development_desktop().validate().is_ok());
    }
}
