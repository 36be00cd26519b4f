use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Layout templates a session can be composed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Single,
    #[default]
    Strip,
    Grid,
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Template::Single),
            "strip" => Ok(Template::Strip),
            "grid" => Ok(Template::Grid),
            other => Err(format!("unknown template: {}", other)),
        }
    }
}

impl Template {
    pub fn all() -> &'static [Template] {
        &[Template::Single, Template::Strip, Template::Grid]
    }

    pub fn id(&self) -> &'static str {
        match self {
            Template::Single => "single",
            Template::Strip => "strip",
            Template::Grid => "grid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Template::Single => "Single",
            Template::Strip => "Strip",
            Template::Grid => "Grid",
        }
    }

    /// Number of countdown/capture cycles a session runs.
    pub fn shot_count(&self) -> usize {
        match self {
            Template::Single => 1,
            Template::Strip | Template::Grid => 4,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots(&LayoutMetrics::default()).len()
    }

    /// Output canvas size `(width, height)` for these metrics.
    pub fn canvas_size(&self, m: &LayoutMetrics) -> (u32, u32) {
        match self {
            Template::Single => (
                m.slot_width + 2 * m.padding,
                m.slot_height + 2 * m.padding + m.footer_height,
            ),
            Template::Strip => (
                m.slot_width + 2 * m.padding,
                4 * m.slot_height + 3 * m.gap + 2 * m.padding + m.footer_height,
            ),
            Template::Grid => (
                2 * m.slot_width + m.gap + 2 * m.padding,
                2 * m.slot_height + m.gap + 2 * m.padding + m.footer_height,
            ),
        }
    }

    /// Slot rectangles in shot order.
    pub fn slots(&self, m: &LayoutMetrics) -> Vec<Slot> {
        let (w, h, p, g) = (m.slot_width, m.slot_height, m.padding, m.gap);
        match self {
            Template::Single => vec![Slot::new(p, p, w, h)],
            Template::Strip => (0..4).map(|i| Slot::new(p, p + i * (h + g), w, h)).collect(),
            Template::Grid => vec![
                Slot::new(p, p, w, h),
                Slot::new(p + w + g, p, w, h),
                Slot::new(p, p + h + g, w, h),
                Slot::new(p + w + g, p + h + g, w, h),
            ],
        }
    }
}

/// Shared geometry constants for every template, in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutMetrics {
    pub slot_width: u32,
    pub slot_height: u32,
    pub gap: u32,
    pub padding: u32,
    pub footer_height: u32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self {
            slot_width: 600,
            slot_height: 450,
            gap: 30,
            padding: 60,
            footer_height: 120,
        }
    }
}

/// A rectangle of the output canvas that receives one cropped frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Slot {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}
