use std::path::PathBuf;

use serde::Deserialize;

/// The only project schema tag this renderer understands.
pub const SUPPORTED_VERSION: &str = "1.0";

/// Canvas used when the project does not specify one. Gaps and layer math
/// are normalized to this size.
pub const FALLBACK_CANVAS: (u32, u32) = (1920, 1080);

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub clips: Option<Vec<ClipSpec>>,
    #[serde(default)]
    pub audio: Option<AudioSpec>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub output: Option<OutputSpec>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl Project {
    pub fn audio_path(&self) -> Option<&PathBuf> {
        self.audio.as_ref().and_then(|audio| audio.path.as_ref())
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        self.output.as_ref().and_then(|output| output.path.as_ref())
    }

    /// Canvas size when explicitly configured with positive dimensions.
    pub fn canvas(&self) -> Option<(u32, u32)> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.canvas.as_ref())
            .and_then(Canvas::size)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioSpec {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputSpec {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub canvas: Option<Canvas>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Canvas {
    #[serde(default, deserialize_with = "lenient::num")]
    pub width: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub height: Option<f64>,
}

impl Canvas {
    pub fn size(&self) -> Option<(u32, u32)> {
        let width = self.width.unwrap_or(0.0);
        let height = self.height.unwrap_or(0.0);
        if width >= 1.0 && height >= 1.0 {
            Some((width as u32, height as u32))
        } else {
            None
        }
    }
}

/// One source clip on the timeline. All numeric fields are parsed leniently:
/// a malformed value degrades to its default instead of aborting the render.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipSpec {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub trim_start: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub trim_end: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub start: Option<f64>,
    #[serde(default, deserialize_with = "lenient::fill_method")]
    pub fill_method: FillMethod,
    #[serde(default, deserialize_with = "lenient::num")]
    pub hue: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub contrast: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub brightness: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub rotate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flip_h: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flip_v: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub invert: bool,
}

impl ClipSpec {
    pub fn trim_start(&self) -> f64 {
        self.trim_start.unwrap_or(0.0).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillMethod {
    #[default]
    Loop,
    PingPong,
    Stretch,
}

/// Visual overlays composited on top of the concatenated video, in stack
/// order. An unknown `type` tag is a load error, not a silent no-op.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayerSpec {
    Spectrograph(SpectrographLayer),
    Image(ImageLayer),
    Text(TextLayer),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrographLayer {
    #[serde(default, deserialize_with = "lenient::spectro_mode")]
    pub mode: SpectroMode,
    #[serde(default, deserialize_with = "lenient::path_mode")]
    pub path_mode: PathMode,
    #[serde(default, deserialize_with = "lenient::num")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub opacity: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub invert: bool,
    #[serde(default, deserialize_with = "lenient::count")]
    pub bar_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub dot_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub solid_point_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub bar_width_pct: Option<f64>,
    #[serde(default)]
    pub color: Option<String>,
}

impl SpectrographLayer {
    pub fn width(&self) -> u32 {
        self.width.unwrap_or(640)
    }

    pub fn height(&self) -> u32 {
        self.height.unwrap_or(200)
    }

    pub fn opacity(&self) -> f64 {
        self.opacity.unwrap_or(1.0)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.unwrap_or(0.0), self.y.unwrap_or(0.0))
    }

    /// Native resolution width before nearest-neighbor upscale: a mode
    /// specific point/bar/dot count when given, else the pixel width.
    pub fn base_width(&self) -> u32 {
        let count = match self.mode {
            SpectroMode::Dots => self.dot_count,
            SpectroMode::Solid => self.solid_point_count,
            SpectroMode::Bar | SpectroMode::Line => self.bar_count,
        };
        match count {
            Some(count) if count > 0 => count,
            _ => self.width(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectroMode {
    #[default]
    Bar,
    Line,
    Dots,
    Solid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    #[default]
    Straight,
    Circular,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLayer {
    #[serde(default)]
    pub image_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub width: Option<u32>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub height: Option<u32>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub opacity: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub rotate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub reverse: bool,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub invert: bool,
    #[serde(default, deserialize_with = "lenient::count")]
    pub outline_width: Option<u32>,
    #[serde(default)]
    pub outline_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub glow_amount: Option<u32>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub glow_opacity: Option<f64>,
    #[serde(default)]
    pub glow_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub shadow_distance: Option<u32>,
    #[serde(default)]
    pub shadow_color: Option<String>,
}

impl ImageLayer {
    /// Source path when one is actually set; empty and whitespace-only
    /// strings count as unset.
    pub fn source_path(&self) -> Option<&PathBuf> {
        self.image_path
            .as_ref()
            .filter(|path| !path.to_string_lossy().trim().is_empty())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width.unwrap_or(100), self.height.unwrap_or(100))
    }

    pub fn opacity(&self) -> f64 {
        self.opacity.unwrap_or(1.0)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.unwrap_or(0.0), self.y.unwrap_or(0.0))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLayer {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub font_size: Option<u32>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient::num")]
    pub opacity: Option<f64>,
    #[serde(default)]
    pub outline_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub outline_width: Option<u32>,
    #[serde(default)]
    pub shadow_color: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub shadow_distance: Option<u32>,
}

impl TextLayer {
    pub fn text(&self) -> &str {
        non_empty(&self.text).unwrap_or("Text")
    }

    pub fn font(&self) -> &str {
        non_empty(&self.font).unwrap_or("Segoe UI")
    }

    pub fn font_size(&self) -> u32 {
        self.font_size.unwrap_or(12)
    }

    pub fn opacity(&self) -> f64 {
        self.opacity.unwrap_or(1.0)
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x.unwrap_or(0.0), self.y.unwrap_or(0.0))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Parse-or-default deserializers. A field that fails to parse degrades to
/// `None`/`false` so one bad value cannot abort an otherwise valid render.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{FillMethod, PathMode, SpectroMode};

    pub fn num<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(num_from(&value))
    }

    pub fn count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(num_from(&value)
            .filter(|v| v.is_finite() && *v >= 1.0)
            .map(|v| v as u32))
    }

    pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(flag) => flag,
            Value::Number(number) => number.as_f64().is_some_and(|v| v != 0.0),
            Value::String(text) => {
                matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "on" | "yes")
            }
            _ => false,
        })
    }

    pub fn fill_method<'de, D>(deserializer: D) -> Result<FillMethod, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match text_of(&value).as_deref() {
            Some("pingpong") => FillMethod::PingPong,
            Some("stretch") => FillMethod::Stretch,
            _ => FillMethod::Loop,
        })
    }

    pub fn spectro_mode<'de, D>(deserializer: D) -> Result<SpectroMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match text_of(&value).as_deref() {
            Some("line") => SpectroMode::Line,
            Some("dots") => SpectroMode::Dots,
            Some("solid") => SpectroMode::Solid,
            _ => SpectroMode::Bar,
        })
    }

    pub fn path_mode<'de, D>(deserializer: D) -> Result<PathMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(match text_of(&value).as_deref() {
            Some("circular") => PathMode::Circular,
            _ => PathMode::Straight,
        })
    }

    fn num_from(value: &Value) -> Option<f64> {
        match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn text_of(value: &Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text.trim().to_ascii_lowercase()),
            _ => None,
        }
    }
}
