//! Export configuration.
//!
//! [`ExportConfig`] is built once, validated when an
//! [`Exporter`](crate::Exporter) is constructed, and never changed by an
//! export. It serializes to camelCase JSON so hosts can ship it in a file:
//!
//! ```json
//! {
//!   "styleClass": "britechartStyle",
//!   "defaultFilename": "britechart.png",
//!   "chartBackground": "white",
//!   "imageSourceBase": "data:image/svg+xml;base64,",
//!   "title": { "fontSize": 15.0, "topOffset": 40.0 },
//!   "decodeTimeoutMs": 10000,
//!   "encoder": "auto"
//! }
//! ```
//!
//! Missing fields take their defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExportResult;

// ============================================================================
// EncoderPreference
// ============================================================================

/// Which base64 backend the encoder should resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum EncoderPreference {
    /// Native backend when compiled in, software fallback otherwise.
    #[default]
    Auto,
    /// Native backend only; resolution fails if it is not compiled in.
    Native,
    /// Always use the built-in software backend.
    Software,
}

// ============================================================================
// TitleStyle
// ============================================================================

/// Font and placement of the optional title overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TitleStyle {
    /// CSS font-family list.
    pub font_family: String,

    /// Font size in pixels.
    pub font_size: f32,

    /// CSS font-weight keyword or number.
    pub font_weight: String,

    /// Baseline offset from the top of the chart, in pixels.
    pub top_offset: f32,

    /// Index into the grey colour schema used for the title fill.
    pub color_index: usize,
}

impl Default for TitleStyle {
    fn default() -> Self {
        Self {
            font_family: "'Benton Sans', sans-serif".to_string(),
            font_size: 15.0,
            font_weight: "normal".to_string(),
            top_offset: 40.0,
            color_index: 6,
        }
    }
}

impl TitleStyle {
    /// Font size formatted as a CSS pixel length.
    pub fn font_size_css(&self) -> String {
        format!("{}px", self.font_size)
    }
}

// ============================================================================
// ExportConfig
// ============================================================================

/// Settings shared by every export run through one exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct ExportConfig {
    /// Class carried by `<style>` elements the exporter owns.
    pub style_class: String,

    /// Filename used when a request does not name one.
    pub default_filename: String,

    /// Colour painted behind the chart. Any CSS colour that converts to
    /// sRGB: keywords including `transparent`, hex, `rgb()`, `hsl()`.
    pub chart_background: String,

    /// Prefix of the encoded SVG data URI.
    pub image_source_base: String,

    /// Title overlay settings.
    pub title: TitleStyle,

    /// Upper bound on the image decode wait, in milliseconds.
    pub decode_timeout_ms: u64,

    /// Base64 backend selection.
    pub encoder: EncoderPreference,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            style_class: "britechartStyle".to_string(),
            default_filename: "britechart.png".to_string(),
            chart_background: "white".to_string(),
            image_source_base: "data:image/svg+xml;base64,".to_string(),
            title: TitleStyle::default(),
            decode_timeout_ms: 10_000,
            encoder: EncoderPreference::Auto,
        }
    }
}

impl ExportConfig {
    /// Creates a config with every option at its default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the background colour.
    pub fn with_background(mut self, color: impl Into<String>) -> Self {
        self.chart_background = color.into();
        self
    }

    /// Sets the fallback filename.
    pub fn with_default_filename(mut self, filename: impl Into<String>) -> Self {
        self.default_filename = filename.into();
        self
    }

    /// Sets the decode wait bound.
    pub fn with_decode_timeout(mut self, timeout: Duration) -> Self {
        self.decode_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Sets the base64 backend preference.
    pub fn with_encoder(mut self, encoder: EncoderPreference) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    /// The `<style>` rule injected behind the chart.
    pub fn background_rule(&self) -> String {
        format!("svg{{background:{};}}", self.chart_background)
    }

    /// Serializes the config to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the config to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Reads a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> ExportResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_chart_conventions() {
        let config = ExportConfig::default();
        assert_eq!(config.default_filename, "britechart.png");
        assert_eq!(config.chart_background, "white");
        assert_eq!(config.image_source_base, "data:image/svg+xml;base64,");
        assert_eq!(config.title.top_offset, 40.0);
        assert_eq!(config.title.color_index, 6);
        assert_eq!(config.decode_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn background_rule_uses_configured_color() {
        let config = ExportConfig::new().with_background("#fafafa");
        assert_eq!(config.background_rule(), "svg{background:#fafafa;}");
    }

    #[test]
    fn json_uses_camel_case() {
        let json = ExportConfig::default().to_json_pretty().unwrap();
        assert!(json.contains("\"styleClass\""));
        assert!(json.contains("\"defaultFilename\""));
        assert!(json.contains("\"decodeTimeoutMs\""));
        assert!(json.contains("\"auto\""));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config =
            ExportConfig::from_json(r#"{"chartBackground":"black","title":{"fontSize":18}}"#)
                .unwrap();
        assert_eq!(config.chart_background, "black");
        assert_eq!(config.title.font_size, 18.0);
        assert_eq!(config.title.top_offset, 40.0);
        assert_eq!(config.default_filename, "britechart.png");
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(ExportConfig::from_json("{}").unwrap(), ExportConfig::default());
    }

    #[test]
    fn encoder_preference_is_kebab_case() {
        let config = ExportConfig::from_json(r#"{"encoder":"software"}"#).unwrap();
        assert_eq!(config.encoder, EncoderPreference::Software);
    }

    #[test]
    fn reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, r#"{"defaultFilename":"chart.png"}"#).unwrap();

        let config = ExportConfig::from_json_file(&path).unwrap();
        assert_eq!(config.default_filename, "chart.png");
    }
}
