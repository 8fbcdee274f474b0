//! chart-export: turns styled SVG charts into downloadable PNG images.
//!
//! A chart's look usually lives in stylesheets outside its SVG, so the
//! exporter freezes the cascaded style into the markup first. It then
//! normalizes per-browser markup quirks, optionally adds a centred title,
//! adds a background, base64-encodes the result, rasterizes it and hands
//! the PNG to a download target.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chart_export::{
//!     ChartGraphic, ExportConfig, ExportOutcome, ExportRequest, Exporter, MemoryTarget,
//! };
//!
//! let mut chart = ChartGraphic::from_markup(
//!     r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="200">
//!          <g class="chart"><rect class="bar" width="40" height="120"/></g>
//!        </svg>"#,
//! )?
//! .with_stylesheet(".bar { fill: #6aedc7; }");
//!
//! let target = Arc::new(MemoryTarget::new());
//! let exporter = Exporter::builder()
//!     .config(ExportConfig::new().with_background("#fafafa"))
//!     .target(target.clone())
//!     .build()?;
//!
//! let outcome = exporter.export(
//!     ExportRequest::new(Some(&mut chart), 400, 200)
//!         .with_filename("sales.png")
//!         .with_title("Sales"),
//! )?;
//! assert!(matches!(outcome, ExportOutcome::Downloaded(_)));
//! # Ok::<(), chart_export::ExportError>(())
//! ```
//!
//! # Configuration
//!
//! [`ExportConfig`] round-trips through camelCase JSON:
//!
//! ```
//! use chart_export::ExportConfig;
//!
//! let config = ExportConfig::from_json(r#"{ "chartBackground": "black" }"#).unwrap();
//! assert_eq!(config.chart_background, "black");
//! assert_eq!(config.default_filename, "britechart.png");
//! ```

mod config;
mod download;
mod encoder;
mod error;
mod exporter;
mod fonts;
mod graphic;
mod markup;
mod raster;
pub mod stage;
pub mod telemetry;
pub mod theme;

pub use config::{EncoderPreference, ExportConfig, TitleStyle};
pub use download::{
    DirectoryTarget, Download, DownloadLink, DownloadTarget, MemoryTarget, SavedFile, download,
    sanitize_filename,
};
#[cfg(feature = "native-base64")]
pub use encoder::NativeBase64;
pub use encoder::{Base64Backend, MarkupEncoder, SoftwareBase64};
pub use error::{ExportError, ExportResult};
pub use exporter::{ExportOutcome, ExportRequest, Exporter, ExporterBuilder};
pub use fonts::system_database;
pub use graphic::ChartGraphic;
pub use markup::{Element, Node, SVG_NS, SvgMarkup, XLINK_NS};
pub use raster::{Canvas, JPEG_MIME, PNG_MIME, RasterRenderer};
pub use stage::{
    ComputedStyleSerializer, FontMeasurer, MarkupStage, StageContext, StagePipeline,
    StyleSerializer, TextMeasurer,
};
