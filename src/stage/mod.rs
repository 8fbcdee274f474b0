//! Markup stages that turn inlined chart markup into export-ready markup.
//!
//! The style inliner ([`StyleSerializer`]) produces the first
//! [`SvgMarkup`]. Each [`MarkupStage`] then takes the markup by value and
//! returns a new one, reading what it needs from a shared
//! [`StageContext`].
//!
//! ```text
//! ChartGraphic
//!     │  StyleSerializer
//!     ▼
//! ┌──────────────┐
//! │    Quirks    │ ◄── browser name
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │    Title     │ ◄── title, svg width, TextMeasurer
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐
//! │  Background  │ ◄── style class, background colour
//! └──────┬───────┘
//!        ▼
//!   MarkupEncoder
//! ```

pub mod background;
pub mod css;
pub mod inline;
pub mod quirks;
pub mod title;

pub use background::{BackgroundCompositor, add_background};
pub use inline::{ComputedStyleSerializer, StyleSerializer};
pub use quirks::{LINE_GRADIENT_ID, QUIRKS, Quirk, QuirkNormalizer, normalize};
pub use title::{FontMeasurer, TextMeasurer, TitleOverlay, prepend_title};

use tracing::trace;

use crate::config::ExportConfig;
use crate::error::ExportResult;
use crate::markup::SvgMarkup;

// ============================================================================
// Stage Context
// ============================================================================

/// Per-export inputs shared by every stage.
pub struct StageContext<'a> {
    pub config: &'a ExportConfig,

    /// Browser engine name used to select quirk rewrites.
    pub browser: &'a str,

    pub title: Option<&'a str>,

    /// Width the title is centred against.
    pub svg_width: Option<f32>,

    pub measurer: &'a dyn TextMeasurer,
}

// ============================================================================
// Stage Trait
// ============================================================================

/// One markup-to-markup transform in the export pipeline.
pub trait MarkupStage: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn apply(&self, markup: SvgMarkup, ctx: &StageContext<'_>) -> ExportResult<SvgMarkup>;
}

// ============================================================================
// Stage Pipeline
// ============================================================================

/// Ordered list of markup stages.
pub struct StagePipeline {
    stages: Vec<Box<dyn MarkupStage>>,
}

impl Default for StagePipeline {
    /// Quirks, then title, then background.
    fn default() -> Self {
        Self {
            stages: vec![
                Box::new(QuirkNormalizer),
                Box::new(TitleOverlay),
                Box::new(BackgroundCompositor),
            ],
        }
    }
}

impl StagePipeline {
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Runs every stage in order, stopping at the first failure.
    pub fn run(&self, markup: SvgMarkup, ctx: &StageContext<'_>) -> ExportResult<SvgMarkup> {
        self.stages.iter().try_fold(markup, |markup, stage| {
            let out = stage.apply(markup, ctx)?;
            trace!(stage = stage.name(), len = out.as_str().len(), "markup stage applied");
            Ok(out)
        })
    }
}
