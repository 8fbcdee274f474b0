//! Chart export engine.

use std::sync::Arc;

use resvg::usvg::fontdb;
use tracing::{debug, info, warn};

use crate::config::ExportConfig;
use crate::download::{DirectoryTarget, Download, DownloadTarget, download, sanitize_filename};
use crate::encoder::MarkupEncoder;
use crate::error::{ExportError, ExportResult};
use crate::fonts;
use crate::graphic::ChartGraphic;
use crate::markup::{SVG_NS, SvgMarkup};
use crate::raster::{PNG_MIME, RasterRenderer};
use crate::stage::{
    ComputedStyleSerializer, FontMeasurer, StageContext, StagePipeline, StyleSerializer,
    TextMeasurer,
};
use crate::theme;

// ============================================================================
// Request / Outcome
// ============================================================================

/// One export call.
///
/// The graphic is borrowed mutably: the exporter stamps `version` and
/// `xmlns` onto its root before serializing it.
#[derive(Debug)]
pub struct ExportRequest<'a> {
    pub graphic: Option<&'a mut ChartGraphic>,
    /// Canvas width in pixels.
    pub width: u32,
    /// Canvas height in pixels.
    pub height: u32,
    pub filename: Option<String>,
    pub title: Option<String>,
}

impl<'a> ExportRequest<'a> {
    pub fn new(graphic: Option<&'a mut ChartGraphic>, width: u32, height: u32) -> Self {
        Self {
            graphic,
            width,
            height,
            filename: None,
            title: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// What an export did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No graphic was supplied; nothing happened.
    Skipped,
    /// The chart was rasterized and delivered.
    Downloaded(Download),
}

// ============================================================================
// Exporter
// ============================================================================

/// Turns chart graphics into downloaded PNG files.
///
/// # Pipeline
///
/// 1. **Inline** - freeze the cascaded style into the markup
/// 2. **Quirks** - per-browser markup rewrites
/// 3. **Title** - optional centred caption
/// 4. **Background** - background rule
/// 5. **Encode** - base64 data URI
/// 6. **Raster** - decode and draw on a worker thread, bounded wait
/// 7. **Download** - PNG bytes handed to the [`DownloadTarget`]
///
/// Steps 1-4 are available on their own through
/// [`build_markup`](Self::build_markup).
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use chart_export::{ChartGraphic, DirectoryTarget, ExportRequest, Exporter};
///
/// let mut chart = ChartGraphic::from_markup(
///     r#"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="200"><g/></svg>"#,
/// )?
/// .with_stylesheet(".bar { fill: steelblue; }");
///
/// let exporter = Exporter::builder()
///     .target(Arc::new(DirectoryTarget::new("out")))
///     .build()?;
///
/// exporter.export(
///     ExportRequest::new(Some(&mut chart), 400, 200)
///         .with_filename("sales.png")
///         .with_title("Sales"),
/// )?;
/// # Ok::<(), chart_export::ExportError>(())
/// ```
pub struct Exporter {
    config: ExportConfig,
    browser: String,
    encoder: MarkupEncoder,
    renderer: RasterRenderer,
    target: Arc<dyn DownloadTarget>,
    serializer: Box<dyn StyleSerializer>,
    measurer: Box<dyn TextMeasurer>,
    pipeline: StagePipeline,
}

impl Exporter {
    pub fn builder() -> ExporterBuilder {
        ExporterBuilder::default()
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn browser(&self) -> &str {
        &self.browser
    }

    pub fn encoder(&self) -> &MarkupEncoder {
        &self.encoder
    }

    /// Produces export-ready markup for `graphic` without rasterizing it.
    ///
    /// Stamps `version="1.1"` and the SVG namespace onto the graphic, then
    /// inlines styles, resizes the root to `width`×`height` and runs the
    /// markup stages. The title is centred against the graphic's own width
    /// as it was before resizing.
    pub fn build_markup(
        &self,
        graphic: &mut ChartGraphic,
        title: Option<&str>,
        width: u32,
        height: u32,
    ) -> ExportResult<SvgMarkup> {
        graphic.set_attribute("version", "1.1");
        graphic.set_attribute("xmlns", SVG_NS);
        let svg_width = graphic.width();

        let inlined = self.serializer.serialize(graphic)?;
        let mut root = inlined.parse()?;
        root.set_attr("width", width.to_string());
        root.set_attr("height", height.to_string());

        let ctx = StageContext {
            config: &self.config,
            browser: &self.browser,
            title,
            svg_width,
            measurer: self.measurer.as_ref(),
        };
        self.pipeline.run(SvgMarkup::from(&root), &ctx)
    }

    /// Exports one chart.
    ///
    /// Returns [`ExportOutcome::Skipped`] without side effects when the
    /// request carries no graphic. Any stage failure is returned, including
    /// a decode that fails or outlives the configured timeout.
    pub fn export(&self, request: ExportRequest<'_>) -> ExportResult<ExportOutcome> {
        let ExportRequest {
            graphic,
            width,
            height,
            filename,
            title,
        } = request;

        let Some(graphic) = graphic else {
            debug!("no graphic supplied, export skipped");
            return Ok(ExportOutcome::Skipped);
        };

        let filename = sanitize_filename(
            filename.as_deref().unwrap_or(&self.config.default_filename),
            &self.config.default_filename,
        );

        self.run(graphic, title.as_deref(), &filename, width, height)
            .map(ExportOutcome::Downloaded)
            .inspect_err(|e| warn!(filename = %filename, error = %e, "export failed"))
    }

    fn run(
        &self,
        graphic: &mut ChartGraphic,
        title: Option<&str>,
        filename: &str,
        width: u32,
        height: u32,
    ) -> ExportResult<Download> {
        let markup = self.build_markup(graphic, title, width, height)?;
        let uri = self.encoder.encode(&markup);
        debug!(markup_len = markup.as_str().len(), uri_len = uri.len(), "markup encoded");

        let canvas = self.renderer.render(&uri, width, height, &self.encoder)?;
        let result = download(&canvas, filename, PNG_MIME, &self.encoder, self.target.as_ref())?;

        info!(filename, width, height, "chart exported");
        Ok(result)
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("config", &self.config)
            .field("browser", &self.browser)
            .field("encoder", &self.encoder)
            .field("renderer", &self.renderer)
            .field("stages", &self.pipeline.stage_names())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ExporterBuilder
// ============================================================================

/// Configures an [`Exporter`].
///
/// Everything is optional. Unset parts default to the default
/// [`ExportConfig`], the current directory, an empty browser name, the
/// system fonts and the computed-style serializer.
#[derive(Default)]
pub struct ExporterBuilder {
    config: Option<ExportConfig>,
    target: Option<Arc<dyn DownloadTarget>>,
    browser: Option<String>,
    fontdb: Option<Arc<fontdb::Database>>,
    serializer: Option<Box<dyn StyleSerializer>>,
    measurer: Option<Box<dyn TextMeasurer>>,
}

impl ExporterBuilder {
    pub fn config(mut self, config: ExportConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn target(mut self, target: Arc<dyn DownloadTarget>) -> Self {
        self.target = Some(target);
        self
    }

    /// Browser engine name used to pick markup quirks, e.g. `"Firefox"`.
    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    /// Fonts used for title measurement and rasterization.
    pub fn fontdb(mut self, fontdb: Arc<fontdb::Database>) -> Self {
        self.fontdb = Some(fontdb);
        self
    }

    pub fn serializer(mut self, serializer: impl StyleSerializer + 'static) -> Self {
        self.serializer = Some(Box::new(serializer));
        self
    }

    pub fn measurer(mut self, measurer: impl TextMeasurer + 'static) -> Self {
        self.measurer = Some(Box::new(measurer));
        self
    }

    /// Validates the configuration and resolves the encoder.
    pub fn build(self) -> ExportResult<Exporter> {
        let config = self.config.unwrap_or_default();

        let background = theme::parse_color(&config.chart_background)?;
        if theme::grey(config.title.color_index).is_none() {
            return Err(ExportError::InvalidConfiguration(format!(
                "title colour index {} is outside the grey schema",
                config.title.color_index
            )));
        }

        let encoder = MarkupEncoder::resolve(config.encoder, config.image_source_base.clone())?;
        let fontdb = self.fontdb.unwrap_or_else(fonts::system_database);
        let renderer = RasterRenderer::new(Arc::clone(&fontdb), config.decode_timeout())
            .with_background(background);

        let serializer = self
            .serializer
            .unwrap_or_else(|| Box::new(ComputedStyleSerializer::new(config.style_class.clone())));
        let measurer = self
            .measurer
            .unwrap_or_else(|| Box::new(FontMeasurer::new(fontdb)));
        let target = self
            .target
            .unwrap_or_else(|| Arc::new(DirectoryTarget::new(".")));

        debug!(encoder = encoder.backend_name(), "exporter ready");
        Ok(Exporter {
            config,
            browser: self.browser.unwrap_or_default(),
            encoder,
            renderer,
            target,
            serializer,
            measurer,
            pipeline: StagePipeline::default(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
