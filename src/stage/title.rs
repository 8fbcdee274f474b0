//! Title overlay: a centred caption above the chart.

use std::sync::Arc;

use resvg::usvg::{self, fontdb};
use tracing::debug;

use super::{MarkupStage, StageContext};
use crate::config::TitleStyle;
use crate::error::{ExportError, ExportResult};
use crate::markup::{Element, Node, SVG_NS, SvgMarkup};
use crate::theme;

// ============================================================================
// Text measurement
// ============================================================================

/// Measures the rendered width of a title.
pub trait TextMeasurer: Send + Sync {
    /// Width in pixels of `text` set in the title font.
    fn measure(&self, text: &str, style: &TitleStyle) -> ExportResult<f32>;
}

/// Measures text by laying it out with usvg against a font database.
///
/// Each call builds a throwaway probe document holding only the title. The
/// probe is owned by the call and dropped on every path, including failed
/// layouts.
#[derive(Clone)]
pub struct FontMeasurer {
    fontdb: Arc<fontdb::Database>,
}

impl FontMeasurer {
    pub fn new(fontdb: Arc<fontdb::Database>) -> Self {
        Self { fontdb }
    }

    /// A measurer over the system fonts.
    pub fn system() -> Self {
        Self::new(crate::fonts::system_database())
    }
}

impl std::fmt::Debug for FontMeasurer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMeasurer")
            .field("faces", &self.fontdb.len())
            .finish()
    }
}

impl TextMeasurer for FontMeasurer {
    fn measure(&self, text: &str, style: &TitleStyle) -> ExportResult<f32> {
        let probe = probe_markup(text, style);
        let options = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..usvg::Options::default()
        };

        let tree = usvg::Tree::from_str(&probe, &options)
            .map_err(|e| ExportError::Measure(e.to_string()))?;

        first_text_width(tree.root())
            .filter(|width| *width > 0.0)
            .ok_or_else(|| ExportError::Measure(format!("no font could lay out {text:?}")))
    }
}

fn probe_markup(text: &str, style: &TitleStyle) -> String {
    let width = style.font_size * (text.chars().count() as f32 + 1.0) * 2.0;
    let height = style.font_size * 3.0;
    let mut probe = Element::new("svg")
        .with_attr("xmlns", SVG_NS)
        .with_attr("width", format!("{width}"))
        .with_attr("height", format!("{height}"));
    probe.children.push(Node::Element(
        title_element(text, 0.0, style.font_size * 2.0, style, "black"),
    ));
    probe.to_markup()
}

fn first_text_width(group: &usvg::Group) -> Option<f32> {
    group.children().iter().find_map(|node| match node {
        usvg::Node::Text(text) => Some(text.bounding_box().width()),
        usvg::Node::Group(group) => first_text_width(group),
        _ => None,
    })
}

// ============================================================================
// Composition
// ============================================================================

fn title_element(text: &str, x: f32, y: f32, style: &TitleStyle, fill: &str) -> Element {
    Element::new("text")
        .with_attr("x", format!("{x}"))
        .with_attr("y", format!("{y}"))
        .with_attr("font-family", &style.font_family)
        .with_attr("font-size", style.font_size_css())
        .with_attr("font-weight", &style.font_weight)
        .with_attr("fill", fill)
        .with_text(text)
}

/// Adds a centred title ahead of the chart's first group.
///
/// Returns the markup unchanged when there is no title or no positive
/// width. Otherwise the title is measured and placed at
/// `x = svg_width / 2 - title_width / 2`, `y = style.top_offset`.
/// The title is inserted immediately before the first `<g>` in document
/// order. Markup without a `<g>` is rejected with
/// [`ExportError::MissingAnchor`].
pub fn prepend_title(
    markup: SvgMarkup,
    title: Option<&str>,
    svg_width: Option<f32>,
    style: &TitleStyle,
    measurer: &dyn TextMeasurer,
) -> ExportResult<SvgMarkup> {
    let (Some(title), Some(svg_width)) = (
        title.filter(|t| !t.is_empty()),
        svg_width.filter(|w| *w > 0.0),
    ) else {
        return Ok(markup);
    };

    let fill = theme::grey(style.color_index).ok_or_else(|| {
        ExportError::InvalidConfiguration(format!("no grey at index {}", style.color_index))
    })?;

    let title_width = measurer.measure(title, style)?;
    let x = svg_width / 2.0 - title_width / 2.0;
    debug!(title, title_width, x, "composing title overlay");

    let mut root = markup.parse()?;
    let text = title_element(title, x, style.top_offset, style, fill);
    root.insert_before_first("g", Node::Element(text))
        .map_err(|_| ExportError::MissingAnchor {
            anchor: "g",
            purpose: "title",
        })?;

    Ok(SvgMarkup::from(&root))
}

/// Pipeline stage running [`prepend_title`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleOverlay;

impl MarkupStage for TitleOverlay {
    fn name(&self) -> &'static str {
        "title"
    }

    fn apply(&self, markup: SvgMarkup, ctx: &StageContext<'_>) -> ExportResult<SvgMarkup> {
        prepend_title(
            markup,
            ctx.title,
            ctx.svg_width,
            &ctx.config.title,
            ctx.measurer,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    const CHART: &str =
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="400"><defs/><g class="chart"/></svg>"#;

    /// Reports a fixed width and counts calls.
    struct StubMeasurer {
        width: f32,
        calls: AtomicUsize,
    }

    impl StubMeasurer {
        fn new(width: f32) -> Self {
            Self {
                width,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextMeasurer for StubMeasurer {
        fn measure(&self, _text: &str, _style: &TitleStyle) -> ExportResult<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.width)
        }
    }

    struct FailingMeasurer;

    impl TextMeasurer for FailingMeasurer {
        fn measure(&self, text: &str, _style: &TitleStyle) -> ExportResult<f32> {
            Err(ExportError::Measure(format!("cannot measure {text}")))
        }
    }

    fn title_of(markup: &SvgMarkup) -> Element {
        let root = markup.parse().unwrap();
        let mut found = None;
        root.walk(&mut |e| {
            if found.is_none() && e.name == "text" {
                found = Some(e.clone());
            }
        });
        found.expect("title element")
    }

    #[test]
    fn title_is_centred() {
        let measurer = StubMeasurer::new(80.0);
        let out = prepend_title(
            SvgMarkup::new(CHART),
            Some("Revenue"),
            Some(400.0),
            &TitleStyle::default(),
            &measurer,
        )
        .unwrap();

        let text = title_of(&out);
        assert_eq!(text.attr("x"), Some("160"));
        assert_eq!(text.attr("y"), Some("40"));
        assert_eq!(text.attr("fill"), Some("#45494E"));
        assert_eq!(text.attr("font-size"), Some("15px"));
        assert_eq!(text.text(), "Revenue");
    }

    #[test]
    fn title_precedes_first_group() {
        let out = prepend_title(
            SvgMarkup::new(CHART),
            Some("Revenue"),
            Some(400.0),
            &TitleStyle::default(),
            &StubMeasurer::new(80.0),
        )
        .unwrap();

        let root = out.parse().unwrap();
        let names: Vec<_> = root.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["defs", "text", "g"]);
    }

    #[test]
    fn missing_title_or_width_is_identity() {
        let measurer = StubMeasurer::new(80.0);
        let style = TitleStyle::default();
        let markup = SvgMarkup::new(CHART);

        for (title, width) in [
            (None, Some(400.0)),
            (Some(""), Some(400.0)),
            (Some("Revenue"), None),
            (Some("Revenue"), Some(0.0)),
        ] {
            let out = prepend_title(markup.clone(), title, width, &style, &measurer).unwrap();
            assert_eq!(out, markup);
        }
        assert_eq!(measurer.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn title_text_is_escaped() {
        let out = prepend_title(
            SvgMarkup::new(CHART),
            Some("Sales & <Costs>"),
            Some(400.0),
            &TitleStyle::default(),
            &StubMeasurer::new(100.0),
        )
        .unwrap();

        assert!(out.as_str().contains("Sales &amp; &lt;Costs&gt;"));
        assert_eq!(title_of(&out).text(), "Sales & <Costs>");
    }

    #[test]
    fn missing_group_is_reported() {
        let err = prepend_title(
            SvgMarkup::new(r#"<svg xmlns="http://www.w3.org/2000/svg"><rect/></svg>"#),
            Some("Revenue"),
            Some(400.0),
            &TitleStyle::default(),
            &StubMeasurer::new(80.0),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            ExportError::MissingAnchor {
                anchor: "g",
                purpose: "title"
            }
        ));
    }

    #[test]
    fn measurement_failure_propagates() {
        let err = prepend_title(
            SvgMarkup::new(CHART),
            Some("Revenue"),
            Some(400.0),
            &TitleStyle::default(),
            &FailingMeasurer,
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::Measure(_)));
    }

    #[test]
    fn font_measurer_without_fonts_reports_failure() {
        let measurer = FontMeasurer::new(Arc::new(fontdb::Database::new()));
        let err = measurer.measure("Revenue", &TitleStyle::default()).unwrap_err();
        assert!(matches!(err, ExportError::Measure(_)));
    }

    #[test]
    fn probe_carries_title_font() {
        let probe = probe_markup("Revenue", &TitleStyle::default());
        assert!(probe.contains(r#"font-size="15px""#));
        assert!(probe.contains("Revenue</text>"));
    }
}
