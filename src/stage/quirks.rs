//! Per-browser fixes for serialization defects.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{MarkupStage, StageContext};
use crate::error::ExportResult;
use crate::markup::SvgMarkup;

/// Identifier of the gradient that line charts fill their strokes with.
pub const LINE_GRADIENT_ID: &str = "lineGradientId";

/// A known serialization defect and its rewrite.
#[derive(Debug, Clone, Copy)]
pub struct Quirk {
    /// Browser name the quirk applies to, compared case-insensitively.
    pub browser: &'static str,
    pub description: &'static str,
    rewrite: fn(&str) -> Cow<'_, str>,
}

impl Quirk {
    pub fn apply<'a>(&self, markup: &'a str) -> Cow<'a, str> {
        (self.rewrite)(markup)
    }
}

/// Every known quirk. Add a row here to support a new one.
pub static QUIRKS: &[Quirk] = &[Quirk {
    browser: "Firefox",
    description: "computed gradient fills reference the page URL instead of a fragment",
    rewrite: rewrite_gradient_url,
}];

/// A quoted `url()` used as a `fill` or `stroke` paint, in either a style
/// declaration or a presentation attribute.
static PAINT_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b((?:fill|stroke)(?:\s*:\s*|="))url\(&quot;([^)]*?)&quot;\)"#)
        .expect("valid regex")
});

fn rewrite_gradient_url(markup: &str) -> Cow<'_, str> {
    PAINT_URL.replace_all(markup, |caps: &Captures<'_>| {
        if caps[2].starts_with('#') {
            caps[0].to_string()
        } else {
            format!("{}url(&quot;#{LINE_GRADIENT_ID}&quot;)", &caps[1])
        }
    })
}

/// Applies the quirks registered for `browser`. Unknown browsers get the
/// markup back unchanged.
pub fn normalize(markup: SvgMarkup, browser: &str) -> SvgMarkup {
    QUIRKS
        .iter()
        .filter(|quirk| quirk.browser.eq_ignore_ascii_case(browser))
        .fold(markup, |markup, quirk| match quirk.apply(markup.as_str()) {
            Cow::Borrowed(_) => markup,
            Cow::Owned(rewritten) => SvgMarkup::new(rewritten),
        })
}

/// Pipeline stage running [`normalize`] for the exporter's browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuirkNormalizer;

impl MarkupStage for QuirkNormalizer {
    fn name(&self) -> &'static str {
        "quirks"
    }

    fn apply(&self, markup: SvgMarkup, ctx: &StageContext<'_>) -> ExportResult<SvgMarkup> {
        Ok(normalize(markup, ctx.browser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKEN: &str = r#"<path style="stroke: url(&quot;http://localhost/chart.html#lineGradientId&quot;)"/>"#;
    const FIXED: &str = r#"<path style="stroke: url(&quot;#lineGradientId&quot;)"/>"#;

    #[test]
    fn firefox_gradient_url_is_rewritten() {
        let out = normalize(SvgMarkup::new(BROKEN), "Firefox");
        assert_eq!(out.as_str(), FIXED);
    }

    #[test]
    fn browser_match_ignores_case() {
        let out = normalize(SvgMarkup::new(BROKEN), "firefox");
        assert_eq!(out.as_str(), FIXED);
    }

    #[test]
    fn other_browsers_are_untouched() {
        let out = normalize(SvgMarkup::new(BROKEN), "Chrome");
        assert_eq!(out.as_str(), BROKEN);
    }

    #[test]
    fn rewrite_is_idempotent() {
        let once = normalize(SvgMarkup::new(BROKEN), "Firefox");
        let twice = normalize(once.clone(), "Firefox");
        assert_eq!(once, twice);
    }

    #[test]
    fn fragment_references_are_kept() {
        let markup = r#"<rect style="clip-path: url(&quot;#clip&quot;)"/>"#;
        let out = normalize(SvgMarkup::new(markup), "Firefox");
        assert_eq!(out.as_str(), markup);
    }

    #[test]
    fn fill_attribute_is_rewritten() {
        let markup = r#"<path fill="url(&quot;http://localhost/chart.html#lineGradientId&quot;)"/>"#;
        let out = normalize(SvgMarkup::new(markup), "Firefox");
        assert_eq!(
            out.as_str(),
            r#"<path fill="url(&quot;#lineGradientId&quot;)"/>"#
        );
    }

    #[test]
    fn non_paint_references_are_left_alone() {
        let markup = concat!(
            r#"<rect style="clip-path: url(&quot;http://localhost/chart.html#clip&quot;); "#,
            r#"marker-end: url(&quot;http://localhost/chart.html#arrow&quot;)" "#,
            r#"mask="url(&quot;http://localhost/chart.html#fade&quot;)" "#,
            r#"filter="url(&quot;http://localhost/chart.html#blur&quot;)"/>"#,
        );
        let out = normalize(SvgMarkup::new(markup), "Firefox");
        assert_eq!(out.as_str(), markup);
    }

    #[test]
    fn every_quirk_names_a_browser() {
        assert!(QUIRKS.iter().all(|q| !q.browser.is_empty() && !q.description.is_empty()));
    }
}
