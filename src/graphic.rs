//! The chart graphic handed to an export.

use crate::error::ExportResult;
use crate::markup::{Element, parse_length};

/// A rendered chart: its SVG element tree plus the stylesheets of the
/// document it is displayed in.
///
/// The stylesheets stand in for the host page's CSS. They are what the
/// style inliner resolves against, so an export carries the chart's look
/// without them.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartGraphic {
    root: Element,
    stylesheets: Vec<String>,
}

impl ChartGraphic {
    /// Wraps an SVG tree.
    pub fn new(root: Element) -> Self {
        Self {
            root,
            stylesheets: Vec::new(),
        }
    }

    /// Parses SVG markup into a graphic.
    pub fn from_markup(svg: &str) -> ExportResult<Self> {
        Ok(Self::new(Element::parse_svg(svg)?))
    }

    /// Attaches a document stylesheet. Later sheets win ties.
    pub fn with_stylesheet(mut self, css: impl Into<String>) -> Self {
        self.stylesheets.push(css.into());
        self
    }

    pub fn add_stylesheet(&mut self, css: impl Into<String>) {
        self.stylesheets.push(css.into());
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn stylesheets(&self) -> &[String] {
        &self.stylesheets
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.root.attr(name)
    }

    /// Writes an attribute on the root `<svg>` element.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.root.set_attr(name, value);
    }

    /// Width declared on the root element, in pixels.
    pub fn width(&self) -> Option<f32> {
        self.attribute("width").and_then(parse_length)
    }

    /// Height declared on the root element, in pixels.
    pub fn height(&self) -> Option<f32> {
        self.attribute("height").and_then(parse_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_dimensions_from_root() {
        let graphic = ChartGraphic::from_markup(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="400px" height="200"/>"#,
        )
        .unwrap();
        assert_eq!(graphic.width(), Some(400.0));
        assert_eq!(graphic.height(), Some(200.0));
    }

    #[test]
    fn set_attribute_mutates_root() {
        let mut graphic = ChartGraphic::from_markup("<svg/>").unwrap();
        assert_eq!(graphic.attribute("version"), None);
        graphic.set_attribute("version", "1.1");
        assert_eq!(graphic.attribute("version"), Some("1.1"));
        assert!(graphic.root().to_markup().contains(r#"version="1.1""#));
    }

    #[test]
    fn stylesheets_keep_order() {
        let mut graphic = ChartGraphic::from_markup("<svg/>")
            .unwrap()
            .with_stylesheet(".a{fill:red}");
        graphic.add_stylesheet(".a{fill:blue}");
        assert_eq!(graphic.stylesheets(), [".a{fill:red}", ".a{fill:blue}"]);
    }
}
