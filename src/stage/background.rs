//! Background rule injection.

use super::{MarkupStage, StageContext};
use crate::config::ExportConfig;
use crate::error::ExportResult;
use crate::markup::{Element, Node, SvgMarkup};

/// Inserts `<style class="{style_class}">svg{background:…;}</style>` as the
/// first child of the root element.
///
/// Applying it twice adds a second, identical rule; the painted result is
/// the same.
pub fn add_background(markup: SvgMarkup, config: &ExportConfig) -> ExportResult<SvgMarkup> {
    let mut root = markup.parse()?;
    let style = Element::new("style")
        .with_attr("class", &config.style_class)
        .with_text(config.background_rule());
    root.children.insert(0, Node::Element(style));
    Ok(SvgMarkup::from(&root))
}

/// Pipeline stage running [`add_background`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BackgroundCompositor;

impl MarkupStage for BackgroundCompositor {
    fn name(&self) -> &'static str {
        "background"
    }

    fn apply(&self, markup: SvgMarkup, ctx: &StageContext<'_>) -> ExportResult<SvgMarkup> {
        add_background(markup, ctx.config)
    }
}
