//! Style inlining: freezes a graphic's cascaded look into its markup.

use std::collections::HashMap;

use tracing::debug;

use super::css::{RuleSet, VISUAL_PROPERTIES, compute, parse_declarations, property_spec};
use crate::error::ExportResult;
use crate::graphic::ChartGraphic;
use crate::markup::{Element, Node, SvgMarkup};

/// Elements that never paint and so carry no computed style.
const UNSTYLED: &[&str] = &["style", "script", "title", "desc", "metadata", "link"];

/// Serializes a graphic with every element's effective style written
/// into its `style` attribute.
///
/// Implementations must not mutate the graphic and must produce the same
/// markup for the same graphic and stylesheets.
pub trait StyleSerializer: Send + Sync {
    fn serialize(&self, graphic: &ChartGraphic) -> ExportResult<SvgMarkup>;
}

/// The default [`StyleSerializer`].
///
/// Resolves the document stylesheets and the graphic's own `<style>`
/// blocks against each element. It writes the computed visual properties
/// that differ from their initial values, then strips `<style>`, `<link>`
/// and `<script>` elements. `<style>` elements carrying the export style
/// class are kept.
#[derive(Debug, Clone)]
pub struct ComputedStyleSerializer {
    style_class: String,
}

impl ComputedStyleSerializer {
    pub fn new(style_class: impl Into<String>) -> Self {
        Self {
            style_class: style_class.into(),
        }
    }

    fn inline_element<'a>(
        &self,
        element: &'a Element,
        ancestors: &mut Vec<&'a Element>,
        parent: Option<&HashMap<&'static str, String>>,
        rules: &RuleSet,
    ) -> Element {
        if UNSTYLED.contains(&element.name.as_str()) {
            return element.clone();
        }

        let declared = rules.cascade(element, ancestors);
        let computed = compute(&declared, parent);

        let mut out = Element {
            name: element.name.clone(),
            attributes: element.attributes.clone(),
            children: Vec::with_capacity(element.children.len()),
        };

        let style = style_string(&computed, element.attr("style"));
        if style.is_empty() {
            out.remove_attr("style");
        } else {
            out.set_attr("style", style);
        }

        ancestors.push(element);
        for child in &element.children {
            out.children.push(match child {
                Node::Element(child) => {
                    Node::Element(self.inline_element(child, ancestors, Some(&computed), rules))
                }
                Node::Text(text) => Node::Text(text.clone()),
            });
        }
        ancestors.pop();

        out
    }
}

impl Default for ComputedStyleSerializer {
    fn default() -> Self {
        Self::new(crate::ExportConfig::default().style_class)
    }
}

impl StyleSerializer for ComputedStyleSerializer {
    fn serialize(&self, graphic: &ChartGraphic) -> ExportResult<SvgMarkup> {
        let mut rules = RuleSet::new();
        for css in graphic.stylesheets() {
            rules.add_stylesheet(css);
        }
        graphic.root().walk(&mut |element| {
            if element.name == "style" {
                rules.add_stylesheet(&element.text());
            }
        });
        debug!(rules = rules.len(), "resolved stylesheet rules");

        let mut root = self.inline_element(graphic.root(), &mut Vec::new(), None, &rules);
        root.retain_elements(&|element| match element.name.as_str() {
            "style" => !element.has_class(&self.style_class),
            "link" | "script" => true,
            _ => false,
        });

        Ok(SvgMarkup::from(&root))
    }
}

/// Builds the inline style: non-initial visual properties in table order,
/// followed by any original inline declarations outside the table.
fn style_string(computed: &HashMap<&'static str, String>, inline: Option<&str>) -> String {
    let mut parts: Vec<String> = VISUAL_PROPERTIES
        .iter()
        .filter_map(|spec| {
            let value = computed.get(spec.name)?;
            (value != spec.initial).then(|| format!("{}: {}", spec.name, value))
        })
        .collect();

    if let Some(inline) = inline {
        parts.extend(
            parse_declarations(inline)
                .into_iter()
                .filter(|decl| property_spec(&decl.name).is_none())
                .map(|decl| format!("{}: {}", decl.name, decl.value)),
        );
    }

    parts.join("; ")
}

// ============================================================================
// Tests
// ============================================================================
