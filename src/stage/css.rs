//! A small CSS cascade over [`Element`] trees.
//!
//! Stylesheets are parsed with lightningcss. Rules whose selectors use
//! only type, universal, class and id selectors joined by descendant or
//! child combinators take part in the cascade. Anything else (pseudo
//! classes, attribute selectors, sibling combinators) can never match a
//! static export and is dropped.

use std::collections::HashMap;

use lightningcss::declaration::DeclarationBlock;
use lightningcss::printer::PrinterOptions;
use lightningcss::properties::Property;
use lightningcss::rules::{CssRule, CssRuleList};
use lightningcss::stylesheet::{ParserOptions, StyleSheet};
use lightningcss::traits::ToCss;
use tracing::{debug, trace, warn};

use crate::markup::Element;

// ============================================================================
// Property table
// ============================================================================

/// A visual property the inliner resolves for every element.
#[derive(Debug, Clone, Copy)]
pub struct PropertySpec {
    pub name: &'static str,
    pub inherited: bool,
    pub initial: &'static str,
}

const fn prop(name: &'static str, inherited: bool, initial: &'static str) -> PropertySpec {
    PropertySpec {
        name,
        inherited,
        initial,
    }
}

/// Properties that change how an SVG paints.
pub const VISUAL_PROPERTIES: &[PropertySpec] = &[
    prop("fill", true, "black"),
    prop("fill-opacity", true, "1"),
    prop("fill-rule", true, "nonzero"),
    prop("stroke", true, "none"),
    prop("stroke-width", true, "1"),
    prop("stroke-opacity", true, "1"),
    prop("stroke-dasharray", true, "none"),
    prop("stroke-dashoffset", true, "0"),
    prop("stroke-linecap", true, "butt"),
    prop("stroke-linejoin", true, "miter"),
    prop("stroke-miterlimit", true, "4"),
    prop("opacity", false, "1"),
    prop("color", true, ""),
    prop("font-family", true, ""),
    prop("font-size", true, "medium"),
    prop("font-weight", true, "normal"),
    prop("font-style", true, "normal"),
    prop("letter-spacing", true, "normal"),
    prop("text-anchor", true, "start"),
    prop("text-decoration", false, "none"),
    prop("dominant-baseline", false, "auto"),
    prop("visibility", true, "visible"),
    prop("display", false, "inline"),
    prop("shape-rendering", true, "auto"),
    prop("stop-color", false, "black"),
    prop("stop-opacity", false, "1"),
    prop("clip-path", false, "none"),
    prop("clip-rule", true, "nonzero"),
    prop("mask", false, "none"),
    prop("filter", false, "none"),
    prop("marker-start", true, "none"),
    prop("marker-mid", true, "none"),
    prop("marker-end", true, "none"),
];

pub fn property_spec(name: &str) -> Option<&'static PropertySpec> {
    VISUAL_PROPERTIES.iter().find(|spec| spec.name == name)
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

/// Splits a declaration block (`fill: red; stroke: url("a;b")`) into
/// declarations. Semicolons inside quotes or parentheses do not split.
pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0usize;

    for (i, ch) in block.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                out.extend(parse_declaration(&block[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.extend(parse_declaration(&block[start..]));
    out
}

fn parse_declaration(raw: &str) -> Option<Declaration> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim().to_ascii_lowercase();
    let mut value = value.trim();
    if name.is_empty() {
        return None;
    }

    let mut important = false;
    if let Some(bang) = value.rfind('!') {
        if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
            important = true;
            value = value[..bang].trim_end();
        }
    }
    if value.is_empty() {
        return None;
    }

    Some(Declaration {
        name,
        value: value.to_string(),
        important,
    })
}

/// Parses a declaration block with lightningcss, expanding shorthands
/// into the longhands the inliner resolves. Falls back to the plain
/// splitter when lightningcss rejects the block.
pub fn parse_block(block: &str) -> Vec<Declaration> {
    match DeclarationBlock::parse_string(block, ParserOptions::default()) {
        Ok(parsed) => block_declarations(&parsed),
        Err(_) => parse_declarations(block),
    }
}

fn block_declarations(block: &DeclarationBlock<'_>) -> Vec<Declaration> {
    let mut out = Vec::new();
    for property in &block.declarations {
        expand_property(property, false, &mut out);
    }
    for property in &block.important_declarations {
        expand_property(property, true, &mut out);
    }
    out
}

fn expand_property(property: &Property<'_>, important: bool, out: &mut Vec<Declaration>) {
    let mut push = |name: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            out.push(Declaration {
                name: name.to_string(),
                value,
                important,
            });
        }
    };

    match property {
        Property::Font(font) => {
            let family = font
                .family
                .iter()
                .filter_map(|family| family.to_css_string(PrinterOptions::default()).ok())
                .collect::<Vec<_>>()
                .join(", ");
            push("font-family", Some(family));
            push("font-size", css_string(&font.size));
            push("font-style", css_string(&font.style));
            push("font-weight", css_string(&font.weight));
        }
        _ => {
            let name = property.property_id().name().to_string();
            let value = property.value_to_css_string(PrinterOptions::default()).ok();
            if name == "marker" {
                for longhand in ["marker-start", "marker-mid", "marker-end"] {
                    push(longhand, value.clone());
                }
            } else {
                push(&name, value);
            }
        }
    }
}

fn css_string(value: &impl ToCss) -> Option<String> {
    value.to_css_string(PrinterOptions::default()).ok()
}

// ============================================================================
// Selectors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Specificity(u16, u16, u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if !element.name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.attr("id") != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|class| element.has_class(class))
    }
}

/// A complex selector: compounds left to right, with the combinator
/// between each neighbouring pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
    specificity: Specificity,
}

impl Selector {
    /// Parses one selector of a selector list. Returns `None` for
    /// selectors outside the supported subset.
    pub fn parse(raw: &str) -> Option<Self> {
        let spaced = raw.replace('>', " > ");
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        let mut pending = None;

        for token in spaced.split_whitespace() {
            if token == ">" {
                if compounds.is_empty() || pending.is_some() {
                    return None;
                }
                pending = Some(Combinator::Child);
                continue;
            }
            let compound = parse_compound(token)?;
            if !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            compounds.push(compound);
        }

        if compounds.is_empty() || pending.is_some() {
            return None;
        }

        let specificity = compounds.iter().fold(Specificity::default(), |acc, c| {
            Specificity(
                acc.0 + u16::from(c.id.is_some()),
                acc.1 + c.classes.len() as u16,
                acc.2 + u16::from(c.tag.is_some()),
            )
        });

        Some(Self {
            compounds,
            combinators,
            specificity,
        })
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    /// Tests the selector against `element`, whose ancestors are listed
    /// from the root down to its parent.
    pub fn matches(&self, element: &Element, ancestors: &[&Element]) -> bool {
        let Some((last, rest)) = self.compounds.split_last() else {
            return false;
        };
        last.matches(element) && match_leftwards(rest, &self.combinators, ancestors)
    }
}

fn match_leftwards(
    compounds: &[Compound],
    combinators: &[Combinator],
    ancestors: &[&Element],
) -> bool {
    let (Some((compound, rest)), Some((combinator, rest_combinators))) =
        (compounds.split_last(), combinators.split_last())
    else {
        return true;
    };

    match combinator {
        Combinator::Child => match ancestors.split_last() {
            Some((parent, above)) => {
                compound.matches(parent) && match_leftwards(rest, rest_combinators, above)
            }
            None => false,
        },
        Combinator::Descendant => (0..ancestors.len()).rev().any(|i| {
            compound.matches(ancestors[i])
                && match_leftwards(rest, rest_combinators, &ancestors[..i])
        }),
    }
}

fn parse_compound(token: &str) -> Option<Compound> {
    if token.contains([':', '[', ']', '+', '~', '|']) {
        return None;
    }

    let bytes = token.as_bytes();
    let len = bytes.len();
    let mut i = 0usize;
    let mut compound = Compound::default();

    if bytes.first() == Some(&b'*') {
        i = 1;
    } else if bytes.first().is_some_and(|b| is_ident_start(*b)) {
        while i < len && is_ident_char(bytes[i]) {
            i += 1;
        }
        compound.tag = Some(token[..i].to_ascii_lowercase());
    }

    while i < len {
        let marker = bytes[i];
        i += 1;
        let start = i;
        while i < len && is_ident_char(bytes[i]) {
            i += 1;
        }
        if start == i {
            return None;
        }
        let ident = token[start..i].to_string();
        match marker {
            b'.' => compound.classes.push(ident),
            b'#' if compound.id.is_none() => compound.id = Some(ident),
            _ => return None,
        }
    }

    Some(compound)
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, b'_' | b'-')
}

// ============================================================================
// Rule set
// ============================================================================

#[derive(Debug, Clone)]
struct StyleRule {
    selector: Selector,
    declarations: Vec<Declaration>,
    order: usize,
}

/// Every supported rule from a sequence of stylesheets, in source order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<StyleRule>,
    order: usize,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parses a stylesheet and appends its rules. Sheets that fail to
    /// parse are skipped.
    pub fn add_stylesheet(&mut self, css: &str) {
        let css = css.trim();
        if css.is_empty() {
            return;
        }

        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        match StyleSheet::parse(css, options) {
            Ok(sheet) => self.collect(sheet.rules),
            Err(err) => warn!(error = %err, "skipping unparsable stylesheet"),
        }
    }

    fn collect(&mut self, rules: CssRuleList<'_>) {
        for rule in rules.0 {
            match rule {
                CssRule::Style(style_rule) => {
                    let selectors = style_rule
                        .selectors
                        .to_css_string(PrinterOptions::default())
                        .unwrap_or_default();
                    let declarations = block_declarations(&style_rule.declarations);

                    if !declarations.is_empty() {
                        for raw in selectors.split(',') {
                            match Selector::parse(raw) {
                                Some(selector) => self.rules.push(StyleRule {
                                    selector,
                                    declarations: declarations.clone(),
                                    order: self.order,
                                }),
                                None => trace!(selector = raw.trim(), "unsupported selector"),
                            }
                        }
                    }
                    self.order += 1;
                }
                CssRule::Media(media) => self.collect(media.rules),
                CssRule::Import(_) => debug!("dropping @import rule"),
                _ => {}
            }
        }
    }

    /// Resolves the declared values for `element`, lowest precedence
    /// first: presentation attributes, normal rules, the inline style,
    /// important rules, important inline declarations.
    pub fn cascade(&self, element: &Element, ancestors: &[&Element]) -> HashMap<String, String> {
        let mut declared = HashMap::new();

        for spec in VISUAL_PROPERTIES {
            if let Some(value) = element.attr(spec.name) {
                declared.insert(spec.name.to_string(), value.trim().to_string());
            }
        }

        let mut matched: Vec<&StyleRule> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(element, ancestors))
            .collect();
        matched.sort_by_key(|rule| (rule.selector.specificity(), rule.order));

        let inline = element.attr("style").map(parse_block).unwrap_or_default();

        for important in [false, true] {
            for rule in &matched {
                for decl in rule.declarations.iter().filter(|d| d.important == important) {
                    declared.insert(decl.name.clone(), decl.value.clone());
                }
            }
            for decl in inline.iter().filter(|d| d.important == important) {
                declared.insert(decl.name.clone(), decl.value.clone());
            }
        }

        declared
    }
}

/// `font-size: medium` in pixels.
const MEDIUM_FONT_PX: f32 = 16.0;

/// Computes values for [`VISUAL_PROPERTIES`] from declared values and
/// the parent's computed values.
///
/// Relative font sizes (`em`, `rem`, `%`) are resolved to pixels here, so
/// descendants inherit an absolute size.
pub fn compute(
    declared: &HashMap<String, String>,
    parent: Option<&HashMap<&'static str, String>>,
) -> HashMap<&'static str, String> {
    let inherited = |spec: &PropertySpec| {
        parent
            .and_then(|p| p.get(spec.name).cloned())
            .unwrap_or_else(|| spec.initial.to_string())
    };

    let mut computed: HashMap<&'static str, String> = VISUAL_PROPERTIES
        .iter()
        .map(|spec| {
            let value = match declared.get(spec.name).map(String::as_str) {
                Some("inherit") => inherited(spec),
                Some("initial") => spec.initial.to_string(),
                Some(value) => value.to_string(),
                None if spec.inherited => inherited(spec),
                None => spec.initial.to_string(),
            };
            (spec.name, value)
        })
        .collect();

    let parent_px = parent
        .and_then(|p| p.get("font-size"))
        .and_then(|size| font_size_px(size))
        .unwrap_or(MEDIUM_FONT_PX);
    if let Some(size) = computed.get_mut("font-size") {
        if let Some(px) = resolve_relative_size(size, parent_px) {
            *size = format!("{px}px");
        }
    }

    computed
}

fn resolve_relative_size(value: &str, parent_px: f32) -> Option<f32> {
    let value = value.trim();
    if let Some(n) = value.strip_suffix("rem") {
        return n.trim().parse::<f32>().ok().map(|n| n * MEDIUM_FONT_PX);
    }
    if let Some(n) = value.strip_suffix("em") {
        return n.trim().parse::<f32>().ok().map(|n| n * parent_px);
    }
    if let Some(n) = value.strip_suffix('%') {
        return n.trim().parse::<f32>().ok().map(|n| n / 100.0 * parent_px);
    }
    None
}

fn font_size_px(value: &str) -> Option<f32> {
    let value = value.trim();
    if value == "medium" {
        return Some(MEDIUM_FONT_PX);
    }
    value.strip_suffix("px").unwrap_or(value).trim().parse().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn el(name: &str, class: &str) -> Element {
        Element::new(name).with_attr("class", class)
    }

    #[test]
    fn declarations_respect_quotes_and_parens() {
        let decls = parse_declarations(r#"fill: url("a;b"); stroke:red !important;;"#);
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].name, "fill");
        assert_eq!(decls[0].value, r#"url("a;b")"#);
        assert!(!decls[0].important);
        assert_eq!(decls[1].value, "red");
        assert!(decls[1].important);
    }

    #[test]
    fn selector_specificity() {
        let s = Selector::parse("g.chart #axis .tick text").unwrap();
        assert_eq!(s.specificity(), Specificity(1, 2, 2));
    }

    #[test]
    fn unsupported_selectors_are_rejected() {
        assert!(Selector::parse("a:hover").is_none());
        assert!(Selector::parse("rect[width]").is_none());
        assert!(Selector::parse("g + g").is_none());
        assert!(Selector::parse("> g").is_none());
    }

    #[test]
    fn descendant_and_child_matching() {
        let svg = Element::new("svg");
        let chart = el("g", "chart");
        let axis = el("g", "axis");
        let text = Element::new("text");

        let descendant = Selector::parse(".chart text").unwrap();
        assert!(descendant.matches(&text, &[&svg, &chart, &axis]));

        let child = Selector::parse(".chart > text").unwrap();
        assert!(!child.matches(&text, &[&svg, &chart, &axis]));
        assert!(child.matches(&text, &[&svg, &chart]));

        let compact = Selector::parse(".axis>text").unwrap();
        assert!(compact.matches(&text, &[&svg, &chart, &axis]));
    }

    #[test]
    fn cascade_orders_by_specificity_then_source() {
        let mut rules = RuleSet::new();
        rules.add_stylesheet(".line { stroke: blue } path { stroke: green; fill: none }");
        rules.add_stylesheet(".line { stroke: red }");

        let path = el("path", "line");
        let declared = rules.cascade(&path, &[]);
        assert_eq!(declared["stroke"], "red");
        assert_eq!(declared["fill"], "none");
    }

    #[test]
    fn inline_and_important_precedence() {
        let mut rules = RuleSet::new();
        rules.add_stylesheet("path { fill: red !important; stroke: red }");

        let path = Element::new("path")
            .with_attr("stroke", "black")
            .with_attr("style", "fill: green; stroke: green");
        let declared = rules.cascade(&path, &[]);
        assert_eq!(declared["fill"], "red");
        assert_eq!(declared["stroke"], "green");
    }

    #[test]
    fn presentation_attributes_lose_to_rules() {
        let mut rules = RuleSet::new();
        rules.add_stylesheet("rect { fill: red }");

        let rect = Element::new("rect").with_attr("fill", "black").with_attr("opacity", "0.5");
        let declared = rules.cascade(&rect, &[]);
        assert_eq!(declared["fill"], "red");
        assert_eq!(declared["opacity"], "0.5");
    }

    #[test]
    fn media_rules_apply_and_imports_are_dropped() {
        let mut rules = RuleSet::new();
        rules.add_stylesheet(
            "@import url(\"theme.css\"); @media screen { .bar { opacity: 0.5 } }",
        );
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn font_shorthand_expands_to_longhands() {
        let mut rules = RuleSet::new();
        rules.add_stylesheet(".axis text { font: bold 20px serif }");

        let axis = el("g", "axis");
        let declared = rules.cascade(&Element::new("text"), &[&axis]);
        assert_eq!(declared["font-size"], "20px");
        assert_eq!(declared["font-weight"], "bold");
        assert_eq!(declared["font-family"], "serif");
    }

    #[test]
    fn marker_shorthand_sets_every_position() {
        let decls = parse_block("marker: url(#arrow)");
        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["marker-start", "marker-mid", "marker-end"]);
        assert!(decls.iter().all(|d| d.value == decls[0].value));
    }

    #[test]
    fn inline_shorthand_is_expanded() {
        let rules = RuleSet::new();
        let text = Element::new("text").with_attr("style", "font: italic 12px sans-serif");
        let declared = rules.cascade(&text, &[]);
        assert_eq!(declared["font-size"], "12px");
        assert_eq!(declared["font-style"], "italic");
    }

    #[test]
    fn relative_font_sizes_resolve_once() {
        let chart = compute(
            &HashMap::from([("font-size".to_string(), "2em".to_string())]),
            None,
        );
        assert_eq!(chart["font-size"], "32px");

        let axis = compute(&HashMap::new(), Some(&chart));
        assert_eq!(axis["font-size"], "32px");

        let tick = compute(
            &HashMap::from([("font-size".to_string(), "50%".to_string())]),
            Some(&axis),
        );
        assert_eq!(tick["font-size"], "16px");

        let label = compute(
            &HashMap::from([("font-size".to_string(), "1.5rem".to_string())]),
            Some(&tick),
        );
        assert_eq!(label["font-size"], "24px");
    }

    #[test]
    fn compute_inherits_and_resets() {
        let parent_declared = HashMap::from([
            ("fill".to_string(), "red".to_string()),
            ("opacity".to_string(), "0.5".to_string()),
        ]);
        let parent = compute(&parent_declared, None);

        let child = compute(&HashMap::new(), Some(&parent));
        assert_eq!(child["fill"], "red");
        assert_eq!(child["opacity"], "1");

        let explicit = compute(
            &HashMap::from([("opacity".to_string(), "inherit".to_string())]),
            Some(&parent),
        );
        assert_eq!(explicit["opacity"], "0.5");
    }
}
