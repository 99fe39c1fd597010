//! Style resolution and inlining for extracted vector subtrees.
//!
//! Chart markup looks right on screen only because of stylesheet rules that do
//! not travel with the subtree.  Before a chart is serialized for conversion,
//! the inliner copies the resolved value of every allow-listed presentation
//! property into the subtree's local `style` attributes, so the markup renders
//! identically outside its original styling context.  Resolution itself is a
//! capability ([`StyleResolver`]) so the inliner can be exercised with a
//! canned style map instead of a live rendering host.

use std::collections::BTreeMap;
use std::collections::HashMap;

use crate::color::normalize_css_color;
use crate::dom::Element;

/// Resolved presentation properties for one element.
pub type ComputedStyle = BTreeMap<String, String>;

/// Capability interface for computed-style lookup.
///
/// Production hosts adapt their style engine behind this trait; tests use
/// [`StaticStyleResolver`].  Returning `None` means the element's style could
/// not be resolved — the inliner skips such elements without aborting.
pub trait StyleResolver: Send + Sync {
    /// Resolved style for `element`, or `None` if resolution fails.
    fn resolve(&self, element: &Element) -> Option<ComputedStyle>;
}

struct PropertySpec {
    name: &'static str,
    /// Values considered the property's default; defaults are never inlined.
    defaults: &'static [&'static str],
    color: bool,
}

/// Allow-list of properties worth carrying along, with their defaults.
const INLINE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec { name: "fill", defaults: &["rgb(0, 0, 0)", "black", "#000000"], color: true },
    PropertySpec { name: "stroke", defaults: &["none"], color: true },
    PropertySpec { name: "stroke-width", defaults: &["1", "1px"], color: false },
    PropertySpec { name: "stroke-dasharray", defaults: &["none"], color: false },
    PropertySpec { name: "stroke-linecap", defaults: &["butt"], color: false },
    PropertySpec { name: "stroke-linejoin", defaults: &["miter"], color: false },
    PropertySpec { name: "opacity", defaults: &["1"], color: false },
    PropertySpec { name: "fill-opacity", defaults: &["1"], color: false },
    PropertySpec { name: "stroke-opacity", defaults: &["1"], color: false },
    PropertySpec { name: "stop-color", defaults: &[], color: true },
    PropertySpec { name: "font-family", defaults: &[], color: false },
    PropertySpec { name: "font-size", defaults: &["16px"], color: false },
    PropertySpec { name: "font-weight", defaults: &["400", "normal"], color: false },
    PropertySpec { name: "font-style", defaults: &["normal"], color: false },
    PropertySpec { name: "text-anchor", defaults: &["start"], color: false },
    PropertySpec { name: "dominant-baseline", defaults: &["auto"], color: false },
    PropertySpec { name: "display", defaults: &["inline"], color: false },
    PropertySpec { name: "visibility", defaults: &["visible"], color: false },
];

/// Copies resolved presentation properties onto the subtree's local styles.
///
/// For every element in `root`'s subtree: look up the resolved style, and for
/// each allow-listed property write the value into the local `style` attribute
/// unless it is the property's default or a local declaration already exists.
/// Color-valued properties are normalized through
/// [`normalize_css_color`] first.  Elements the resolver
/// cannot handle are skipped; the walk always completes.
pub fn inline_computed_styles(root: &mut Element, resolver: &dyn StyleResolver) {
    root.walk_mut(&mut |element| {
        let Some(resolved) = resolver.resolve(element) else {
            return;
        };
        for spec in INLINE_PROPERTIES {
            let Some(value) = resolved.get(spec.name) else {
                continue;
            };
            if spec.defaults.iter().any(|default| default == value) {
                continue;
            }
            if element.style_value(spec.name).is_some() {
                continue;
            }
            if spec.color {
                element.set_style_value(spec.name, &normalize_css_color(value));
            } else {
                element.set_style_value(spec.name, value);
            }
        }
    });
}

/// Canned style map keyed by element id and tag; id entries win.
#[derive(Debug, Default)]
pub struct StaticStyleResolver {
    by_id: HashMap<String, ComputedStyle>,
    by_tag: HashMap<String, ComputedStyle>,
}

impl StaticStyleResolver {
    /// Creates an empty resolver (resolves nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a style for the element with the given `id`.
    pub fn with_id(mut self, id: impl Into<String>, style: ComputedStyle) -> Self {
        self.by_id.insert(id.into(), style);
        self
    }

    /// Registers a style for every element with the given tag.
    pub fn with_tag(mut self, tag: impl Into<String>, style: ComputedStyle) -> Self {
        self.by_tag.insert(tag.into(), style);
        self
    }
}

impl StyleResolver for StaticStyleResolver {
    fn resolve(&self, element: &Element) -> Option<ComputedStyle> {
        let tag_style = self.by_tag.get(&element.tag);
        let id_style = element.attr("id").and_then(|id| self.by_id.get(id));
        match (tag_style, id_style) {
            (None, None) => None,
            (tag_style, id_style) => {
                let mut merged = tag_style.cloned().unwrap_or_default();
                if let Some(overrides) = id_style {
                    merged.extend(overrides.clone());
                }
                Some(merged)
            }
        }
    }
}

/// Convenience constructor for canned styles in tests and demos.
pub fn computed_style(pairs: &[(&str, &str)]) -> ComputedStyle {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: &str, id: &str) -> Element {
        let mut element = Element::new(tag);
        element.set_attr("id", id);
        element
    }

    #[test]
    fn inlines_non_default_values() {
        let mut root = leaf("rect", "bar");
        let resolver = StaticStyleResolver::new()
            .with_id("bar", computed_style(&[("fill", "rgb(10, 20, 30)"), ("opacity", "0.8")]));

        inline_computed_styles(&mut root, &resolver);

        assert_eq!(root.style_value("fill").as_deref(), Some("rgb(10, 20, 30)"));
        assert_eq!(root.style_value("opacity").as_deref(), Some("0.8"));
    }

    #[test]
    fn skips_default_values() {
        let mut root = leaf("rect", "bar");
        let resolver = StaticStyleResolver::new()
            .with_id("bar", computed_style(&[("stroke", "none"), ("opacity", "1")]));

        inline_computed_styles(&mut root, &resolver);
        assert!(root.attr("style").is_none());
    }

    #[test]
    fn keeps_existing_local_declarations() {
        let mut root = leaf("rect", "bar");
        root.set_style_value("fill", "teal");
        let resolver =
            StaticStyleResolver::new().with_id("bar", computed_style(&[("fill", "purple")]));

        inline_computed_styles(&mut root, &resolver);
        assert_eq!(root.style_value("fill").as_deref(), Some("teal"));
    }

    #[test]
    fn normalizes_perceptual_colors() {
        let mut root = leaf("path", "line");
        let resolver = StaticStyleResolver::new()
            .with_id("line", computed_style(&[("stroke", "oklch(0.5 0 none)")]));

        inline_computed_styles(&mut root, &resolver);

        let stroke = root.style_value("stroke").unwrap();
        assert!(stroke.starts_with("rgb("), "{}", stroke);
    }

    #[test]
    fn unresolved_elements_do_not_abort_the_walk() {
        let mut root = Element::new("g");
        root.children.push(leaf("rect", "bar"));
        let resolver =
            StaticStyleResolver::new().with_id("bar", computed_style(&[("fill", "navy")]));

        inline_computed_styles(&mut root, &resolver);

        // The group itself resolves to nothing, the child is still inlined.
        assert!(root.attr("style").is_none());
        assert_eq!(root.children[0].style_value("fill").as_deref(), Some("navy"));
    }

    #[test]
    fn tag_styles_apply_with_id_overrides() {
        let mut root = leaf("text", "label");
        let resolver = StaticStyleResolver::new()
            .with_tag("text", computed_style(&[("font-family", "Inter"), ("text-anchor", "middle")]))
            .with_id("label", computed_style(&[("text-anchor", "end")]));

        inline_computed_styles(&mut root, &resolver);

        assert_eq!(root.style_value("font-family").as_deref(), Some("Inter"));
        assert_eq!(root.style_value("text-anchor").as_deref(), Some("end"));
    }
}
