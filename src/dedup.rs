//! Resource-id deduplication for merged vector subtrees.
//!
//! Two independently rendered charts routinely define gradients or clip paths
//! under the same generated ids.  Once their markup ends up in one document
//! those definitions clash and the second chart paints with the first chart's
//! resources.  This pass rewrites every definition id in a subtree to a fresh
//! globally unique one and patches all references.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::distr::Alphanumeric;
use rand::Rng;

use crate::dom::Element;

/// Definition kinds whose ids are rewritten.
const DEDUP_KINDS: &[&str] = &["linearGradient", "radialGradient", "pattern", "clipPath", "mask"];

/// Rewrites the ids of all gradient/pattern/clip-path/mask definitions in the
/// subtree and patches every `url(#id)` occurrence (attributes and inline
/// style text) plus `href`/`xlink:href` references.  Returns the number of
/// definitions renamed; a subtree without definitions is left untouched.
///
/// Fresh ids combine a millisecond timestamp with a random suffix.  Collisions
/// across independent invocations are negligible, not impossible — a
/// documented assumption, not a guarantee.
pub fn deduplicate_resource_ids(root: &mut Element) -> usize {
    let mut renames: Vec<(String, String)> = Vec::new();

    root.walk_mut(&mut |element| {
        if element.tag != "defs" {
            return;
        }
        for definition in &mut element.children {
            if !DEDUP_KINDS.contains(&definition.tag.as_str()) {
                continue;
            }
            let Some(old) = definition.attr("id").map(str::to_string) else {
                continue;
            };
            let fresh = fresh_id(&old);
            definition.set_attr("id", fresh.clone());
            renames.push((old, fresh));
        }
    });

    if renames.is_empty() {
        return 0;
    }

    root.walk_mut(&mut |element| {
        for (name, value) in element.attrs_mut().iter_mut() {
            for (old, fresh) in &renames {
                let reference = format!("url(#{})", old);
                if value.contains(&reference) {
                    *value = value.replace(&reference, &format!("url(#{})", fresh));
                }
                if (name.as_str() == "href" || name.as_str() == "xlink:href")
                    && *value == format!("#{}", old)
                {
                    *value = format!("#{}", fresh);
                }
            }
        }
    });

    renames.len()
}

fn fresh_id(old: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or(0);
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(6)
        .map(char::from)
        .collect();
    format!("{}-{}-{}", old, millis, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::PresentationTree;

    const CHART: &str = r##"
        <svg width="100" height="100">
          <defs>
            <linearGradient id="grad"/>
            <clipPath id="clip"/>
            <filter id="blur"/>
          </defs>
          <rect fill="url(#grad)" clip-path="url(#clip)"/>
          <circle style="fill: url(#grad); stroke: none"/>
          <use href="#grad"/>
        </svg>"##;

    fn collect_def_ids(root: &Element) -> Vec<String> {
        let mut ids = Vec::new();
        root.walk(&mut |element| {
            if DEDUP_KINDS.contains(&element.tag.as_str()) {
                if let Some(id) = element.attr("id") {
                    ids.push(id.to_string());
                }
            }
        });
        ids
    }

    fn collect_references(root: &Element) -> Vec<String> {
        let mut refs = Vec::new();
        root.walk(&mut |element| {
            for (_, value) in element.attrs() {
                let mut rest = value.as_str();
                while let Some(start) = rest.find("url(#") {
                    let tail = &rest[start + 5..];
                    if let Some(end) = tail.find(')') {
                        refs.push(tail[..end].to_string());
                        rest = &tail[end..];
                    } else {
                        break;
                    }
                }
            }
        });
        refs
    }

    #[test]
    fn definitions_are_renamed_and_references_follow() {
        let mut tree = PresentationTree::parse(CHART).unwrap();
        let renamed = deduplicate_resource_ids(tree.root_mut());
        assert_eq!(renamed, 2);

        let ids = collect_def_ids(tree.root());
        assert!(ids.iter().all(|id| id != "grad" && id != "clip"));

        // Every url(#...) reference resolves to a surviving definition id.
        for reference in collect_references(tree.root()) {
            assert!(ids.contains(&reference), "dangling reference {}", reference);
        }

        // href references were rewritten too.
        let href = tree.root().descendant_with_tag("use").unwrap().attr("href").unwrap();
        assert!(ids.contains(&href[1..].to_string()));

        // Inline style text was rewritten.
        let circle = tree.root().descendant_with_tag("circle").unwrap();
        let fill = circle.style_value("fill").unwrap();
        assert!(!fill.contains("url(#grad)"), "{}", fill);
    }

    #[test]
    fn non_definition_nodes_keep_their_ids() {
        let mut tree = PresentationTree::parse(CHART).unwrap();
        deduplicate_resource_ids(tree.root_mut());
        // The filter is not on the dedup list and stays as-is.
        assert!(tree.element_by_id("blur").is_some());
    }

    #[test]
    fn noop_without_defs() {
        let mut tree = PresentationTree::parse("<svg><rect fill=\"url(#ghost)\"/></svg>").unwrap();
        let before = tree.root().serialize();
        assert_eq!(deduplicate_resource_ids(tree.root_mut()), 0);
        assert_eq!(tree.root().serialize(), before);
    }

    #[test]
    fn independently_processed_subtrees_never_collide() {
        let mut first = PresentationTree::parse(CHART).unwrap();
        let mut second = PresentationTree::parse(CHART).unwrap();
        deduplicate_resource_ids(first.root_mut());
        deduplicate_resource_ids(second.root_mut());

        let mut merged = collect_def_ids(first.root());
        merged.extend(collect_def_ids(second.root()));
        let before = merged.len();
        merged.sort();
        merged.dedup();
        assert_eq!(merged.len(), before, "id collision across merged subtrees");
    }
}
