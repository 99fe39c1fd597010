//! Chart extraction: locate a rendered chart's vector root and turn it into a
//! reusable image asset.
//!
//! Orchestrates the per-chart pipeline — style inlining, resource-id
//! deduplication, then the guaranteed (async) conversion path.  Extraction
//! never fails with an error: a missing container or chart simply yields an
//! unsuccessful [`ExtractionResult`].

use crate::dedup::deduplicate_resource_ids;
use crate::dom::{Element, PresentationTree};
use crate::error::SectionError;
use crate::raster::{Asset, RasterOptions, Rasterizer};
use crate::style::{inline_computed_styles, StyleResolver};

/// Wrapper tags the dashboard nests chart roots in.
const WRAPPER_TAGS: &[&str] = &["div", "figure", "section"];

/// Outcome of one chart extraction.
///
/// Invariant: `success` implies positive dimensions and a present asset;
/// `!success` implies no asset.
#[derive(Clone, Debug)]
pub struct ExtractionResult {
    /// Whether a chart was found and converted.
    pub success: bool,
    /// The converted asset, present exactly when `success` is set.
    pub asset: Option<Asset>,
    /// Asset width in pixels; positive exactly when `success` is set.
    pub width: f64,
    /// Asset height in pixels; positive exactly when `success` is set.
    pub height: f64,
    /// What went wrong, present exactly when `success` is unset.  Carries
    /// the per-section taxonomy so callers can log the real failure kind.
    pub error: Option<SectionError>,
}

impl ExtractionResult {
    fn resolved(asset: Asset) -> Self {
        let (width, height) = asset.pixel_size();
        Self {
            success: true,
            asset: Some(asset),
            width,
            height,
            error: None,
        }
    }

    fn failure(error: SectionError) -> Self {
        Self {
            success: false,
            asset: None,
            width: 0.0,
            height: 0.0,
            error: Some(error),
        }
    }
}

/// Finds the chart's vector root inside `container`.
///
/// Resolution order: a direct `svg` child, an `svg` nested inside a known
/// wrapper element one level down, then any `svg` descendant as a last
/// resort.
pub fn find_chart_root(container: &Element) -> Option<&Element> {
    if let Some(svg) = container.child_with_tag("svg") {
        return Some(svg);
    }
    for child in &container.children {
        if WRAPPER_TAGS.contains(&child.tag.as_str()) {
            if let Some(svg) = child.child_with_tag("svg") {
                return Some(svg);
            }
        }
    }
    container.descendant_with_tag("svg")
}

/// Extracts the chart rendered under `container_id` into a reusable asset.
pub async fn extract_chart(
    tree: &PresentationTree,
    container_id: &str,
    resolver: &dyn StyleResolver,
    rasterizer: &Rasterizer,
    options: &RasterOptions,
) -> ExtractionResult {
    let Some(container) = tree.element_by_id(container_id) else {
        return ExtractionResult::failure(SectionError::SourceNotFound(format!(
            "chart container '{}' not found",
            container_id
        )));
    };
    let Some(chart) = find_chart_root(container) else {
        return ExtractionResult::failure(SectionError::SourceNotFound(format!(
            "no vector content under container '{}'",
            container_id
        )));
    };

    // Work on a clone; the live tree never sees extraction mutations.
    let mut working = chart.clone();
    inline_computed_styles(&mut working, resolver);
    deduplicate_resource_ids(&mut working);

    match rasterizer.convert(&working, options).await {
        Ok(asset) => ExtractionResult::resolved(asset),
        Err(err) => ExtractionResult::failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StaticStyleResolver;

    fn tree(markup: &str) -> PresentationTree {
        PresentationTree::parse(markup).unwrap()
    }

    #[test]
    fn direct_child_wins() {
        let tree = tree(
            r#"<div id="c">
                 <svg data-which="direct"/>
                 <div><svg data-which="nested"/></div>
               </div>"#,
        );
        let found = find_chart_root(tree.element_by_id("c").unwrap()).unwrap();
        assert_eq!(found.attr("data-which"), Some("direct"));
    }

    #[test]
    fn nested_hit_through_wrapper() {
        let tree = tree(
            r#"<div id="c">
                 <figure><svg data-which="wrapped"/></figure>
               </div>"#,
        );
        let found = find_chart_root(tree.element_by_id("c").unwrap()).unwrap();
        assert_eq!(found.attr("data-which"), Some("wrapped"));
    }

    #[test]
    fn deep_descendant_as_last_resort() {
        let tree = tree(
            r#"<div id="c">
                 <span><p><svg data-which="deep"/></p></span>
               </div>"#,
        );
        let found = find_chart_root(tree.element_by_id("c").unwrap()).unwrap();
        assert_eq!(found.attr("data-which"), Some("deep"));
    }

    #[tokio::test]
    async fn missing_container_is_a_miss_not_an_error() {
        let tree = tree(r#"<main><div id="other"/></main>"#);
        let result = extract_chart(
            &tree,
            "revenue-chart",
            &StaticStyleResolver::new(),
            &Rasterizer,
            &RasterOptions::default(),
        )
        .await;
        assert!(!result.success);
        assert!(result.asset.is_none());
        assert!(matches!(result.error, Some(SectionError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn converter_failures_keep_their_error_kind() {
        // A surface of zero pixels is a converter failure, not a missing
        // source, and the result says so.
        let tree = tree(
            r#"<main>
                 <div id="revenue-chart">
                   <svg viewBox="0 0 1 1"><rect width="1" height="1"/></svg>
                 </div>
               </main>"#,
        );
        let result = extract_chart(
            &tree,
            "revenue-chart",
            &StaticStyleResolver::new(),
            &Rasterizer,
            &RasterOptions::default().with_scale(0.1),
        )
        .await;
        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(SectionError::ContextUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn container_without_vector_content_is_a_miss() {
        let tree = tree(r#"<main><div id="revenue-chart"><p>loading</p></div></main>"#);
        let result = extract_chart(
            &tree,
            "revenue-chart",
            &StaticStyleResolver::new(),
            &Rasterizer,
            &RasterOptions::default(),
        )
        .await;
        assert!(!result.success);
        assert!(result.asset.is_none());
    }

    #[tokio::test]
    async fn successful_extraction_upholds_the_invariant() {
        let tree = tree(
            r#"<main>
                 <div id="revenue-chart">
                   <svg width="64" height="32" viewBox="0 0 64 32">
                     <rect width="64" height="32" fill="rgb(0, 128, 255)"/>
                   </svg>
                 </div>
               </main>"#,
        );
        let result = extract_chart(
            &tree,
            "revenue-chart",
            &StaticStyleResolver::new(),
            &Rasterizer,
            &RasterOptions::default().with_scale(2.0),
        )
        .await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.asset.is_some());
        assert_eq!((result.width, result.height), (128.0, 64.0));
    }

    #[tokio::test]
    async fn extraction_leaves_the_live_tree_untouched() {
        let markup = r#"<main>
             <div id="revenue-chart">
               <svg width="10" height="10"><defs><linearGradient id="g"/></defs>
                 <rect fill="url(#g)" width="10" height="10"/>
               </svg>
             </div>
           </main>"#;
        let tree = tree(markup);
        let before = tree.root().serialize();
        let _ = extract_chart(
            &tree,
            "revenue-chart",
            &StaticStyleResolver::new(),
            &Rasterizer,
            &RasterOptions::default(),
        )
        .await;
        assert_eq!(tree.root().serialize(), before);
    }
}
