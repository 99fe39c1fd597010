//! Panel rasterization: capture a dashboard panel as a crisp image.
//!
//! Two paths produce the same kind of asset.  The live path mutates the
//! panel subtree (forces it visible and un-clipped), waits for the host to
//! settle, renders at double resolution over white, and restores the captured
//! styles whether rendering succeeded or not.  The headless path synthesizes
//! an equivalent stats panel directly from a [`ForecastMetrics`] record, with
//! no live subtree involved.

use std::fmt::Write as _;
use std::time::Duration;

use log::warn;

use crate::dom::{Element, PresentationTree};
use crate::error::SectionError;
use crate::model::{format_currency, format_signed_pct, ForecastMetrics};
use crate::raster::{Asset, RasterOptions, Rasterizer};

/// Delay between forcing visibility and reading the subtree, giving the host
/// time to settle any pending reflow.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Panels render at double resolution so text stays sharp in print.
pub const PANEL_SCALE: f64 = 2.0;

/// Inline styles the visibility pass overrides, captured per element so the
/// exact prior state can be reinstated.
const RESTORED_PROPERTIES: &[&str] = &["visibility", "overflow", "white-space", "display"];

/// Captured pre-mutation styles for one panel subtree.
///
/// Consumed by [`StyleRestore::restore`], the single restore action run on
/// both the success and failure paths.  Elements are addressed by child-index
/// paths relative to the panel root, so the capture stays valid as long as
/// the subtree's shape does not change underneath it.
#[derive(Debug)]
pub struct StyleRestore {
    saved: Vec<(Vec<usize>, Vec<(&'static str, Option<String>)>)>,
}

impl StyleRestore {
    /// Records the overridable style properties of every element in `panel`.
    pub fn capture(panel: &Element) -> Self {
        let mut saved = Vec::new();
        capture_recursive(panel, &mut Vec::new(), &mut saved);
        Self { saved }
    }

    /// Reinstates every captured property, removing declarations that did not
    /// exist before the visibility pass.
    pub fn restore(self, panel: &mut Element) {
        for (path, properties) in self.saved {
            let Some(element) = panel.node_at_path_mut(&path) else {
                continue;
            };
            for (property, value) in properties {
                match value {
                    Some(value) => element.set_style_value(property, &value),
                    None => element.remove_style_value(property),
                }
            }
        }
    }
}

fn capture_recursive(
    element: &Element,
    path: &mut Vec<usize>,
    saved: &mut Vec<(Vec<usize>, Vec<(&'static str, Option<String>)>)>,
) {
    let properties = RESTORED_PROPERTIES
        .iter()
        .map(|property| (*property, element.style_value(property)))
        .collect();
    saved.push((path.clone(), properties));
    for (index, child) in element.children.iter().enumerate() {
        path.push(index);
        capture_recursive(child, path, saved);
        path.pop();
    }
}

/// Forces the subtree fully visible and un-clipped.
fn force_visible(panel: &mut Element) {
    panel.walk_mut(&mut |element| {
        element.set_style_value("visibility", "visible");
        element.set_style_value("overflow", "visible");
        element.set_style_value("white-space", "nowrap");
        if element.style_value("display").as_deref() == Some("none") {
            element.set_style_value("display", "block");
        }
    });
}

/// Renders the panel under `panel_id` at [`PANEL_SCALE`] over white.
///
/// The live tree is mutated for the duration of the render and restored
/// before this function returns, on every path.  Callers are expected to hold
/// exclusive access to the tree across the call.
///
/// Only vector content renders meaningfully: a panel without an `svg` root
/// or descendant still produces an image, but the decoder draws nothing for
/// unknown elements and the result is the plain background.  Such panels are
/// flagged with a warning.
pub async fn rasterize_panel(
    tree: &mut PresentationTree,
    panel_id: &str,
    rasterizer: &Rasterizer,
) -> Result<Asset, SectionError> {
    let restore = {
        let Some(panel) = tree.element_by_id_mut(panel_id) else {
            return Err(SectionError::SourceNotFound(format!(
                "panel '{}' not found",
                panel_id
            )));
        };
        let restore = StyleRestore::capture(panel);
        force_visible(panel);
        restore
    };

    tokio::time::sleep(SETTLE_DELAY).await;

    let outcome = match tree.element_by_id(panel_id) {
        Some(panel) => {
            if panel.tag != "svg" && panel.descendant_with_tag("svg").is_none() {
                warn!(
                    "panel '{}' has no vector content; rendering background only",
                    panel_id
                );
            }
            let root = renderable_root(panel);
            let options = RasterOptions::default().with_scale(PANEL_SCALE);
            rasterizer.convert(&root, &options).await
        }
        None => Err(SectionError::SourceNotFound(format!(
            "panel '{}' disappeared during settle",
            panel_id
        ))),
    };

    // Restore runs regardless of the render outcome.
    if let Some(panel) = tree.element_by_id_mut(panel_id) {
        restore.restore(panel);
    }

    outcome
}

/// Produces a vector root the decoder accepts.  A panel that already is an
/// `svg` renders as-is; anything else gets its children lifted into a fresh
/// `svg` root carrying the panel's declared size.
fn renderable_root(panel: &Element) -> Element {
    if panel.tag == "svg" {
        return panel.clone();
    }

    let mut root = Element::new("svg");
    for attribute in ["width", "height", "viewBox"] {
        if let Some(value) = panel.attr(attribute) {
            root.set_attr(attribute, value);
        }
    }

    let mut group = Element::new("g");
    if let Some(style) = panel.attr("style") {
        group.set_attr("style", style);
    }
    group.children = panel.children.clone();
    group.text = panel.text.clone();
    root.children.push(group);
    root
}

const STATS_WIDTH: u32 = 840;
const STATS_HEIGHT: u32 = 400;
const CARD_FILL: &str = "#f4f5f7";
const INK: &str = "#1f2430";
const MUTED: &str = "#6b7280";
const POSITIVE: &str = "#15803d";
const NEGATIVE: &str = "#b91c1c";

struct Card<'a> {
    label: &'a str,
    value: String,
    note: Option<String>,
    note_positive: bool,
}

/// Synthesizes the forecast-stats panel as standalone SVG markup, for hosts
/// without a live stats subtree.  Layout is two rows of highlight cards: the
/// twelve-month summary on top, the per-horizon forecasts below.
pub fn stats_panel_markup(metrics: &ForecastMetrics) -> String {
    let top = [
        Card {
            label: "12-month forecast",
            value: format_currency(metrics.twelve_month_total),
            note: Some(format!(
                "avg {} / month",
                format_currency(metrics.twelve_month_average)
            )),
            note_positive: true,
        },
        Card {
            label: "Trailing 12-month baseline",
            value: format_currency(metrics.twelve_month_baseline),
            note: None,
            note_positive: true,
        },
        Card {
            label: "Change vs baseline",
            value: format_currency(metrics.delta),
            note: Some(format_signed_pct(metrics.delta_pct)),
            note_positive: metrics.delta >= 0.0,
        },
    ];
    let bottom = [
        Card {
            label: "Next month",
            value: format_currency(metrics.one_month),
            note: Some(format!("{} vs baseline", format_signed_pct(metrics.one_month_pct))),
            note_positive: metrics.one_month_pct >= 0.0,
        },
        Card {
            label: "Next 3 months",
            value: format_currency(metrics.three_month),
            note: Some(format!("{} vs baseline", format_signed_pct(metrics.three_month_pct))),
            note_positive: metrics.three_month_pct >= 0.0,
        },
        Card {
            label: "Next 6 months",
            value: format_currency(metrics.six_month),
            note: Some(format!("{} vs baseline", format_signed_pct(metrics.six_month_pct))),
            note_positive: metrics.six_month_pct >= 0.0,
        },
    ];

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
        w = STATS_WIDTH,
        h = STATS_HEIGHT,
    );
    let _ = writeln!(svg, "  <rect width=\"{}\" height=\"{}\" fill=\"#ffffff\"/>", STATS_WIDTH, STATS_HEIGHT);
    let _ = writeln!(
        svg,
        "  <text x=\"24\" y=\"42\" font-family=\"Helvetica, Arial, sans-serif\" font-size=\"22\" font-weight=\"bold\" fill=\"{}\">Forecast summary</text>",
        INK,
    );

    write_card_row(&mut svg, &top, 64.0);
    write_card_row(&mut svg, &bottom, 232.0);

    svg.push_str("</svg>\n");
    svg
}

fn write_card_row(svg: &mut String, cards: &[Card<'_>], top: f64) {
    const MARGIN: f64 = 24.0;
    const GAP: f64 = 16.0;
    const HEIGHT: f64 = 144.0;
    let width =
        (f64::from(STATS_WIDTH) - 2.0 * MARGIN - GAP * (cards.len() as f64 - 1.0)) / cards.len() as f64;

    for (index, card) in cards.iter().enumerate() {
        let x = MARGIN + index as f64 * (width + GAP);
        let _ = writeln!(
            svg,
            "  <rect x=\"{:.0}\" y=\"{:.0}\" width=\"{:.0}\" height=\"{:.0}\" rx=\"10\" fill=\"{}\"/>",
            x, top, width, HEIGHT, CARD_FILL,
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{:.0}\" y=\"{:.0}\" font-family=\"Helvetica, Arial, sans-serif\" font-size=\"13\" fill=\"{}\">{}</text>",
            x + 16.0,
            top + 32.0,
            MUTED,
            escape(card.label),
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{:.0}\" y=\"{:.0}\" font-family=\"Helvetica, Arial, sans-serif\" font-size=\"26\" font-weight=\"bold\" fill=\"{}\">{}</text>",
            x + 16.0,
            top + 72.0,
            INK,
            escape(&card.value),
        );
        if let Some(note) = &card.note {
            let color = if card.note_positive { POSITIVE } else { NEGATIVE };
            let _ = writeln!(
                svg,
                "  <text x=\"{:.0}\" y=\"{:.0}\" font-family=\"Helvetica, Arial, sans-serif\" font-size=\"13\" fill=\"{}\">{}</text>",
                x + 16.0,
                top + 102.0,
                color,
                escape(note),
            );
        }
    }
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders the headless stats panel at [`PANEL_SCALE`] over white.
pub async fn rasterize_stats_panel(
    metrics: &ForecastMetrics,
    rasterizer: &Rasterizer,
) -> Result<Asset, SectionError> {
    let markup = stats_panel_markup(metrics);
    let tree = PresentationTree::parse(&markup)
        .map_err(|err| SectionError::DecodeFailure(err.to_string()))?;
    let options = RasterOptions::default().with_scale(PANEL_SCALE);
    rasterizer.convert(tree.root(), &options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metrics() -> ForecastMetrics {
        ForecastMetrics {
            twelve_month_total: 1_860_000.0,
            twelve_month_baseline: 1_500_000.0,
            delta: 360_000.0,
            delta_pct: 24.0,
            twelve_month_average: 155_000.0,
            one_month: 148_000.0,
            three_month: 452_000.0,
            six_month: 915_000.0,
            one_month_pct: 6.5,
            three_month_pct: 8.1,
            six_month_pct: -2.4,
        }
    }

    const PANEL: &str = r#"
        <main>
          <svg id="funnel-panel" width="80" height="40" viewBox="0 0 80 40" style="visibility: hidden; overflow: hidden">
            <rect width="80" height="40" fill="rgb(0, 200, 0)" style="display: none"/>
          </svg>
        </main>"#;

    #[test]
    fn capture_and_restore_round_trip() {
        let mut tree = PresentationTree::parse(PANEL).unwrap();
        let before = tree.element_by_id("funnel-panel").unwrap().serialize();

        let panel = tree.element_by_id_mut("funnel-panel").unwrap();
        let restore = StyleRestore::capture(panel);
        force_visible(panel);
        assert_eq!(panel.style_value("visibility").as_deref(), Some("visible"));
        assert_eq!(
            panel.children[0].style_value("display").as_deref(),
            Some("block")
        );

        restore.restore(tree.element_by_id_mut("funnel-panel").unwrap());
        assert_eq!(tree.element_by_id("funnel-panel").unwrap().serialize(), before);
    }

    #[test]
    fn restore_removes_added_declarations() {
        let mut panel = Element::new("svg");
        panel.children.push(Element::new("rect"));

        let restore = StyleRestore::capture(&panel);
        force_visible(&mut panel);
        assert!(panel.children[0].style_value("overflow").is_some());

        restore.restore(&mut panel);
        assert!(panel.style_value("visibility").is_none());
        assert!(panel.children[0].style_value("overflow").is_none());
    }

    #[tokio::test]
    async fn live_panel_renders_at_double_scale_and_restores() {
        let mut tree = PresentationTree::parse(PANEL).unwrap();
        let before = tree.element_by_id("funnel-panel").unwrap().serialize();

        let asset = rasterize_panel(&mut tree, "funnel-panel", &Rasterizer)
            .await
            .unwrap();
        assert_eq!(asset.pixel_size(), (160.0, 80.0));
        assert_eq!(tree.element_by_id("funnel-panel").unwrap().serialize(), before);
    }

    #[tokio::test]
    async fn panel_without_vector_content_renders_background_only() {
        let mut tree = PresentationTree::parse(
            r#"<main>
                 <div id="card-panel" width="50" height="30"><p>Churn risk: low</p></div>
               </main>"#,
        )
        .unwrap();

        let asset = rasterize_panel(&mut tree, "card-panel", &Rasterizer)
            .await
            .unwrap();
        assert_eq!(asset.pixel_size(), (100.0, 60.0));

        let Asset::Raster { png, .. } = asset else {
            panic!("expected raster asset");
        };
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(50, 30).0, [255, 255, 255, 255]);
    }

    #[tokio::test]
    async fn missing_panel_is_source_not_found() {
        let mut tree = PresentationTree::parse("<main><div id=\"other\"/></main>").unwrap();
        let result = rasterize_panel(&mut tree, "funnel-panel", &Rasterizer).await;
        assert!(matches!(result, Err(SectionError::SourceNotFound(_))));
    }

    #[test]
    fn stats_markup_carries_every_headline_number() {
        let markup = stats_panel_markup(&sample_metrics());
        assert!(markup.contains("$1,860,000"));
        assert!(markup.contains("$1,500,000"));
        assert!(markup.contains("+24.0%"));
        assert!(markup.contains("$148,000"));
        assert!(markup.contains("-2.4%"));
        // Well-formed enough for the snapshot parser.
        assert!(PresentationTree::parse(&markup).is_ok());
    }

    #[tokio::test]
    async fn headless_stats_panel_renders() {
        let asset = rasterize_stats_panel(&sample_metrics(), &Rasterizer)
            .await
            .unwrap();
        let (width, height) = asset.pixel_size();
        assert_eq!((width, height), (1680.0, 800.0));
    }
}
