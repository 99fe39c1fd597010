//! Serialization and rasterization of prepared vector subtrees.
//!
//! A subtree that has been through style inlining and id deduplication is
//! turned into a reusable asset here: either a self-contained SVG string
//! (vector passthrough) or a PNG rendered at `size × scale` over a background
//! fill.  Decoding goes through `usvg`, drawing through `resvg`.
//!
//! Two execution contracts share one compose step:
//! [`Rasterizer::convert_sync`] is best-effort and does not wait for the
//! decode to finish, [`Rasterizer::convert`] awaits the decode under a
//! bounded timeout and is the variant deterministic callers must use.

use std::time::Duration;

use resvg::tiny_skia::{Color, Pixmap, PixmapPaint, Transform};

use crate::dom::Element;
use crate::error::SectionError;

/// Fallback dimensions when neither the caller nor the markup provide a size.
pub const FALLBACK_WIDTH: f64 = 600.0;
/// See [`FALLBACK_WIDTH`].
pub const FALLBACK_HEIGHT: f64 = 400.0;

/// Upper bound on a single decode; exceeding it counts as a decode failure.
/// A host that never reports completion must not hang the export.
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(5);

/// Output mode of the converter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Serialize only; no rasterization occurs.
    Vector,
    /// Decode and draw into a pixel surface, encode as PNG.
    Raster,
}

/// Conversion parameters.
#[derive(Clone, Debug)]
pub struct RasterOptions {
    /// Target width in CSS pixels; inferred from the markup when `None`.
    pub width: Option<f64>,
    /// Target height in CSS pixels; inferred from the markup when `None`.
    pub height: Option<f64>,
    /// Device scale applied on top of the target size.
    pub scale: f64,
    /// Background fill, painted before the vector content.
    pub background: [u8; 4],
    /// Vector passthrough or full rasterization.
    pub mode: OutputMode,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            scale: 1.0,
            background: [255, 255, 255, 255],
            mode: OutputMode::Raster,
        }
    }
}

impl RasterOptions {
    /// Passthrough options: serialize, never rasterize.
    pub fn vector() -> Self {
        Self {
            mode: OutputMode::Vector,
            ..Self::default()
        }
    }

    /// Sets an explicit target size.
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Sets the device scale.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the background fill.
    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }
}

/// A resolved, portable image asset.
#[derive(Clone, Debug)]
pub enum Asset {
    /// Self-contained SVG markup plus its nominal size.
    Vector {
        /// Standalone SVG text.
        svg: String,
        /// Nominal width in CSS pixels.
        width: f64,
        /// Nominal height in CSS pixels.
        height: f64,
    },
    /// PNG-encoded raster content.
    Raster {
        /// Encoded PNG bytes.
        png: Vec<u8>,
        /// Surface width in device pixels.
        width: u32,
        /// Surface height in device pixels.
        height: u32,
    },
}

impl Asset {
    /// Pixel dimensions of the asset, whatever its representation.
    pub fn pixel_size(&self) -> (f64, f64) {
        match self {
            Asset::Vector { width, height, .. } => (*width, *height),
            Asset::Raster { width, height, .. } => (f64::from(*width), f64::from(*height)),
        }
    }
}

struct Prepared {
    svg: String,
    width: f64,
    height: f64,
}

/// Vector-to-raster converter.
#[derive(Clone, Copy, Debug, Default)]
pub struct Rasterizer;

impl Rasterizer {
    /// Best-effort synchronous conversion.
    ///
    /// The decode is issued to a worker and the compose step takes whatever
    /// has completed by draw time — usually nothing, in which case the output
    /// is a background-only image.  This mirrors the legacy synchronous path
    /// and is kept as documented behavior; callers needing deterministic
    /// output must use [`Rasterizer::convert`] instead.
    pub fn convert_sync(
        &self,
        root: &Element,
        options: &RasterOptions,
    ) -> Result<Asset, SectionError> {
        let prepared = prepare(root, options);
        if options.mode == OutputMode::Vector {
            return Ok(vector_asset(prepared));
        }

        let (surface_width, surface_height) = surface_size(&prepared, options)?;
        let svg = prepared.svg.clone();
        let (sender, receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = sender.send(decode_to_pixmap(&svg, surface_width, surface_height));
        });

        // No await: poll once and draw with whatever is there.
        let decoded = receiver.try_recv().ok().and_then(Result::ok);
        compose(surface_width, surface_height, options.background, decoded)
    }

    /// Guaranteed asynchronous conversion: awaits decode completion (or a
    /// load failure) before drawing and encoding.  A decode exceeding
    /// [`DECODE_TIMEOUT`] is treated identically to a decode failure.
    pub async fn convert(
        &self,
        root: &Element,
        options: &RasterOptions,
    ) -> Result<Asset, SectionError> {
        let prepared = prepare(root, options);
        if options.mode == OutputMode::Vector {
            return Ok(vector_asset(prepared));
        }

        let (surface_width, surface_height) = surface_size(&prepared, options)?;
        let svg = prepared.svg.clone();
        let decode =
            tokio::task::spawn_blocking(move || decode_to_pixmap(&svg, surface_width, surface_height));

        let decoded = tokio::time::timeout(DECODE_TIMEOUT, decode)
            .await
            .map_err(|_| SectionError::DecodeFailure("decode timed out".to_string()))?
            .map_err(|join| SectionError::DecodeFailure(join.to_string()))?
            .map_err(SectionError::DecodeFailure)?;

        compose(surface_width, surface_height, options.background, Some(decoded))
    }
}

fn vector_asset(prepared: Prepared) -> Asset {
    Asset::Vector {
        svg: prepared.svg,
        width: prepared.width,
        height: prepared.height,
    }
}

/// Serializes the subtree as standalone SVG with resolved dimensions.
fn prepare(root: &Element, options: &RasterOptions) -> Prepared {
    let (inferred_width, inferred_height) = infer_size(root);
    let width = options.width.filter(|value| *value > 0.0).unwrap_or(inferred_width);
    let height = options.height.filter(|value| *value > 0.0).unwrap_or(inferred_height);

    let mut standalone = root.clone();
    standalone.set_attr("xmlns", "http://www.w3.org/2000/svg");
    standalone.set_attr("width", format_dimension(width));
    standalone.set_attr("height", format_dimension(height));

    let mut svg = standalone.serialize();
    if svg.contains("xlink:href") {
        standalone.set_attr("xmlns:xlink", "http://www.w3.org/1999/xlink");
        svg = standalone.serialize();
    }

    Prepared { svg, width, height }
}

fn format_dimension(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        format!("{}", value)
    }
}

/// Rendered size resolution order: explicit target, the element's own
/// width/height attributes, the viewBox, then the fixed fallback.
fn infer_size(root: &Element) -> (f64, f64) {
    let parse_px = |value: &str| -> Option<f64> {
        value
            .trim()
            .trim_end_matches("px")
            .parse::<f64>()
            .ok()
            .filter(|parsed| *parsed > 0.0)
    };

    let width = root.attr("width").and_then(|value| parse_px(value));
    let height = root.attr("height").and_then(|value| parse_px(value));
    if let (Some(width), Some(height)) = (width, height) {
        return (width, height);
    }

    if let Some(view_box) = root.attr("viewBox") {
        let parts: Vec<f64> = view_box
            .split_whitespace()
            .filter_map(|part| part.parse().ok())
            .collect();
        if parts.len() == 4 && parts[2] > 0.0 && parts[3] > 0.0 {
            return (parts[2], parts[3]);
        }
    }

    (FALLBACK_WIDTH, FALLBACK_HEIGHT)
}

fn surface_size(prepared: &Prepared, options: &RasterOptions) -> Result<(u32, u32), SectionError> {
    let scale = if options.scale > 0.0 { options.scale } else { 1.0 };
    let width = (prepared.width * scale).round() as u32;
    let height = (prepared.height * scale).round() as u32;
    if width == 0 || height == 0 {
        return Err(SectionError::ContextUnavailable(format!(
            "invalid surface size {}x{}",
            width, height
        )));
    }
    Ok((width, height))
}

/// Decode worker: parse the SVG and draw it scaled into a transparent surface.
fn decode_to_pixmap(svg: &str, width: u32, height: u32) -> Result<Pixmap, String> {
    let mut usvg_options = usvg::Options::default();
    usvg_options.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(svg, &usvg_options).map_err(|err| err.to_string())?;

    let mut pixmap =
        Pixmap::new(width, height).ok_or_else(|| "could not allocate decode surface".to_string())?;
    let size = tree.size();
    let scale_x = width as f32 / size.width();
    let scale_y = height as f32 / size.height();
    resvg::render(&tree, Transform::from_scale(scale_x, scale_y), &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Shared compose step: paint the background, draw whatever was decoded,
/// encode the surface as PNG.
fn compose(
    width: u32,
    height: u32,
    background: [u8; 4],
    decoded: Option<Pixmap>,
) -> Result<Asset, SectionError> {
    let mut surface = Pixmap::new(width, height).ok_or_else(|| {
        SectionError::ContextUnavailable(format!("could not allocate {}x{} surface", width, height))
    })?;
    let [r, g, b, a] = background;
    surface.fill(Color::from_rgba8(r, g, b, a));

    if let Some(content) = decoded {
        surface.draw_pixmap(
            0,
            0,
            content.as_ref(),
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
    }

    let png = surface
        .encode_png()
        .map_err(|err| SectionError::DecodeFailure(err.to_string()))?;
    Ok(Asset::Raster { png, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::PresentationTree;

    const RED_SQUARE: &str = r#"
        <svg width="40" height="40" viewBox="0 0 40 40">
          <rect x="0" y="0" width="40" height="40" fill="rgb(255, 0, 0)"/>
        </svg>"#;

    fn parse_root(markup: &str) -> PresentationTree {
        PresentationTree::parse(markup).unwrap()
    }

    #[test]
    fn vector_passthrough_is_self_contained() {
        let tree = parse_root(RED_SQUARE);
        let asset = Rasterizer
            .convert_sync(tree.root(), &RasterOptions::vector())
            .unwrap();
        match asset {
            Asset::Vector { svg, width, height } => {
                assert!(svg.contains("xmlns=\"http://www.w3.org/2000/svg\""));
                assert_eq!((width, height), (40.0, 40.0));
            }
            Asset::Raster { .. } => panic!("expected vector asset"),
        }
    }

    #[test]
    fn size_inference_falls_back() {
        let tree = parse_root("<svg><rect/></svg>");
        assert_eq!(infer_size(tree.root()), (FALLBACK_WIDTH, FALLBACK_HEIGHT));

        let tree = parse_root("<svg viewBox=\"0 0 120 80\"><rect/></svg>");
        assert_eq!(infer_size(tree.root()), (120.0, 80.0));
    }

    #[test]
    fn sync_conversion_yields_a_surface_of_the_requested_size() {
        let tree = parse_root(RED_SQUARE);
        let options = RasterOptions::default().with_scale(2.0);
        let asset = Rasterizer.convert_sync(tree.root(), &options).unwrap();
        match asset {
            Asset::Raster { png, width, height } => {
                // Decode completion is not guaranteed, the surface always is.
                assert_eq!((width, height), (80, 80));
                assert_eq!(&png[1..4], b"PNG");
            }
            Asset::Vector { .. } => panic!("expected raster asset"),
        }
    }

    #[tokio::test]
    async fn async_conversion_renders_the_content() {
        let tree = parse_root(RED_SQUARE);
        let asset = Rasterizer
            .convert(tree.root(), &RasterOptions::default())
            .await
            .unwrap();
        let Asset::Raster { png, width, height } = asset else {
            panic!("expected raster asset");
        };
        assert_eq!((width, height), (40, 40));

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        let center = decoded.get_pixel(20, 20);
        assert_eq!(center.0[..3], [255, 0, 0]);
    }

    #[tokio::test]
    async fn async_conversion_rejects_non_vector_content() {
        // A panel root that is not vector markup cannot be decoded.
        let broken = crate::dom::Element::new("div");
        let result = Rasterizer.convert(&broken, &RasterOptions::default()).await;
        assert!(matches!(result, Err(SectionError::DecodeFailure(_))));
    }

    #[test]
    fn zero_sized_surface_is_rejected() {
        let tiny = parse_root("<svg viewBox=\"0 0 1 1\"><rect/></svg>");
        let result =
            Rasterizer.convert_sync(tiny.root(), &RasterOptions::default().with_scale(0.1));
        assert!(matches!(result, Err(SectionError::ContextUnavailable(_))));
    }
}
