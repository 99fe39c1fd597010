//! Deterministic page layout planning.
//!
//! The planner turns an ordered list of resolved sections into a
//! [`DocumentPlan`]: which block lands on which page, at what size, with
//! which footer text.  It is pure arithmetic over page geometry — no PDF
//! library is involved — so pagination rules can be tested exactly.  The
//! composer renders the plan afterwards.

use crate::model::{format_currency, format_signed_pct, RowKind, TableRow};
use crate::raster::Asset;

/// CSS pixels to millimeters at the conventional 96 dpi.
pub const MM_PER_PX: f64 = 25.4 / 96.0;

/// Fixed page geometry, in millimeters.
#[derive(Clone, Debug)]
pub struct PageGeometry {
    /// Page width.
    pub page_width: f64,
    /// Page height.
    pub page_height: f64,
    /// Uniform margin on all four edges.
    pub margin: f64,
    /// Band reserved at the top of every page for the running header.
    pub header_band: f64,
    /// Band reserved at the bottom of every page for the footer.
    pub footer_band: f64,
    /// Height of a section title line above images and tables.
    pub section_title_height: f64,
    /// Height of the table's column-header row.
    pub table_header_height: f64,
    /// Height of one table data row.
    pub table_row_height: f64,
}

impl Default for PageGeometry {
    /// A4 portrait with 15 mm margins and 12 mm header/footer bands.
    fn default() -> Self {
        Self {
            page_width: 210.0,
            page_height: 297.0,
            margin: 15.0,
            header_band: 12.0,
            footer_band: 12.0,
            section_title_height: 10.0,
            table_header_height: 13.0,
            table_row_height: 11.0,
        }
    }
}

impl PageGeometry {
    /// Width of the content box.
    pub fn content_width(&self) -> f64 {
        self.page_width - 2.0 * self.margin
    }

    /// Height of the content box: page minus margins minus both bands.
    pub fn content_height(&self) -> f64 {
        self.page_height - 2.0 * self.margin - self.header_band - self.footer_band
    }

    /// Data rows that fit on one table page, after the title line and the
    /// column header.
    pub fn table_rows_per_page(&self) -> usize {
        let available =
            self.content_height() - self.section_title_height - self.table_header_height;
        (available / self.table_row_height).floor().max(0.0) as usize
    }
}

/// The closed set of report section kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    /// Title page with aggregate metrics.
    Cover,
    /// Revenue chart image.
    Chart,
    /// Forecast statistics panel.
    Stats,
    /// Insights panel.
    Insights,
    /// Funnel panel.
    Funnel,
    /// Revenue data table.
    Table,
}

impl SectionKind {
    /// Default display title.
    pub fn title(self) -> &'static str {
        match self {
            SectionKind::Cover => "Revenue Forecast Report",
            SectionKind::Chart => "Revenue Chart",
            SectionKind::Stats => "Forecast Statistics",
            SectionKind::Insights => "Insights",
            SectionKind::Funnel => "Pipeline Funnel",
            SectionKind::Table => "Revenue Data",
        }
    }
}

/// A section after resolution, ready for layout.
#[derive(Clone, Debug)]
pub struct ResolvedSection {
    /// Which section this is.
    pub kind: SectionKind,
    /// Display title.
    pub title: String,
    /// The resolved payload.
    pub content: SectionContent,
}

/// Payload of a resolved section.
#[derive(Clone, Debug)]
pub enum SectionContent {
    /// Aggregates for the cover page.
    Cover(CoverSummary),
    /// An image asset (chart or panel).
    Image(Asset),
    /// The full, caller-ordered row set.
    Table(Vec<TableRow>),
}

/// Aggregate metrics shown on the cover, computed over the entire dataset.
#[derive(Clone, Debug, Default)]
pub struct CoverSummary {
    /// Sum of revenue over all rows.
    pub total_revenue: f64,
    /// Mean revenue per row; zero for an empty row set.
    pub average_revenue: f64,
    /// Relative change from the first to the last row, in percent; zero when
    /// the first row's revenue is zero or fewer than two rows exist.
    pub growth_pct: f64,
    /// Number of historical rows.
    pub historical_rows: usize,
    /// Number of forecast rows.
    pub forecast_rows: usize,
}

impl CoverSummary {
    /// Computes the cover aggregates from the full row set.
    pub fn from_rows(rows: &[TableRow]) -> Self {
        let total_revenue: f64 = rows.iter().map(|row| row.revenue).sum();
        let average_revenue = if rows.is_empty() {
            0.0
        } else {
            total_revenue / rows.len() as f64
        };
        let growth_pct = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) if rows.len() > 1 && first.revenue != 0.0 => {
                (last.revenue - first.revenue) / first.revenue * 100.0
            }
            _ => 0.0,
        };
        Self {
            total_revenue,
            average_revenue,
            growth_pct,
            historical_rows: rows.iter().filter(|row| row.kind == RowKind::Historical).count(),
            forecast_rows: rows.iter().filter(|row| row.kind == RowKind::Forecast).count(),
        }
    }

    /// The three headline lines printed on the cover.
    pub fn headline_lines(&self) -> Vec<String> {
        vec![
            format!("Total revenue: {}", format_currency(self.total_revenue)),
            format!("Average per month: {}", format_currency(self.average_revenue)),
            format!("Growth over period: {}", format_signed_pct(self.growth_pct)),
        ]
    }
}

/// An image scaled and centered into a box.
#[derive(Clone, Debug)]
pub struct ImagePlacement {
    /// Which section the image belongs to.
    pub kind: SectionKind,
    /// Title printed above the image.
    pub title: String,
    /// Rendered width in millimeters.
    pub width: f64,
    /// Rendered height in millimeters.
    pub height: f64,
    /// Horizontal centering offset from the content box's left edge.
    pub offset_x: f64,
    /// The asset to draw.
    pub asset: Asset,
}

/// One page's worth of table rows.
#[derive(Clone, Debug)]
pub struct TableChunk {
    /// Title printed above the table.
    pub title: String,
    /// Indices of this chunk within the section's full row set.
    pub span: std::ops::Range<usize>,
    /// The rows on this page.  Shading alternates by position within this
    /// list, so every page restarts at the unshaded row.
    pub rows: Vec<TableRow>,
    /// Whether this chunk continues a table started on an earlier page.
    pub continued: bool,
}

/// A block placed on a page.
#[derive(Clone, Debug)]
pub enum PageBlock {
    /// Cover headline.
    Cover {
        /// Cover title.
        title: String,
        /// Aggregates over the full dataset.
        summary: CoverSummary,
    },
    /// A fitted image.
    Image(ImagePlacement),
    /// A table page.
    Table(TableChunk),
}

/// One planned page.
#[derive(Clone, Debug)]
pub struct PagePlan {
    /// 1-based page number; contiguous across the plan.
    pub number: usize,
    /// Footer text, filled by the final pass once the total is known.
    pub footer: String,
    /// Blocks on this page, top to bottom.
    pub blocks: Vec<PageBlock>,
}

/// The full layout plan for one document.
#[derive(Clone, Debug)]
pub struct DocumentPlan {
    /// Geometry the plan was computed against.
    pub geometry: PageGeometry,
    /// Pages in order.
    pub pages: Vec<PagePlan>,
}

impl DocumentPlan {
    /// Total page count.
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }
}

/// Scales native pixel dimensions to fit a box, preserving aspect ratio and
/// never exceeding the asset's native size in millimeters.  Returns the
/// rendered size in millimeters.
pub fn fit_image(native_px: (f64, f64), box_mm: (f64, f64)) -> (f64, f64) {
    let (native_width, native_height) = native_px;
    let (box_width, box_height) = box_mm;
    if native_width <= 0.0 || native_height <= 0.0 {
        return (0.0, 0.0);
    }

    let natural_width = native_width * MM_PER_PX;
    let natural_height = native_height * MM_PER_PX;
    let scale = (box_width / natural_width)
        .min(box_height / natural_height)
        .min(1.0);
    (natural_width * scale, natural_height * scale)
}

/// Lays the resolved sections out onto pages.
///
/// Sections appear in caller-supplied order, one page per section, with two
/// exceptions: a table spanning multiple pages, and a stats section
/// immediately followed by an insights section — those two share one page,
/// each image fitted into half the content box.  Footers are written in a
/// final pass after every content page exists.
pub fn plan_document(sections: &[ResolvedSection], geometry: &PageGeometry) -> DocumentPlan {
    let mut pages: Vec<PagePlan> = Vec::new();
    let full_box = (
        geometry.content_width(),
        geometry.content_height() - geometry.section_title_height,
    );
    let half_box = (full_box.0, (full_box.1 - geometry.section_title_height) / 2.0);

    let mut index = 0;
    while index < sections.len() {
        let section = &sections[index];
        match &section.content {
            SectionContent::Cover(summary) => {
                pages.push(page_with(vec![PageBlock::Cover {
                    title: section.title.clone(),
                    summary: summary.clone(),
                }]));
                index += 1;
            }
            SectionContent::Image(asset) => {
                // Stats followed directly by insights share one page.
                let companion = if section.kind == SectionKind::Stats {
                    sections.get(index + 1).and_then(|next| match &next.content {
                        SectionContent::Image(next_asset)
                            if next.kind == SectionKind::Insights =>
                        {
                            Some((next, next_asset))
                        }
                        _ => None,
                    })
                } else {
                    None
                };
                if let Some((next, next_asset)) = companion {
                    pages.push(page_with(vec![
                        place_image(section, asset, half_box),
                        place_image(next, next_asset, half_box),
                    ]));
                    index += 2;
                } else {
                    pages.push(page_with(vec![place_image(section, asset, full_box)]));
                    index += 1;
                }
            }
            SectionContent::Table(rows) => {
                let capacity = geometry.table_rows_per_page().max(1);
                if rows.is_empty() {
                    pages.push(page_with(vec![PageBlock::Table(TableChunk {
                        title: section.title.clone(),
                        span: 0..0,
                        rows: Vec::new(),
                        continued: false,
                    })]));
                } else {
                    let mut start = 0;
                    while start < rows.len() {
                        let end = (start + capacity).min(rows.len());
                        pages.push(page_with(vec![PageBlock::Table(TableChunk {
                            title: section.title.clone(),
                            span: start..end,
                            rows: rows[start..end].to_vec(),
                            continued: start > 0,
                        })]));
                        start = end;
                    }
                }
                index += 1;
            }
        }
    }

    // Final pass: number pages and write footers now that the total is known.
    let total = pages.len();
    for (position, page) in pages.iter_mut().enumerate() {
        page.number = position + 1;
        page.footer = format!("Page {} of {}", page.number, total);
    }

    DocumentPlan {
        geometry: geometry.clone(),
        pages,
    }
}

fn page_with(blocks: Vec<PageBlock>) -> PagePlan {
    PagePlan {
        number: 0,
        footer: String::new(),
        blocks,
    }
}

fn place_image(section: &ResolvedSection, asset: &Asset, box_mm: (f64, f64)) -> PageBlock {
    let (width, height) = fit_image(asset.pixel_size(), box_mm);
    PageBlock::Image(ImagePlacement {
        kind: section.kind,
        title: section.title.clone(),
        width,
        height,
        offset_x: (box_mm.0 - width) / 2.0,
        asset: asset.clone(),
    })
}
