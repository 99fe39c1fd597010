//! Document composition: render a layout plan to PDF.
//!
//! The plan (§layout) already fixed page breaks, image sizes, and footer
//! text; this module walks it and emits the corresponding `genpdf` elements.
//! Page chrome — margins, header line, footer with page numbers — is applied
//! through a page decorator so every page carries it without the content code
//! knowing about it.

use chrono::Local;

use genpdf::elements::{Break, Image, PageBreak, Paragraph, TableLayout};
use genpdf::error::{Error, ErrorKind};
use genpdf::style::{Color, Style};
use genpdf::{Alignment, Element as _, Margins, Mm, PageDecorator, Position, Scale, Size};

use crate::error::ExportError;
use crate::fonts;
use crate::layout::{DocumentPlan, ImagePlacement, PageBlock, TableChunk};
use crate::model::{format_currency, ExportOptions};

/// `genpdf` assumes this density when sizing images natively.
const IMAGE_DPI: f64 = 300.0;
const MM_PER_INCH: f64 = 25.4;

const TITLE_SIZE: u8 = 24;
const SECTION_TITLE_SIZE: u8 = 16;
const BODY_SIZE: u8 = 10;

fn mm_from_f64(value: f64) -> Mm {
    Mm::from(printpdf::Mm(value))
}

type PageElementFactory = dyn Fn(usize) -> Box<dyn genpdf::Element>;

/// Footer definition rendered through the page decorator.
pub struct FooterSpec {
    height: Mm,
    factory: Box<PageElementFactory>,
}

impl FooterSpec {
    /// Creates a footer with a fixed reserved height.
    pub fn new<F, E>(height: impl Into<Mm>, factory: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: genpdf::Element + 'static,
    {
        Self {
            height: height.into(),
            factory: Box::new(move |page| Box::new(factory(page)) as Box<dyn genpdf::Element>),
        }
    }
}

/// Builder for report documents pre-configured with page chrome.
#[derive(Default)]
pub struct ReportDocumentBuilder {
    paper_size: Option<Size>,
    margins: Option<Margins>,
    header: Option<Box<PageElementFactory>>,
    footer: Option<FooterSpec>,
}

impl ReportDocumentBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paper size.
    pub fn with_paper_size(mut self, paper_size: impl Into<Size>) -> Self {
        self.paper_size = Some(paper_size.into());
        self
    }

    /// Sets the margins applied through the page decorator.
    pub fn with_margins(mut self, margins: impl Into<Margins>) -> Self {
        self.margins = Some(margins.into());
        self
    }

    /// Configures a header callback invoked for every page.
    pub fn with_header<F, E>(mut self, header: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: genpdf::Element + 'static,
    {
        self.header = Some(Box::new(move |page| {
            Box::new(header(page)) as Box<dyn genpdf::Element>
        }));
        self
    }

    /// Configures a footer callback with a fixed height.
    pub fn with_footer<F, E>(mut self, height: impl Into<Mm>, footer: F) -> Self
    where
        F: Fn(usize) -> E + 'static,
        E: genpdf::Element + 'static,
    {
        self.footer = Some(FooterSpec::new(height, footer));
        self
    }

    /// Builds a configured `genpdf::Document` with the report fonts.
    pub fn build(self) -> Result<genpdf::Document, ExportError> {
        let font_family =
            fonts::report_font_family().map_err(|err| ExportError::Font(err.to_string()))?;
        let mut document = genpdf::Document::new(font_family);

        if let Some(paper_size) = self.paper_size {
            document.set_paper_size(paper_size);
        }

        let decorator = ReportPageDecorator::new(self.margins, self.header, self.footer);
        document.set_page_decorator(decorator);

        Ok(document)
    }
}

struct ReportPageDecorator {
    page: usize,
    margins: Option<Margins>,
    header: Option<Box<PageElementFactory>>,
    footer: Option<FooterSpec>,
}

impl ReportPageDecorator {
    fn new(
        margins: Option<Margins>,
        header: Option<Box<PageElementFactory>>,
        footer: Option<FooterSpec>,
    ) -> Self {
        Self {
            page: 0,
            margins,
            header,
            footer,
        }
    }
}

impl PageDecorator for ReportPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &genpdf::Context,
        mut area: genpdf::render::Area<'a>,
        style: Style,
    ) -> Result<genpdf::render::Area<'a>, Error> {
        self.page += 1;

        if let Some(margins) = self.margins {
            area.add_margins(margins);
        }

        if let Some(header_cb) = &self.header {
            let mut element = header_cb(self.page);
            let result = element.render(context, area.clone(), style)?;
            area.add_offset(Position::new(0, result.size.height));
        }

        if let Some(footer) = &self.footer {
            let available = area.size().height;
            if footer.height > available {
                return Err(Error::new(
                    "Footer height exceeds available space",
                    ErrorKind::InvalidData,
                ));
            }

            let mut footer_area = area.clone();
            footer_area.add_offset(Position::new(0, available - footer.height));
            let mut element = (footer.factory)(self.page);
            let result = element.render(context, footer_area, style)?;
            if result.has_more {
                return Err(Error::new(
                    "Footer element does not fit into the reserved space",
                    ErrorKind::PageSizeExceeded,
                ));
            }

            area.set_height(available - footer.height);
        }

        Ok(area)
    }
}

/// Composes the plan into a `genpdf` document.
pub fn compose_document(
    plan: &DocumentPlan,
    options: &ExportOptions,
) -> Result<genpdf::Document, ExportError> {
    let geometry = &plan.geometry;
    let total_pages = plan.total_pages();
    let header_text = options
        .company_name
        .clone()
        .unwrap_or_else(|| "Revenue Forecast".to_string());

    let mut document = ReportDocumentBuilder::new()
        .with_paper_size(Size::new(
            mm_from_f64(geometry.page_width),
            mm_from_f64(geometry.page_height),
        ))
        .with_margins(Margins::all(mm_from_f64(geometry.margin)))
        .with_header(move |_page| {
            Paragraph::new(header_text.clone())
                .styled(Style::new().with_font_size(BODY_SIZE).with_color(muted()))
        })
        .with_footer(mm_from_f64(geometry.footer_band), move |page| {
            Paragraph::new(format!("Page {} of {}", page, total_pages))
                .aligned(Alignment::Center)
                .styled(Style::new().with_font_size(BODY_SIZE).with_color(muted()))
        })
        .build()?;

    for (index, page) in plan.pages.iter().enumerate() {
        if index > 0 {
            document.push(PageBreak::new());
        }
        for block in &page.blocks {
            match block {
                PageBlock::Cover { title, summary } => {
                    push_cover(&mut document, title, summary, options);
                }
                PageBlock::Image(placement) => push_image(&mut document, placement)?,
                PageBlock::Table(chunk) => push_table(&mut document, chunk)?,
            }
        }
    }

    Ok(document)
}

/// Composes and renders the plan to PDF bytes.
pub fn render_plan(plan: &DocumentPlan, options: &ExportOptions) -> Result<Vec<u8>, ExportError> {
    let document = compose_document(plan, options)?;
    let mut bytes = Vec::new();
    document
        .render(&mut bytes)
        .map_err(|err| ExportError::Assembly(err.to_string()))?;
    Ok(bytes)
}

fn muted() -> Color {
    Color::Rgb(107, 114, 128)
}

fn push_cover(
    document: &mut genpdf::Document,
    title: &str,
    summary: &crate::layout::CoverSummary,
    options: &ExportOptions,
) {
    document.push(Break::new(3));
    document.push(
        Paragraph::new(title)
            .aligned(Alignment::Center)
            .styled(Style::new().bold().with_font_size(TITLE_SIZE)),
    );
    if let Some(scenario) = &options.scenario_name {
        document.push(
            Paragraph::new(format!("Scenario: {}", scenario))
                .aligned(Alignment::Center)
                .styled(Style::new().with_font_size(12).with_color(muted())),
        );
    }
    document.push(Break::new(2));

    for line in summary.headline_lines() {
        document.push(
            Paragraph::new(line)
                .aligned(Alignment::Center)
                .styled(Style::new().with_font_size(12)),
        );
    }
    document.push(
        Paragraph::new(format!(
            "{} historical months, {} forecast months",
            summary.historical_rows, summary.forecast_rows
        ))
        .aligned(Alignment::Center)
        .styled(Style::new().with_font_size(BODY_SIZE).with_color(muted())),
    );

    if options.include_metadata {
        document.push(Break::new(3));
        document.push(
            Paragraph::new(format!(
                "Prepared by {} ({})",
                options.user.name, options.user.email
            ))
            .aligned(Alignment::Center)
            .styled(Style::new().with_font_size(BODY_SIZE).with_color(muted())),
        );
        document.push(
            Paragraph::new(format!("Generated on {}", Local::now().format("%Y-%m-%d")))
                .aligned(Alignment::Center)
                .styled(Style::new().with_font_size(BODY_SIZE).with_color(muted())),
        );
    }
}

fn push_image(document: &mut genpdf::Document, placement: &ImagePlacement) -> Result<(), ExportError> {
    let crate::raster::Asset::Raster { png, width, .. } = &placement.asset else {
        return Err(ExportError::Assembly(format!(
            "section '{}' holds an unrasterized vector asset",
            placement.title
        )));
    };

    document.push(
        Paragraph::new(placement.title.as_str())
            .styled(Style::new().bold().with_font_size(SECTION_TITLE_SIZE)),
    );
    document.push(Break::new(1));

    let dynamic = image::load_from_memory(png)
        .map_err(|err| ExportError::Assembly(format!("asset decode failed: {}", err)))?;
    let mut element = Image::from_dynamic_image(dynamic)
        .map_err(|err| ExportError::Assembly(err.to_string()))?;

    // Native size is px / 300 dpi; scale it to the planned millimeter width.
    let natural_width_mm = MM_PER_INCH * f64::from(*width) / IMAGE_DPI;
    if natural_width_mm > f64::EPSILON {
        let scale = placement.width / natural_width_mm;
        element.set_scale(Scale::new(scale, scale));
    }
    element.set_alignment(Alignment::Center);
    document.push(element);
    Ok(())
}

fn push_table(document: &mut genpdf::Document, chunk: &TableChunk) -> Result<(), ExportError> {
    let title = if chunk.continued {
        format!("{} (continued)", chunk.title)
    } else {
        chunk.title.clone()
    };
    document.push(Paragraph::new(title).styled(Style::new().bold().with_font_size(SECTION_TITLE_SIZE)));
    document.push(Break::new(1));

    let mut table = TableLayout::new(vec![2, 2, 1, 1]);
    table.set_cell_decorator(genpdf::elements::FrameCellDecorator::new(true, true, false));

    // Column header repeats on every chunk.
    let header_style = Style::new().bold().with_font_size(BODY_SIZE);
    let mut header_row = table.row();
    for label in ["Month", "Revenue", "Bookings", "Type"] {
        header_row.push_element(Paragraph::new(label).styled(header_style));
    }
    header_row
        .push()
        .map_err(|err| ExportError::Assembly(err.to_string()))?;

    for (local_index, row) in chunk.rows.iter().enumerate() {
        // Shading alternates by position within the chunk, so every page
        // starts unshaded.
        let style = if local_index % 2 == 1 {
            Style::new().with_font_size(BODY_SIZE).with_color(muted())
        } else {
            Style::new().with_font_size(BODY_SIZE)
        };
        let bookings = row
            .bookings
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        let mut table_row = table.row();
        table_row.push_element(Paragraph::new(row.date.format("%b %Y").to_string()).styled(style));
        table_row.push_element(Paragraph::new(format_currency(row.revenue)).styled(style));
        table_row.push_element(Paragraph::new(bookings).styled(style));
        table_row.push_element(Paragraph::new(row.kind.label()).styled(style));
        table_row
            .push()
            .map_err(|err| ExportError::Assembly(err.to_string()))?;
    }

    document.push(table);
    Ok(())
}
