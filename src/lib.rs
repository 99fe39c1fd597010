//! Report export pipeline for the revenue dashboard.
//!
//! Takes a snapshot of the dashboard's rendered markup plus its numeric
//! records and produces one paginated PDF: cover page, chart image, forecast
//! statistics, optional admin panels, and the revenue table.  Vector charts
//! are style-inlined, de-conflicted, and rasterized; panels are rendered at
//! double resolution; pagination is planned deterministically before any PDF
//! bytes exist.  One broken section is dropped with a log entry instead of
//! failing the export.

pub mod color;
pub mod compose;
pub mod dedup;
pub mod dom;
pub mod error;
pub mod export;
pub mod extract;
pub mod fonts;
pub mod layout;
pub mod model;
pub mod panel;
pub mod raster;
pub mod style;

pub use dom::PresentationTree;
pub use error::{ExportError, SectionError};
pub use export::{default_section_requests, ExportData, ReportExporter, SectionRequest};
pub use layout::{PageGeometry, SectionKind};
pub use model::{ExportOptions, ForecastMetrics, Role, TableRow, UserInfo};
