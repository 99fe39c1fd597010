//! Export orchestration: resolve requested sections, tolerate per-section
//! failure, compose and emit the report.
//!
//! Section resolution is issued concurrently; each task takes what it needs
//! from the shared presentation-tree snapshot under a lock, so a panel's
//! temporary visibility mutations are never observed by another section.  A
//! failed section is logged and dropped — only document assembly and file
//! emission are fatal.

use std::path::Path;
use std::sync::Arc;

use log::{debug, warn};
use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::dom::PresentationTree;
use crate::error::{ExportError, SectionError};
use crate::extract::extract_chart;
use crate::layout::{
    plan_document, CoverSummary, DocumentPlan, PageGeometry, ResolvedSection, SectionContent,
    SectionKind,
};
use crate::model::{ExportOptions, ForecastMetrics, Role, TableRow};
use crate::panel::{rasterize_panel, rasterize_stats_panel};
use crate::raster::{RasterOptions, Rasterizer};
use crate::style::StyleResolver;

/// Container id the revenue chart renders into.
pub const CHART_CONTAINER_ID: &str = "revenue-chart";
/// Panel id of the insights card list.
pub const INSIGHTS_PANEL_ID: &str = "insights-panel";
/// Panel id of the pipeline funnel.
pub const FUNNEL_PANEL_ID: &str = "funnel-panel";

/// Charts render at double resolution, same as panels.
const CHART_SCALE: f64 = 2.0;

/// One requested report section, naming its data source.
#[derive(Clone, Debug)]
pub enum SectionRequest {
    /// Cover page with aggregates over the full row set.
    Cover,
    /// Chart extracted from the named container.
    Chart {
        /// Presentation-tree container id.
        container_id: String,
    },
    /// Forecast statistics, synthesized headlessly from the metrics record.
    Stats,
    /// Insights panel rendered from the live tree.
    Insights {
        /// Presentation-tree panel id.
        panel_id: String,
    },
    /// Funnel panel rendered from the live tree.
    Funnel {
        /// Presentation-tree panel id.
        panel_id: String,
    },
    /// Revenue data table.
    Table,
}

impl SectionRequest {
    /// The section kind this request resolves to.
    pub fn kind(&self) -> SectionKind {
        match self {
            SectionRequest::Cover => SectionKind::Cover,
            SectionRequest::Chart { .. } => SectionKind::Chart,
            SectionRequest::Stats => SectionKind::Stats,
            SectionRequest::Insights { .. } => SectionKind::Insights,
            SectionRequest::Funnel { .. } => SectionKind::Funnel,
            SectionRequest::Table => SectionKind::Table,
        }
    }
}

/// Source data handed over by the dashboard for one export.
#[derive(Clone, Debug, Default)]
pub struct ExportData {
    /// Caller-ordered table rows; also feed the cover aggregates.
    pub rows: Vec<TableRow>,
    /// Forecast summary numbers for the stats section.
    pub metrics: ForecastMetrics,
}

/// The standard section list for the given caller and data.
///
/// Admin-only sections (insights, funnel) are omitted entirely — not
/// rendered and discarded — when the role lacks permission.  The table is
/// omitted when the row set is empty.
pub fn default_section_requests(data: &ExportData, role: Role) -> Vec<SectionRequest> {
    let mut requests = vec![
        SectionRequest::Cover,
        SectionRequest::Chart {
            container_id: CHART_CONTAINER_ID.to_string(),
        },
        SectionRequest::Stats,
    ];
    if role.is_admin() {
        requests.push(SectionRequest::Insights {
            panel_id: INSIGHTS_PANEL_ID.to_string(),
        });
        requests.push(SectionRequest::Funnel {
            panel_id: FUNNEL_PANEL_ID.to_string(),
        });
    }
    if !data.rows.is_empty() {
        requests.push(SectionRequest::Table);
    }
    requests
}

/// Top-level report exporter.
///
/// Holds the presentation-tree snapshot, the style resolver for chart
/// inlining, and the page geometry.  All state is per-export-call except the
/// snapshot, which callers refresh between exports.
pub struct ReportExporter {
    tree: Arc<Mutex<PresentationTree>>,
    resolver: Arc<dyn StyleResolver>,
    rasterizer: Rasterizer,
    geometry: PageGeometry,
}

impl ReportExporter {
    /// Creates an exporter over a presentation-tree snapshot.
    pub fn new(tree: PresentationTree, resolver: Arc<dyn StyleResolver>) -> Self {
        Self {
            tree: Arc::new(Mutex::new(tree)),
            resolver,
            rasterizer: Rasterizer,
            geometry: PageGeometry::default(),
        }
    }

    /// Overrides the page geometry.
    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Resolves the requested sections concurrently, preserving request
    /// order.  Failed sections are logged and dropped.
    pub async fn resolve_sections(
        &self,
        requests: Vec<SectionRequest>,
        data: &ExportData,
    ) -> Vec<ResolvedSection> {
        let mut tasks = JoinSet::new();
        let count = requests.len();

        for (index, request) in requests.into_iter().enumerate() {
            let tree = Arc::clone(&self.tree);
            let resolver = Arc::clone(&self.resolver);
            let rasterizer = self.rasterizer;
            let rows = data.rows.clone();
            let metrics = data.metrics.clone();
            tasks.spawn(async move {
                let kind = request.kind();
                let outcome =
                    resolve_one(request, tree, resolver, rasterizer, rows, metrics).await;
                (index, kind, outcome)
            });
        }

        let mut slots: Vec<Option<ResolvedSection>> = (0..count).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok(section))) => {
                    debug!("resolved section {:?}", section.kind);
                    slots[index] = Some(section);
                }
                Ok((index, kind, Err(err))) => {
                    warn!("dropping section {:?}: {}", kind, err);
                    slots[index] = None;
                }
                Err(join_err) => {
                    warn!("dropping section, task failed: {}", join_err);
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Plans the document for the requested sections.
    pub async fn plan(
        &self,
        requests: Vec<SectionRequest>,
        data: &ExportData,
    ) -> DocumentPlan {
        let sections = self.resolve_sections(requests, data).await;
        plan_document(&sections, &self.geometry)
    }

    /// Runs the full export and returns the PDF bytes.
    pub async fn export(
        &self,
        requests: Vec<SectionRequest>,
        data: &ExportData,
        options: &ExportOptions,
    ) -> Result<Vec<u8>, ExportError> {
        let plan = self.plan(requests, data).await;
        crate::compose::render_plan(&plan, options)
    }

    /// Runs the full export and writes the file atomically: the bytes land
    /// in a temporary sibling first and are renamed into place, so a failed
    /// export never leaves a partial file behind.
    pub async fn export_to_file(
        &self,
        requests: Vec<SectionRequest>,
        data: &ExportData,
        options: &ExportOptions,
        directory: impl AsRef<Path>,
    ) -> Result<std::path::PathBuf, ExportError> {
        let bytes = self.export(requests, data, options).await?;

        let directory = directory.as_ref();
        let target = directory.join(&options.filename);
        let suffix: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let staging = directory.join(format!(".{}.{}", options.filename, suffix));

        std::fs::write(&staging, &bytes)?;
        if let Err(err) = std::fs::rename(&staging, &target) {
            let _ = std::fs::remove_file(&staging);
            return Err(ExportError::Io(err));
        }
        Ok(target)
    }
}

async fn resolve_one(
    request: SectionRequest,
    tree: Arc<Mutex<PresentationTree>>,
    resolver: Arc<dyn StyleResolver>,
    rasterizer: Rasterizer,
    rows: Vec<TableRow>,
    metrics: ForecastMetrics,
) -> Result<ResolvedSection, SectionError> {
    let kind = request.kind();
    let title = kind.title().to_string();

    let content = match request {
        SectionRequest::Cover => SectionContent::Cover(CoverSummary::from_rows(&rows)),
        SectionRequest::Chart { container_id } => {
            let options = RasterOptions::default().with_scale(CHART_SCALE);
            let result = {
                let tree = tree.lock().await;
                extract_chart(&tree, &container_id, resolver.as_ref(), &rasterizer, &options).await
            };
            match result.asset {
                Some(asset) => SectionContent::Image(asset),
                // The extraction result carries the real failure kind;
                // pass it through so the drop log names it.
                None => {
                    return Err(result.error.unwrap_or_else(|| {
                        SectionError::SourceNotFound(format!(
                            "chart '{}' unavailable",
                            container_id
                        ))
                    }))
                }
            }
        }
        SectionRequest::Stats => {
            SectionContent::Image(rasterize_stats_panel(&metrics, &rasterizer).await?)
        }
        SectionRequest::Insights { panel_id } | SectionRequest::Funnel { panel_id } => {
            let mut tree = tree.lock().await;
            SectionContent::Image(rasterize_panel(&mut tree, &panel_id, &rasterizer).await?)
        }
        SectionRequest::Table => SectionContent::Table(rows),
    };

    Ok(ResolvedSection {
        kind,
        title,
        content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::StaticStyleResolver;
    use chrono::NaiveDate;
    use crate::model::RowKind;

    fn sample_rows(count: usize) -> Vec<TableRow> {
        (0..count)
            .map(|index| {
                TableRow::new(
                    NaiveDate::from_ymd_opt(2025, 1, 1)
                        .unwrap()
                        .checked_add_months(chrono::Months::new(index as u32))
                        .unwrap(),
                    120_000.0 + 500.0 * index as f64,
                    if index < 3 {
                        RowKind::Historical
                    } else {
                        RowKind::Forecast
                    },
                )
            })
            .collect()
    }

    #[test]
    fn member_requests_omit_admin_sections() {
        let data = ExportData {
            rows: sample_rows(5),
            metrics: ForecastMetrics::default(),
        };
        let requests = default_section_requests(&data, Role::Member);
        let kinds: Vec<SectionKind> = requests.iter().map(SectionRequest::kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Cover,
                SectionKind::Chart,
                SectionKind::Stats,
                SectionKind::Table,
            ]
        );
    }

    #[test]
    fn admin_requests_include_panels_and_empty_rows_drop_the_table() {
        let data = ExportData::default();
        let requests = default_section_requests(&data, Role::Admin);
        let kinds: Vec<SectionKind> = requests.iter().map(SectionRequest::kind).collect();
        assert_eq!(
            kinds,
            vec![
                SectionKind::Cover,
                SectionKind::Chart,
                SectionKind::Stats,
                SectionKind::Insights,
                SectionKind::Funnel,
            ]
        );
    }

    #[tokio::test]
    async fn failed_sections_are_dropped_in_order() {
        let tree = PresentationTree::parse("<main><div id=\"other\"/></main>").unwrap();
        let exporter = ReportExporter::new(tree, Arc::new(StaticStyleResolver::new()));
        let data = ExportData {
            rows: sample_rows(4),
            metrics: ForecastMetrics::default(),
        };

        let requests = vec![
            SectionRequest::Cover,
            SectionRequest::Chart {
                container_id: "no-such-chart".to_string(),
            },
            SectionRequest::Table,
        ];
        let sections = exporter.resolve_sections(requests, &data).await;
        let kinds: Vec<SectionKind> = sections.iter().map(|section| section.kind).collect();
        assert_eq!(kinds, vec![SectionKind::Cover, SectionKind::Table]);
    }
}
