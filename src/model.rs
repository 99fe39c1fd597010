//! Data structures exchanged with the export pipeline's collaborators.
//!
//! These types mirror the records the dashboard hands over — forecast
//! metrics, table rows, the caller's identity and export options.  They stay
//! free of rendering concerns so frontends can construct them without pulling
//! in the PDF stack.

use chrono::NaiveDate;

/// Caller role; gates the admin-only report sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Full access, including funnel and insights sections.
    Admin,
    /// Standard access.
    Member,
}

impl Role {
    /// Whether admin-only sections may be included.
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Identity of the user requesting the export.
#[derive(Clone, Debug)]
pub struct UserInfo {
    /// Display name shown on the cover.
    pub name: String,
    /// Contact email shown on the cover.
    pub email: String,
    /// Permission flag consumed read-only by the section planner.
    pub role: Role,
}

/// Options for one export invocation.  Immutable for the duration of the call.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Output file name.
    pub filename: String,
    /// Requesting user.
    pub user: UserInfo,
    /// Scenario label, if the dashboard has one active.
    pub scenario_name: Option<String>,
    /// Company label for the cover.
    pub company_name: Option<String>,
    /// Whether generated-at/user metadata is printed on the cover.
    pub include_metadata: bool,
}

impl ExportOptions {
    /// Creates options with the required fields and metadata enabled.
    pub fn new(filename: impl Into<String>, user: UserInfo) -> Self {
        Self {
            filename: filename.into(),
            user,
            scenario_name: None,
            company_name: None,
            include_metadata: true,
        }
    }

    /// Sets the scenario label.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario_name = Some(scenario.into());
        self
    }

    /// Sets the company label.
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company_name = Some(company.into());
        self
    }

    /// Toggles cover metadata.
    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }
}

/// Whether a table row comes from recorded history or from the forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind {
    /// Observed revenue.
    Historical,
    /// Forecast revenue.
    Forecast,
}

impl RowKind {
    /// Human-readable label used in the table's type column.
    pub fn label(self) -> &'static str {
        match self {
            RowKind::Historical => "Historical",
            RowKind::Forecast => "Forecast",
        }
    }
}

/// One revenue table row.  Ordering is caller-supplied and preserved.
#[derive(Clone, Debug)]
pub struct TableRow {
    /// Month the value belongs to.
    pub date: NaiveDate,
    /// Revenue for the month.
    pub revenue: f64,
    /// Booking count, when the dashboard tracks it.
    pub bookings: Option<u32>,
    /// Historical or forecast.
    pub kind: RowKind,
}

impl TableRow {
    /// Convenience constructor without bookings.
    pub fn new(date: NaiveDate, revenue: f64, kind: RowKind) -> Self {
        Self {
            date,
            revenue,
            bookings: None,
            kind,
        }
    }

    /// Sets the booking count.
    pub fn with_bookings(mut self, bookings: u32) -> Self {
        self.bookings = Some(bookings);
        self
    }
}

/// Flat record of the forecast summary numbers, produced by the forecasting
/// collaborator.  Carries everything the stats panel shows, so the panel can
/// be synthesized without a live dashboard subtree.
#[derive(Clone, Debug, Default)]
pub struct ForecastMetrics {
    /// Total forecast revenue over the next twelve months.
    pub twelve_month_total: f64,
    /// Trailing twelve-month baseline the forecast is compared against.
    pub twelve_month_baseline: f64,
    /// Absolute difference between forecast and baseline.
    pub delta: f64,
    /// Relative difference between forecast and baseline, in percent.
    pub delta_pct: f64,
    /// Average forecast month over the next twelve months.
    pub twelve_month_average: f64,
    /// Forecast for the next month.
    pub one_month: f64,
    /// Cumulative forecast for the next three months.
    pub three_month: f64,
    /// Cumulative forecast for the next six months.
    pub six_month: f64,
    /// Next month versus the comparable baseline period, in percent.
    pub one_month_pct: f64,
    /// Three-month horizon versus baseline, in percent.
    pub three_month_pct: f64,
    /// Six-month horizon versus baseline, in percent.
    pub six_month_pct: f64,
}

/// Formats a revenue amount as whole dollars with thousands separators.
pub fn format_currency(value: f64) -> String {
    let negative = value < 0.0;
    let whole = value.abs().round() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if negative {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Formats a percentage with an explicit sign and one decimal.
pub fn format_signed_pct(value: f64) -> String {
    format!("{:+.1}%", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_grouping() {
        assert_eq!(format_currency(0.0), "$0");
        assert_eq!(format_currency(950.0), "$950");
        assert_eq!(format_currency(1_250.4), "$1,250");
        assert_eq!(format_currency(18_500_000.0), "$18,500,000");
        assert_eq!(format_currency(-7_300.0), "-$7,300");
    }

    #[test]
    fn signed_percentages() {
        assert_eq!(format_signed_pct(12.34), "+12.3%");
        assert_eq!(format_signed_pct(-3.0), "-3.0%");
        assert_eq!(format_signed_pct(0.0), "+0.0%");
    }

    #[test]
    fn role_gating() {
        assert!(Role::Admin.is_admin());
        assert!(!Role::Member.is_admin());
    }
}
