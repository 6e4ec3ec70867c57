// Tabular screening report
// Candidate columns first, then the condition columns, then compliance

use crate::models::{
    AttributeValue, ComplianceStatus, ConditionSet, ScreeningResult, TradeAction, TradeSignal,
};
use crate::screening::ScreeningRun;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use indexmap::IndexSet;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const TITLE_PREFIX: &str = "Screener";
pub const COND_COUNT_COLUMN: &str = "cond count";
pub const SHARIA_COLUMN: &str = "Sharia";
const SORT_COLUMN: &str = "Volume";

/// Decimals kept per attribute column when displayed
const DISPLAY_DECIMALS: &[(&str, u32)] = &[
    ("Volume", 0),
    ("Market Cap", 0),
    ("Price", 2),
    ("Change", 4),
];

/// Number format applied to a column by the sheet
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnFormat {
    Percent,
    Currency,
    Millions,
    MillionsOneDecimal,
}

impl ColumnFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            ColumnFormat::Percent => "0.00%",
            ColumnFormat::Currency => "$#,##0.00",
            ColumnFormat::Millions => "0,,\"M\"",
            ColumnFormat::MillionsOneDecimal => "0.0,,\"M\"",
        }
    }

    fn for_column(name: &str) -> Option<Self> {
        match name {
            "Change" => Some(ColumnFormat::Percent),
            "Market Cap" => Some(ColumnFormat::Millions),
            "Price" => Some(ColumnFormat::Currency),
            "Volume" => Some(ColumnFormat::MillionsOneDecimal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Column {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ColumnFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<&'static str>,
    pub hidden: bool,
}

impl Column {
    fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let format = ColumnFormat::for_column(&name);
        Self {
            pattern: format.map(|f| f.pattern()),
            format,
            hidden: false,
            name,
        }
    }

    fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

/// Rows the sheet shows by default, and their order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ViewFilter {
    /// Show only rows where the column equals the value
    pub show_only: Vec<(String, AttributeValue)>,
    /// Hide rows where the column equals the value
    pub hide: Vec<(String, AttributeValue)>,
    pub sort_by: String,
    pub descending: bool,
}

impl ViewFilter {
    fn standard(with_compliance: bool) -> Self {
        let mut hide = Vec::new();
        if with_compliance {
            hide.push((
                SHARIA_COLUMN.to_string(),
                AttributeValue::Text("FAILED".to_string()),
            ));
        }

        Self {
            show_only: vec![(
                COND_COUNT_COLUMN.to_string(),
                AttributeValue::Integer(ConditionSet::TOTAL as i64),
            )],
            hide,
            sort_by: SORT_COLUMN.to_string(),
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultTable {
    pub title: String,
    pub columns: Vec<Column>,
    pub filter: ViewFilter,
    /// One cell per column; `None` is an empty cell
    pub rows: Vec<Vec<Option<AttributeValue>>>,
}

impl ResultTable {
    /// Lay out `results` as a sheet titled after `now` in `tz`
    pub fn build(results: &[ScreeningResult], now: DateTime<Utc>, tz: Tz) -> Self {
        let title = report_title(now, tz);
        let with_compliance = results.iter().any(|r| r.compliance.is_some());

        // Attribute columns in first-seen order across all candidates
        let attribute_names: IndexSet<&str> = results
            .iter()
            .flat_map(|r| r.candidate.attributes.keys().map(|k| k.as_str()))
            .collect();

        let mut columns: Vec<Column> = attribute_names.iter().map(|k| Column::new(*k)).collect();
        columns.push(Column::new(COND_COUNT_COLUMN));
        columns.extend((1..=ConditionSet::TOTAL).map(|i| Column::new(format!("cond {}", i)).hidden()));
        if with_compliance {
            columns.push(Column::new(SHARIA_COLUMN));
        }

        let rows = results
            .iter()
            .map(|result| {
                let mut row: Vec<Option<AttributeValue>> = attribute_names
                    .iter()
                    .map(|key| {
                        result
                            .candidate
                            .attributes
                            .get(*key)
                            .map(|value| display_value(key, value))
                    })
                    .collect();

                row.push(Some(AttributeValue::Integer(result.pass_count() as i64)));
                row.extend(
                    result
                        .conditions
                        .flags()
                        .iter()
                        .map(|flag| Some(AttributeValue::Integer(*flag as i64))),
                );
                if with_compliance {
                    row.push(
                        result
                            .compliance
                            .and_then(|c| c.label())
                            .map(|label| AttributeValue::Text(label.to_string())),
                    );
                }
                row
            })
            .collect();

        Self {
            title,
            columns,
            filter: ViewFilter::standard(with_compliance),
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Rows the default view shows
    pub fn visible_rows(&self) -> impl Iterator<Item = &Vec<Option<AttributeValue>>> {
        let show: Vec<(usize, &AttributeValue)> = self
            .filter
            .show_only
            .iter()
            .filter_map(|(col, v)| self.column_index(col).map(|i| (i, v)))
            .collect();
        let hide: Vec<(usize, &AttributeValue)> = self
            .filter
            .hide
            .iter()
            .filter_map(|(col, v)| self.column_index(col).map(|i| (i, v)))
            .collect();

        self.rows.iter().filter(move |row| {
            show.iter().all(|(i, v)| row[*i].as_ref() == Some(*v))
                && !hide.iter().any(|(i, v)| row[*i].as_ref() == Some(*v))
        })
    }
}

/// `Screener MM-DD-YYYY`, dated in `tz`
pub fn report_title(now: DateTime<Utc>, tz: Tz) -> String {
    format!(
        "{} {}",
        TITLE_PREFIX,
        now.with_timezone(&tz).format("%m-%d-%Y")
    )
}

fn display_value(column: &str, value: &AttributeValue) -> AttributeValue {
    let decimals = DISPLAY_DECIMALS
        .iter()
        .find(|(name, _)| *name == column)
        .map(|(_, d)| *d);

    match (decimals, value) {
        (Some(0), AttributeValue::Float(v)) => AttributeValue::Integer(v.round_ties_even() as i64),
        (Some(d), AttributeValue::Float(v)) => {
            let scale = 10f64.powi(d as i32);
            AttributeValue::Float((v * scale).round_ties_even() / scale)
        }
        _ => value.clone(),
    }
}

/// One-line chat summary of a finished run
pub fn summary_message(run: &ScreeningRun) -> String {
    let passed: Vec<&str> = run.passed_all().map(|r| r.ticker()).collect();
    let mut message = if passed.is_empty() {
        format!("Screener: {} stocks checked, none met all conditions", run.results.len())
    } else {
        format!(
            "Screener: {}/{} stocks met all conditions: {}",
            passed.len(),
            run.results.len(),
            passed.join(", ")
        )
    };
    if run.cancelled {
        message.push_str(" (run cancelled)");
    }
    message
}

/// BUY at the latest close for every ticker that met all conditions,
/// except those the compliance lookup rejected
pub fn buy_signals(run: &ScreeningRun) -> Vec<TradeSignal> {
    run.passed_all()
        .filter(|r| r.compliance != Some(ComplianceStatus::NotCompliant))
        .map(|r| TradeSignal {
            action: TradeAction::Buy,
            ticker: r.ticker().to_string(),
            price: r.metrics.current_close,
        })
        .collect()
}

/// Destination for a finished report
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Publish `table`, replacing earlier reports. Returns where it went.
    async fn publish(&self, table: &ResultTable) -> crate::Result<String>;
}

/// Writes each report as pretty JSON into a directory
pub struct JsonReportSink {
    output_dir: PathBuf,
}

impl JsonReportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path_for(&self, title: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", title))
    }

    async fn remove_previous(&self, keep: &Path) -> crate::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.output_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_report = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&format!("{} ", TITLE_PREFIX)) && n.ends_with(".json"))
                .unwrap_or(false);

            if is_report && path != keep {
                tracing::info!("Deleting previous report {}", path.display());
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn publish(&self, table: &ResultTable) -> crate::Result<String> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let path = self.path_for(&table.title);
        let body = serde_json::to_vec_pretty(table)?;
        tokio::fs::write(&path, body).await?;
        self.remove_previous(&path).await?;

        tracing::info!(
            "Report {} written with {} rows ({} shown)",
            path.display(),
            table.rows.len(),
            table.visible_rows().count()
        );
        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateRecord, TrendMetrics};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn metrics() -> TrendMetrics {
        TrendMetrics {
            current_close: 10.0,
            sma50: 9.0,
            sma150: 8.0,
            sma200: 7.0,
            sma200_lagged: 6.0,
            low_52w: 5.0,
            high_52w: 11.0,
        }
    }

    fn conditions(pass: u8) -> ConditionSet {
        let f = |i: u8| i < pass;
        ConditionSet {
            cond_1: f(0),
            cond_2: f(1),
            cond_3: f(2),
            cond_4: f(3),
            cond_5: f(4),
            cond_6: f(5),
            pass_count: pass,
        }
    }

    fn result(ticker: &str, pass: u8, volume: f64) -> ScreeningResult {
        ScreeningResult {
            candidate: CandidateRecord::new(ticker)
                .with_attribute("Price", AttributeValue::Float(123.456))
                .with_attribute("Change", AttributeValue::Float(0.012345))
                .with_attribute("Volume", AttributeValue::Float(volume)),
            metrics: metrics(),
            conditions: conditions(pass),
            compliance: None,
        }
    }

    fn now() -> DateTime<Utc> {
        // 02:00 UTC is still the previous day in New York
        Utc.with_ymd_and_hms(2025, 3, 5, 2, 0, 0).unwrap()
    }

    fn names(table: &ResultTable) -> Vec<&str> {
        table.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_title_uses_timezone() {
        assert_eq!(report_title(now(), chrono_tz::America::New_York), "Screener 03-04-2025");
        assert_eq!(report_title(now(), chrono_tz::UTC), "Screener 03-05-2025");
    }

    #[test]
    fn test_columns_and_rounding() {
        let table = ResultTable::build(&[result("AAA", 6, 1_234_567.6)], now(), chrono_tz::UTC);

        assert_eq!(
            names(&table),
            vec![
                "Ticker", "Price", "Change", "Volume", "cond count", "cond 1", "cond 2",
                "cond 3", "cond 4", "cond 5", "cond 6"
            ]
        );
        assert!(table.columns[5..].iter().all(|c| c.hidden));
        assert_eq!(table.columns[1].format, Some(ColumnFormat::Currency));
        assert_eq!(table.columns[3].pattern, Some("0.0,,\"M\""));

        let row = &table.rows[0];
        assert_eq!(row[1], Some(AttributeValue::Float(123.46)));
        assert_eq!(row[2], Some(AttributeValue::Float(0.0123)));
        assert_eq!(row[3], Some(AttributeValue::Integer(1_234_568)));
        assert_eq!(row[4], Some(AttributeValue::Integer(6)));
        assert_eq!(row[10], Some(AttributeValue::Integer(1)));
    }

    #[test]
    fn test_missing_attribute_is_empty_cell() {
        let mut extra = result("BBB", 3, 10.0);
        extra.candidate = extra
            .candidate
            .with_attribute("Sector", AttributeValue::Text("Tech".to_string()));

        let table = ResultTable::build(&[result("AAA", 6, 10.0), extra], now(), chrono_tz::UTC);
        let sector = table.column_index("Sector").unwrap();

        assert_eq!(table.rows[0][sector], None);
        assert_eq!(table.rows[1][sector], Some(AttributeValue::Text("Tech".to_string())));
    }

    #[test]
    fn test_view_filter() {
        let mut compliant = result("AAA", 6, 10.0);
        compliant.compliance = Some(ComplianceStatus::Compliant);
        let mut failed = result("BBB", 6, 10.0);
        failed.compliance = Some(ComplianceStatus::NotCompliant);
        let mut unknown = result("CCC", 6, 10.0);
        unknown.compliance = Some(ComplianceStatus::Unknown);
        let partial = result("DDD", 5, 10.0);

        let table = ResultTable::build(&[compliant, failed, unknown, partial], now(), chrono_tz::UTC);
        assert_eq!(names(&table).last(), Some(&SHARIA_COLUMN));

        let sharia = table.column_index(SHARIA_COLUMN).unwrap();
        assert_eq!(table.rows[1][sharia], Some(AttributeValue::Text("FAILED".to_string())));
        assert_eq!(table.rows[2][sharia], None);

        let shown: Vec<&AttributeValue> = table
            .visible_rows()
            .filter_map(|row| row[0].as_ref())
            .collect();
        assert_eq!(
            shown,
            vec![
                &AttributeValue::Text("AAA".to_string()),
                &AttributeValue::Text("CCC".to_string())
            ]
        );
        assert_eq!(table.filter.sort_by, "Volume");
        assert!(table.filter.descending);
    }

    #[test]
    fn test_summary_message() {
        let run = ScreeningRun {
            run_id: Uuid::new_v4(),
            started_at: now(),
            results: vec![result("AAA", 6, 1.0), result("BBB", 2, 1.0), result("CCC", 6, 1.0)],
            skipped: vec![],
            cancelled: false,
        };
        assert_eq!(
            summary_message(&run),
            "Screener: 2/3 stocks met all conditions: AAA, CCC"
        );
    }

    #[test]
    fn test_buy_signals_skip_only_rejected() {
        let mut compliant = result("AAA", 6, 1.0);
        compliant.compliance = Some(ComplianceStatus::Compliant);
        let mut rejected = result("BBB", 6, 1.0);
        rejected.compliance = Some(ComplianceStatus::NotCompliant);
        let mut unknown = result("CCC", 6, 1.0);
        unknown.compliance = Some(ComplianceStatus::Unknown);
        let unchecked = result("DDD", 6, 1.0);
        let partial = result("EEE", 5, 1.0);

        let run = ScreeningRun {
            run_id: Uuid::new_v4(),
            started_at: now(),
            results: vec![compliant, rejected, unknown, unchecked, partial],
            skipped: vec![],
            cancelled: false,
        };

        let signals = buy_signals(&run);
        let tickers: Vec<&str> = signals.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAA", "CCC", "DDD"]);
        assert!(signals.iter().all(|s| s.action == TradeAction::Buy));
        assert_eq!(signals[0].price, 10.0);
    }

    #[tokio::test]
    async fn test_json_sink_replaces_previous_reports() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Screener 01-02-2025.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.json"), "{}").unwrap();

        let sink = JsonReportSink::new(dir.path());
        let table = ResultTable::build(&[result("AAA", 6, 10.0)], now(), chrono_tz::UTC);
        let location = sink.publish(&table).await.unwrap();

        let written = sink.path_for("Screener 03-05-2025");
        assert_eq!(location, written.display().to_string());
        assert!(!dir.path().join("Screener 01-02-2025.json").exists());
        assert!(dir.path().join("notes.json").exists());

        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(written).unwrap()).unwrap();
        assert_eq!(body["title"], "Screener 03-05-2025");
        assert_eq!(body["rows"][0][0], "AAA");
    }
}
