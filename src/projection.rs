//! Row projection: turn a rectangular result set plus a metric's label
//! declaration into a list of [`MetricRecord`] samples (spec.md §4.B).

use crate::coerce::{self, CellValue};
use crate::models::MetricRecord;

/// Inputs mirror the original `GetMetricRows`: a metric name (for warning
/// context only), the converted rows, the column names in result-set
/// order, the declared label columns, and the value column name (empty
/// means "first column").
pub struct ProjectionInput<'a> {
    pub metric_name: &'a str,
    pub rows: &'a [Vec<CellValue>],
    pub columns: &'a [String],
    pub labels: &'a [String],
    pub value_column: &'a str,
}

/// Labels every sample starts with, already filled from tenant-prepared
/// state except `schema`, which the caller fills in per matched schema
/// after projection runs (spec.md §3, "Shared metadata labels").
#[derive(Debug, Clone)]
pub struct SharedMetadata {
    pub tenant: String,
    pub usage: String,
    pub sid: String,
    pub insnr: String,
    pub database_name: String,
}

impl SharedMetadata {
    fn seed_record(&self) -> MetricRecord {
        MetricRecord {
            value: 0.0,
            labels: vec![
                "tenant".into(),
                "usage".into(),
                "schema".into(),
                "sid".into(),
                "insnr".into(),
                "database_name".into(),
            ],
            label_values: vec![
                low(&self.tenant),
                low(&self.usage),
                String::new(),
                self.sid.clone(),
                self.insnr.clone(),
                self.database_name.clone(),
            ],
        }
    }
}

fn low(s: &str) -> String {
    s.to_lowercase()
}

fn underscored_lower(s: &str) -> String {
    s.to_lowercase().split(' ').collect::<Vec<_>>().join("_")
}

/// Locates the value column index: case-insensitive match against column
/// names, falling back to index 0 when `value_column` is empty or absent.
fn value_column_index(columns: &[String], value_column: &str) -> usize {
    if value_column.is_empty() {
        return 0;
    }
    columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(value_column))
        .unwrap_or(0)
}

/// Projects one result set into samples. Per-cell coercion failures are
/// reported via `on_coerce_warning` rather than logged directly, so
/// callers can attach metric/tenant/schema context the way the engines do.
pub fn project_rows(
    input: &ProjectionInput,
    meta: &SharedMetadata,
    mut on_coerce_warning: impl FnMut(&str),
) -> Vec<MetricRecord> {
    if input.columns.is_empty() {
        return Vec::new();
    }
    let value_idx = value_column_index(input.columns, input.value_column);
    let label_search = if input.labels.is_empty() {
        String::new()
    } else {
        low(&input.labels.join(","))
    };

    let mut out = Vec::with_capacity(input.rows.len());
    for row in input.rows {
        let mut record = meta.seed_record();
        for (i, cell) in row.iter().enumerate() {
            if matches!(cell, CellValue::Null) {
                continue;
            }
            if i == value_idx {
                record.value = project_value(cell, &mut on_coerce_warning, input.metric_name);
            } else {
                apply_label(&mut record, cell, &input.columns[i], input.labels, &label_search);
            }
        }
        out.push(record);
    }
    out
}

fn project_value(cell: &CellValue, on_warning: &mut impl FnMut(&str), metric_name: &str) -> f64 {
    match cell {
        CellValue::Time(t) => t.timestamp() as f64,
        CellValue::Text(s) => {
            if let Some(secs) = coerce::parse_timestamp_seconds(s) {
                secs
            } else {
                let (v, had_error) = coerce::to_f64_or_zero(cell);
                if had_error {
                    on_warning(&format!(
                        "metric {metric_name}: value {s:?} is not numeric, using 0"
                    ));
                }
                v
            }
        }
        _ => {
            let (v, had_error) = coerce::to_f64_or_zero(cell);
            if had_error {
                on_warning(&format!(
                    "metric {metric_name}: value {cell:?} is not numeric, using 0"
                ));
            }
            v
        }
    }
}

fn apply_label(
    record: &mut MetricRecord,
    cell: &CellValue,
    column: &str,
    declared_labels: &[String],
    label_search: &str,
) {
    let lowered_col = low(column);
    let include = if declared_labels.is_empty() {
        true
    } else {
        // Preserved as-is: substring match against the comma-joined label
        // list, not an exact membership test. A label `cpu` therefore also
        // matches a column `cpu_pct`. See spec.md §9, "label-matching
        // semantics".
        label_search.contains(&lowered_col)
    };
    if !include {
        return;
    }
    if record.labels.iter().any(|l| l == &lowered_col) {
        return;
    }
    record.labels.push(lowered_col);
    record
        .label_values
        .push(underscored_lower(&coerce::to_string_lossy(cell)));
}

/// Overwrites the `schema` slot in every record's label values, matching
/// the engines' post-projection step that fills in the matched schema name.
pub fn set_schema_label(records: &mut [MetricRecord], schema: &str) {
    let schema_lower = low(schema);
    for record in records {
        if let Some(idx) = record.labels.iter().position(|l| l == "schema") {
            record.label_values[idx] = schema_lower.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn meta() -> SharedMetadata {
        SharedMetadata {
            tenant: "T".into(),
            usage: "production".into(),
            sid: "HDB".into(),
            insnr: "00".into(),
            database_name: "HDB_DB".into(),
        }
    }

    #[test]
    fn happy_single_value_row() {
        let columns = vec!["used".to_string()];
        let rows = vec![vec![CellValue::Int64(42)]];
        let input = ProjectionInput {
            metric_name: "mem_used",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "",
        };
        let records = project_rows(&input, &meta(), |_| {});
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, 42.0);
        assert_eq!(
            &records[0].labels[..6],
            &["tenant", "usage", "schema", "sid", "insnr", "database_name"]
        );
        assert_eq!(records[0].label_values[0], "t");
        assert_eq!(records[0].label_values[1], "production");
    }

    #[test]
    fn null_value_cell_leaves_value_at_zero() {
        let columns = vec!["used".to_string()];
        let rows = vec![vec![CellValue::Null]];
        let input = ProjectionInput {
            metric_name: "m",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "",
        };
        let records = project_rows(&input, &meta(), |_| {});
        assert_eq!(records[0].value, 0.0);
    }

    #[test]
    fn fraction_value_column() {
        let columns = vec!["ratio".to_string()];
        let rows = vec![vec![CellValue::Text("3/4".into())]];
        let input = ProjectionInput {
            metric_name: "m",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "",
        };
        let records = project_rows(&input, &meta(), |_| {});
        assert_eq!(records[0].value, 0.75);
    }

    #[test]
    fn declared_labels_included_and_deduplicated() {
        let columns = vec!["cpu".to_string(), "host".to_string()];
        let rows = vec![vec![CellValue::Int64(30), CellValue::Text("h1".into())]];
        let labels = vec!["host".to_string()];
        let input = ProjectionInput {
            metric_name: "cpu",
            rows: &rows,
            columns: &columns,
            labels: &labels,
            value_column: "cpu",
        };
        let records = project_rows(&input, &meta(), |_| {});
        assert_eq!(records[0].value, 30.0);
        assert!(records[0].labels.contains(&"host".to_string()));
        assert!(!records[0].labels.contains(&"cpu".to_string()));
    }

    #[test]
    fn label_values_lowercase_and_underscored() {
        let columns = vec!["used".to_string(), "env_name".to_string()];
        let rows = vec![vec![
            CellValue::Int64(1),
            CellValue::Text("Prod Region".into()),
        ]];
        let input = ProjectionInput {
            metric_name: "m",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "used",
        };
        let records = project_rows(&input, &meta(), |_| {});
        let idx = records[0]
            .labels
            .iter()
            .position(|l| l == "env_name")
            .unwrap();
        assert_eq!(records[0].label_values[idx], "prod_region");
    }

    #[test]
    fn value_column_timestamp_string_becomes_unix_seconds() {
        let columns = vec!["ts".to_string()];
        let rows = vec![vec![CellValue::Text("2023-05-01 10:20:30".into())]];
        let input = ProjectionInput {
            metric_name: "m",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "",
        };
        let records = project_rows(&input, &meta(), |_| {});
        let expected = DateTime::parse_from_rfc3339("2023-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc)
            .timestamp() as f64;
        assert_eq!(records[0].value, expected);
    }

    #[test]
    fn set_schema_label_overwrites_placeholder() {
        let columns = vec!["used".to_string()];
        let rows = vec![vec![CellValue::Int64(1)]];
        let input = ProjectionInput {
            metric_name: "m",
            rows: &rows,
            columns: &columns,
            labels: &[],
            value_column: "",
        };
        let mut records = project_rows(&input, &meta(), |_| {});
        set_schema_label(&mut records, "SYS");
        let idx = records[0].labels.iter().position(|l| l == "schema").unwrap();
        assert_eq!(records[0].label_values[idx], "sys");
    }
}
