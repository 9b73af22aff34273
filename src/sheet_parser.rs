//! Tabular file parsing for CSV and Excel (.xlsx/.xlsm/.xls/.xlsb).
//!
//! Only the first worksheet is read. Its first row supplies the column names;
//! every following non-empty row becomes a record keyed by those names, with
//! empty cells left out.

use std::collections::HashSet;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use calamine::{open_workbook_from_rs, Data, ExcelDateTime, Range, Reader, Xls, Xlsb, Xlsx};
use chrono::NaiveTime;
use serde_json::{Number, Value};
use tracing::debug;

use crate::flow::resolver::{value_to_key, Row};

pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "xlsx", "xlsm", "xls", "xlsb"];

/// Rows of the first sheet of an uploaded file.
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub name: String,
    pub rows: Vec<Row>,
}

fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(filename: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension(filename).as_str())
}

/// Dispatch file parsing by extension.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<ParsedSheet> {
    match extension(filename).as_str() {
        "csv" => parse_csv(filename, data),
        "xlsx" | "xlsm" => parse_workbook::<Xlsx<_>>(data),
        "xls" => parse_workbook::<Xls<_>>(data),
        "xlsb" => parse_workbook::<Xlsb<_>>(data),
        ext => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .{}",
            ext,
            SUPPORTED_EXTENSIONS.join(", .")
        ),
    }
}

/// Parse a CSV file. Cells stay strings so account numbers keep leading zeros.
fn parse_csv(filename: &str, data: &[u8]) -> Result<ParsedSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let mut headers = HeaderNames::default();
    for header in reader.headers().context("Failed to read CSV headers")? {
        headers.push(header.to_string());
    }

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV record {}", line + 1))?;
        let mut row = Row::new();
        for (col, field) in record.iter().enumerate() {
            if field.is_empty() {
                continue;
            }
            row.insert(headers.name(col), Value::String(field.to_string()));
        }
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let name = match base.rsplit_once('.') {
        Some((stem, _)) if extension(base) == "csv" => stem.to_string(),
        _ => base.to_string(),
    };

    Ok(ParsedSheet { name, rows })
}

/// Parse the first worksheet of any calamine-supported workbook.
fn parse_workbook<'a, W>(data: &'a [u8]) -> Result<ParsedSheet>
where
    W: Reader<Cursor<&'a [u8]>>,
    W::Error: std::fmt::Display,
{
    let mut workbook: W = open_workbook_from_rs(Cursor::new(data))
        .map_err(|e| anyhow!("Failed to open Excel workbook: {}", e))?;

    let sheet_names = workbook.sheet_names();
    debug!("Workbook sheets: {:?}", sheet_names);
    let name = sheet_names
        .first()
        .cloned()
        .context("No sheets found in file")?;

    let range = workbook
        .worksheet_range(&name)
        .map_err(|e| anyhow!("Failed to read sheet '{}': {}", name, e))?;

    Ok(ParsedSheet {
        rows: range_to_rows(&range),
        name,
    })
}

/// Convert a calamine range into records. First row = headers.
fn range_to_rows(range: &Range<Data>) -> Vec<Row> {
    let mut row_iter = range.rows();
    let Some(header_row) = row_iter.next() else {
        return Vec::new();
    };

    let mut headers = HeaderNames::default();
    for cell in header_row {
        let text = cell_to_value(cell)
            .and_then(|v| value_to_key(&v))
            .unwrap_or_default();
        headers.push(text);
    }

    row_iter
        .filter_map(|cells| {
            let row: Row = cells
                .iter()
                .enumerate()
                .filter_map(|(col, cell)| Some((headers.name(col), cell_to_value(cell)?)))
                .collect();
            (!row.is_empty()).then_some(row)
        })
        .collect()
}

/// Convert a calamine cell to JSON; `None` for empty cells.
fn cell_to_value(cell: &Data) -> Option<Value> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Int(i) => Some(Value::from(*i)),
        Data::Float(f) => float_to_value(*f),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::DateTime(dt) => datetime_to_value(dt),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
        Data::Error(e) => Some(Value::String(format!("#ERR:{:?}", e))),
    }
}

fn float_to_value(f: f64) -> Option<Value> {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        Number::from_f64(f).map(Value::Number)
    }
}

/// Dates print as `YYYY-MM-DD`, with ` HH:MM:SS` when a time of day is set.
/// Durations and out-of-range serials keep their numeric value.
fn datetime_to_value(dt: &ExcelDateTime) -> Option<Value> {
    if dt.is_duration() {
        return float_to_value(dt.as_f64());
    }
    match dt.as_datetime() {
        Some(when) if when.time() == NaiveTime::MIN => {
            Some(Value::String(when.format("%Y-%m-%d").to_string()))
        }
        Some(when) => Some(Value::String(when.format("%Y-%m-%d %H:%M:%S").to_string())),
        None => float_to_value(dt.as_f64()),
    }
}

/// Unique column names. Blank headers become `__EMPTY`, `__EMPTY_1`, …;
/// repeated headers get `_1`, `_2`, … suffixes. Columns past the header row
/// are named like blank headers.
#[derive(Debug, Default)]
struct HeaderNames {
    names: Vec<String>,
    used: HashSet<String>,
}

impl HeaderNames {
    fn push(&mut self, raw: String) {
        let base = if raw.trim().is_empty() {
            "__EMPTY".to_string()
        } else {
            raw
        };
        let mut name = base.clone();
        let mut n = 0;
        while self.used.contains(&name) {
            n += 1;
            name = format!("{}_{}", base, n);
        }
        self.used.insert(name.clone());
        self.names.push(name);
    }

    fn name(&mut self, col: usize) -> String {
        while self.names.len() <= col {
            self.push(String::new());
        }
        self.names[col].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_csv_basic() {
        let csv_data = b"S.No,Account No,Layer\n1,00123,0\n2,00456,1\n";
        let sheet = parse_file("upload/report.csv", csv_data).unwrap();
        assert_eq!(sheet.name, "report");
        assert_eq!(parse_file("C:\\in\\Report.Csv", csv_data).unwrap().name, "Report");
        assert_eq!(parse_file("q3.flows.CSV", csv_data).unwrap().name, "q3.flows");
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0]["Account No"], json!("00123"));
        assert_eq!(
            sheet.rows[1].keys().collect::<Vec<_>>(),
            vec!["S.No", "Account No", "Layer"]
        );
    }

    #[test]
    fn test_parse_csv_empty_cells_and_rows() {
        let csv_data = b"Account No,Parent,Name,Name\nA,,x,y\n,,,\nB,A\n";
        let sheet = parse_file("flow.csv", csv_data).unwrap();
        assert_eq!(sheet.rows.len(), 2);
        assert!(sheet.rows[0].get("Parent").is_none());
        assert_eq!(sheet.rows[0]["Name_1"], json!("y"));
        assert_eq!(sheet.rows[1]["Parent"], json!("A"));
    }

    #[test]
    fn test_parse_csv_extra_columns() {
        let csv_data = b"Account No\nA,spill\n";
        let sheet = parse_file("flow.csv", csv_data).unwrap();
        assert_eq!(sheet.rows[0]["__EMPTY"], json!("spill"));
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_file("notes.txt", b"data").is_err());
        assert!(!is_supported("notes.txt"));
        assert!(!is_supported("no_extension"));
        assert!(is_supported("Report.XLSX"));
        assert!(is_supported("legacy.xls"));
    }

    #[test]
    fn test_invalid_workbook_is_error() {
        assert!(parse_file("broken.xlsx", b"not a zip archive").is_err());
    }

    #[test]
    fn test_range_to_rows() {
        let mut range = Range::new((0, 0), (3, 3));
        range.set_value((0, 0), Data::String("Account No".to_string()));
        range.set_value((0, 1), Data::String("Layer".to_string()));
        range.set_value((0, 3), Data::String("Layer".to_string()));
        range.set_value((1, 0), Data::Float(9_876_543_210.0));
        range.set_value((1, 1), Data::Int(2));
        range.set_value((1, 2), Data::Bool(true));
        range.set_value((1, 3), Data::Float(1.5));
        range.set_value((3, 0), Data::String("B".to_string()));

        let rows = range_to_rows(&range);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Account No"], json!(9_876_543_210i64));
        assert_eq!(rows[0]["Layer"], json!(2));
        assert_eq!(rows[0]["__EMPTY"], json!(true));
        assert_eq!(rows[0]["Layer_1"], json!(1.5));
        assert_eq!(rows[1].len(), 1);
        assert_eq!(rows[1]["Account No"], json!("B"));
    }

    #[test]
    fn test_date_cells() {
        use calamine::ExcelDateTimeType;

        let date = |serial: f64| {
            cell_to_value(&Data::DateTime(ExcelDateTime::new(
                serial,
                ExcelDateTimeType::DateTime,
                false,
            )))
        };
        assert_eq!(date(45_292.0), Some(json!("2024-01-01")));
        assert_eq!(date(45_292.5), Some(json!("2024-01-01 12:00:00")));
        assert_eq!(date(61.0), Some(json!("1900-03-01")));

        let duration = Data::DateTime(ExcelDateTime::new(
            1.5,
            ExcelDateTimeType::TimeDelta,
            false,
        ));
        assert_eq!(cell_to_value(&duration), Some(json!(1.5)));
    }

    #[test]
    fn test_header_names() {
        let mut headers = HeaderNames::default();
        for raw in ["A", "", "A", " ", "A_1"] {
            headers.push(raw.to_string());
        }
        assert_eq!(headers.names, vec!["A", "__EMPTY", "A_1", "__EMPTY_1", "A_1_1"]);
        assert_eq!(headers.name(6), "__EMPTY_3");
    }
}
