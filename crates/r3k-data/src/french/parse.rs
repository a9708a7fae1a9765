//! Parser for the French library CSV layout.
//!
//! ```text
//! <preamble, family-specific number of lines>
//! ,Mkt-RF,SMB,HML,RMW,CMA,RF
//! 19630701,   -0.67,    0.02,   -0.35,    0.03,    0.13,    0.012
//! ...
//! <blank line>
//! <footer>
//! ```

use super::{FactorFamily, FactorTable};
use crate::error::{DataError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use ndarray::Array2;

/// Missing-value sentinels used by the library.
const SENTINELS: [f64; 2] = [-99.99, -999.0];

/// Parse one family's CSV text into decimal returns.
///
/// # Errors
/// `DataError::FactorFormat` when the header row does not name the expected
/// columns or a data row cannot be parsed.
pub fn parse_factor_csv(family: FactorFamily, text: &str) -> Result<FactorTable> {
    let file = family.archive();
    let skip = family.skip_lines();
    let expected = family.factors();
    let format_error = |line: usize, reason: String| DataError::FactorFormat {
        file: file.to_string(),
        line,
        reason,
    };

    let mut lines = text.lines().skip(skip);
    let header_line = skip + 1;
    let header = lines
        .next()
        .ok_or_else(|| format_error(header_line, "file ends before the header row".to_string()))?;

    let labels: Vec<&str> = header.split(',').map(str::trim).collect();
    let expected_labels: Vec<&str> = std::iter::once("")
        .chain(expected.iter().map(|f| f.source_label()))
        .collect();
    if labels != expected_labels {
        return Err(format_error(
            header_line,
            format!("expected header {:?}, found {:?}", expected_labels, labels),
        ));
    }

    let block: Vec<&str> = lines.take_while(|l| !l.trim().is_empty()).collect();
    let block = block.join("\n");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .from_reader(block.as_bytes());

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let line = header_line + 1 + i;
        let record = record.map_err(|e| format_error(line, e.to_string()))?;
        if record.len() != expected.len() + 1 {
            return Err(format_error(
                line,
                format!("expected {} fields, found {}", expected.len() + 1, record.len()),
            ));
        }

        let raw_date = &record[0];
        let date = NaiveDate::parse_from_str(raw_date, "%Y%m%d")
            .map_err(|e| format_error(line, format!("invalid date {:?}: {}", raw_date, e)))?;
        dates.push(date);

        for field in record.iter().skip(1) {
            let percent: f64 = field
                .parse()
                .map_err(|e| format_error(line, format!("invalid value {:?}: {}", field, e)))?;
            values.push(if SENTINELS.contains(&percent) {
                f64::NAN
            } else {
                percent / 100.0
            });
        }
    }

    let values = Array2::from_shape_vec((dates.len(), expected.len()), values)
        .map_err(|e| format_error(header_line, e.to_string()))?;
    FactorTable::new(dates, expected.to_vec(), values)
}
