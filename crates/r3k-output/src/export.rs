//! Export functionality for r3k tables.
//!
//! This module provides CSV and JSON export for factor returns, stock name
//! history and factor loadings, plus the matching CSV readers. Paths ending
//! in `.gz` are gzip-compressed transparently.

use chrono::NaiveDate;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array2;
use r3k_data::crsp::StockInfo;
use r3k_data::french::{Factor, FactorTable};
use r3k_data::{DataError, Permno};
use r3k_risk::{INTERCEPT, LoadingError, Loadings, LoadingsTable};
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Date column in factor files.
const DATE_COLUMN: &str = "date";

/// Leading column in loadings files.
const PERMNO_COLUMN: &str = "permno";

/// Trailing columns in loadings files.
const R_SQUARED_COLUMN: &str = "r_squared";
const OBSERVATIONS_COLUMN: &str = "observations";

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Table construction error.
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Loadings table construction error.
    #[error("Loadings error: {0}")]
    Loadings(#[from] LoadingError),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// Parent directories are created; a `.gz` path is gzip-compressed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        write_text(path, &content)
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Write `content` to `path`, gzip-compressed when the path ends in `.gz`.
pub(crate) fn write_text(path: &Path, content: &str) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?;
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
    }
    Ok(())
}

/// Read `path` as text, decompressing when the path ends in `.gz`.
pub(crate) fn read_text(path: &Path) -> Result<String, ExportError> {
    let mut file = File::open(path)?;
    let mut text = String::new();
    if is_gzip(path) {
        GzDecoder::new(file).read_to_string(&mut text)?;
    } else {
        file.read_to_string(&mut text)?;
    }
    Ok(text)
}

/// Finish a CSV writer into a string.
pub(crate) fn finish_csv(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

/// Parse a CSV float cell; empty and `NaN` cells are missing.
pub(crate) fn parse_float(cell: &str) -> Result<f64, ExportError> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(f64::NAN);
    }
    cell.parse()
        .map_err(|_| ExportError::InvalidFormat(format!("Invalid number: {:?}", cell)))
}

fn float_json(value: f64) -> Value {
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

impl Exporter for FactorTable {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                let mut header = vec![DATE_COLUMN.to_string()];
                header.extend(self.factors().iter().map(|f| f.name().to_string()));
                wtr.write_record(&header)?;

                let values = self.values();
                for (i, date) in self.dates().iter().enumerate() {
                    let mut record = vec![date.to_string()];
                    record.extend(values.row(i).iter().map(|v| v.to_string()));
                    wtr.write_record(&record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json | ExportFormat::PrettyJson => {
                let values = self.values();
                let rows: Vec<Value> = self
                    .dates()
                    .iter()
                    .enumerate()
                    .map(|(i, date)| {
                        let mut row = Map::new();
                        row.insert(DATE_COLUMN.to_string(), Value::String(date.to_string()));
                        for (j, factor) in self.factors().iter().enumerate() {
                            row.insert(factor.name().to_string(), float_json(values[[i, j]]));
                        }
                        Value::Object(row)
                    })
                    .collect();
                if format == ExportFormat::Json {
                    Ok(serde_json::to_string(&rows)?)
                } else {
                    Ok(serde_json::to_string_pretty(&rows)?)
                }
            }
        }
    }
}

/// Read a factor file written by [`Exporter::export_to_file`].
pub fn read_factor_table(path: &Path) -> Result<FactorTable, ExportError> {
    let text = read_text(path)?;
    let mut rdr = csv::Reader::from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some(DATE_COLUMN) {
        return Err(ExportError::InvalidFormat(format!(
            "Factor file must start with a {} column",
            DATE_COLUMN
        )));
    }
    let factors = headers
        .iter()
        .skip(1)
        .map(str::parse::<Factor>)
        .collect::<Result<Vec<_>, _>>()?;

    let mut dates = Vec::new();
    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let date = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d")
            .map_err(|e| ExportError::InvalidFormat(format!("Invalid date: {}", e)))?;
        dates.push(date);
        for cell in record.iter().skip(1) {
            values.push(parse_float(cell)?);
        }
    }

    let values = matrix(dates.len(), factors.len(), values)?;
    Ok(FactorTable::new(dates, factors, values)?)
}

fn matrix(rows: usize, cols: usize, values: Vec<f64>) -> Result<Array2<f64>, ExportError> {
    Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| ExportError::InvalidFormat(e.to_string()))
}

impl Exporter for Vec<StockInfo> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                for record in self {
                    wtr.serialize(record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// Read a stock info file written by [`Exporter::export_to_file`].
pub fn read_stock_info(path: &Path) -> Result<Vec<StockInfo>, ExportError> {
    let text = read_text(path)?;
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    let rows = rdr.deserialize().collect::<Result<Vec<StockInfo>, _>>()?;
    Ok(rows)
}

impl Exporter for LoadingsTable {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                let mut header = vec![PERMNO_COLUMN];
                header.extend(self.coefficient_names());
                header.extend([R_SQUARED_COLUMN, OBSERVATIONS_COLUMN]);
                wtr.write_record(&header)?;

                for row in self.rows() {
                    let mut record = vec![row.permno.to_string()];
                    record.extend(row.coefficients.iter().map(|c| c.to_string()));
                    record.push(row.r_squared.to_string());
                    record.push(row.observations.to_string());
                    wtr.write_record(&record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// Read a loadings file written by [`Exporter::export_to_file`].
pub fn read_loadings(path: &Path) -> Result<LoadingsTable, ExportError> {
    let text = read_text(path)?;
    let mut rdr = csv::Reader::from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let names: Vec<&str> = headers.iter().collect();
    let valid = names.len() >= 4
        && names[0] == PERMNO_COLUMN
        && names[1] == INTERCEPT
        && names[names.len() - 2] == R_SQUARED_COLUMN
        && names[names.len() - 1] == OBSERVATIONS_COLUMN;
    if !valid {
        return Err(ExportError::InvalidFormat(format!(
            "Unexpected loadings header: {:?}",
            names
        )));
    }
    let factors = names[2..names.len() - 2]
        .iter()
        .map(|n| n.parse::<Factor>())
        .collect::<Result<Vec<_>, _>>()?;

    let width = names.len();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let permno: Permno = record[0].parse()?;
        let coefficients = record
            .iter()
            .skip(1)
            .take(width - 3)
            .map(parse_float)
            .collect::<Result<Vec<_>, _>>()?;
        let r_squared = parse_float(&record[width - 2])?;
        let observations = record[width - 1].trim().parse().map_err(|_| {
            ExportError::InvalidFormat(format!("Invalid observation count: {:?}", &record[width - 1]))
        })?;
        rows.push(Loadings {
            permno,
            coefficients,
            r_squared,
            observations,
        });
    }

    Ok(LoadingsTable::new(factors, rows)?)
}
