//! HTTP client for the Ken French data library.

use super::{FactorFamily, FactorTable, parse_factor_csv};
use crate::error::{DataError, Result};
use chrono::NaiveDate;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use zip::ZipArchive;

/// Data library base URL.
pub const FRENCH_BASE_URL: &str = "https://mba.tuck.dartmouth.edu/pages/faculty/ken.french/ftp/";

/// User agent for library requests
const USER_AGENT: &str = concat!("r3k/", env!("CARGO_PKG_VERSION"));

/// Downloads and parses factor archives.
#[derive(Debug, Clone)]
pub struct FrenchClient {
    client: reqwest::Client,
    base_url: String,
    scratch_dir: PathBuf,
}

impl FrenchClient {
    /// Create a client against the public library.
    pub fn new() -> Result<Self> {
        Self::with_base_url(FRENCH_BASE_URL)
    }

    /// Create a client against a different base URL (a mirror).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(DataError::Network)?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            client,
            base_url,
            scratch_dir: std::env::temp_dir(),
        })
    }

    /// Directory that receives the temporary archive during parsing.
    #[must_use]
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Download and parse one family, unfiltered.
    pub async fn fetch_family(&self, family: FactorFamily) -> Result<FactorTable> {
        let url = format!("{}{}", self.base_url, family.archive());
        debug!(%url, "Downloading factor archive");

        let response = self.client.get(&url).send().await.map_err(DataError::Network)?;
        if !response.status().is_success() {
            return Err(DataError::Http(format!(
                "Failed to fetch {}: HTTP {}",
                family.archive(),
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(DataError::Network)?;
        load_archive(&self.scratch_dir, family, &bytes)
    }

    /// Fetch every family, outer-join on date and keep `[start, end]`.
    pub async fn fetch_factors(&self, start: NaiveDate, end: NaiveDate) -> Result<FactorTable> {
        if start > end {
            return Err(DataError::InvalidDateRange { start, end });
        }

        let mut table = FactorTable::empty();
        for family in FactorFamily::ALL {
            let part = self.fetch_family(family).await?;
            table = table.outer_join(&part);
        }

        let table = table.filter(start, end);
        info!(
            rows = table.height(),
            factors = table.factors().len(),
            %start,
            %end,
            "Fetched Fama-French factors"
        );
        Ok(table)
    }
}

/// Spill `bytes` to a temporary zip under `scratch`, then parse its CSV.
///
/// The temporary file is removed when this returns, on success or failure.
pub fn load_archive(scratch: &Path, family: FactorFamily, bytes: &[u8]) -> Result<FactorTable> {
    let mut file = tempfile::Builder::new()
        .prefix("r3k-french-")
        .suffix(".zip")
        .tempfile_in(scratch)?;
    file.write_all(bytes)?;
    file.flush()?;

    let mut archive = ZipArchive::new(file.reopen()?)?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let name = names
        .iter()
        .find(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .or_else(|| names.first())
        .ok_or_else(|| DataError::FactorFormat {
            file: family.archive().to_string(),
            line: 0,
            reason: "archive is empty".to_string(),
        })?;

    let mut raw = Vec::new();
    archive.by_name(name)?.read_to_end(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);

    parse_factor_csv(family, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::french::Factor;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use zip::write::SimpleFileOptions;

    fn zipped(name: &str, body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn short_reversal(header: &str) -> String {
        let mut text = "preamble\n".repeat(13);
        text.push_str(header);
        text.push_str("\n20200102, 0.50\n\nfooter\n");
        text
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[test]
    fn test_load_archive_removes_temp_file() {
        let scratch = tempfile::tempdir().unwrap();
        let bytes = zipped("F-F_ST_Reversal_Factor_daily.CSV", &short_reversal(",ST_Rev"));

        let table = load_archive(scratch.path(), FactorFamily::ShortTermReversal, &bytes).unwrap();
        assert_eq!(table.height(), 1);
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn test_load_archive_removes_temp_file_on_error() {
        let scratch = tempfile::tempdir().unwrap();
        let bytes = zipped("data.csv", &short_reversal(",ST_Reversal"));

        let result = load_archive(scratch.path(), FactorFamily::ShortTermReversal, &bytes);
        assert!(matches!(result, Err(DataError::FactorFormat { .. })));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn test_corrupt_archive() {
        let scratch = tempfile::tempdir().unwrap();
        let result = load_archive(scratch.path(), FactorFamily::Momentum, b"not a zip");
        assert!(matches!(result, Err(DataError::Archive(_))));
        assert!(scratch_is_empty(scratch.path()));
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = FrenchClient::with_base_url("http://localhost:1").unwrap();
        assert_eq!(client.base_url, "http://localhost:1/");
    }

    fn library_file(family: FactorFamily, rows: &[&str]) -> Vec<u8> {
        let mut text = "preamble\n".repeat(family.skip_lines());
        let labels: Vec<&str> = family.factors().iter().map(|f| f.source_label()).collect();
        text.push_str(&format!(",{}\n", labels.join(",")));
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text.push_str("\nAnnual Factors\n");
        zipped("data.CSV", &text)
    }

    fn library() -> HashMap<String, Vec<u8>> {
        [
            (
                FactorFamily::FiveFactor,
                library_file(
                    FactorFamily::FiveFactor,
                    &[
                        "20200102, 0.10, 0.20, 0.30, 0.40, 0.50, 0.01",
                        "20200103, -0.70, 0.20, 0.30, 0.40, 0.50, 0.01",
                        "20200106, 0.40, -99.99, 0.30, 0.40, 0.50, 0.01",
                    ],
                ),
            ),
            (
                FactorFamily::Momentum,
                library_file(FactorFamily::Momentum, &["20200102, 1.00", "20200103, 2.00"]),
            ),
            (
                FactorFamily::ShortTermReversal,
                library_file(FactorFamily::ShortTermReversal, &["20200103, 0.30"]),
            ),
            (
                FactorFamily::LongTermReversal,
                library_file(FactorFamily::LongTermReversal, &["20200106, -0.20", "20200107, 0.10"]),
            ),
        ]
        .into_iter()
        .map(|(family, bytes)| (family.archive().to_string(), bytes))
        .collect()
    }

    /// Serve `files` by path over plain HTTP; unknown paths get a 404.
    async fn serve(files: HashMap<String, Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf[read..]).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    read += n;
                }

                let request = String::from_utf8_lossy(&buf[..read]);
                let path = request
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .trim_start_matches('/')
                    .to_string();
                let (status, body) = match files.get(&path) {
                    Some(bytes) => ("200 OK", bytes.clone()),
                    None => ("404 Not Found", Vec::new()),
                };

                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                stream.write_all(head.as_bytes()).await.unwrap();
                stream.write_all(&body).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_factors_joins_and_filters() {
        let scratch = tempfile::tempdir().unwrap();
        let client = FrenchClient::with_base_url(serve(library()).await)
            .unwrap()
            .scratch_dir(scratch.path());

        let table = client.fetch_factors(date(3), date(6)).await.unwrap();
        assert_eq!(table.dates(), &[date(3), date(6)]);
        assert_eq!(table.factors(), &Factor::ALL);

        let mkt = table.column(Factor::MktRf).unwrap();
        assert_relative_eq!(mkt[0], -0.007, epsilon = 1e-12);
        assert_relative_eq!(mkt[1], 0.004, epsilon = 1e-12);
        assert!(table.column(Factor::Smb).unwrap()[1].is_nan());

        let mom = table.column(Factor::Mom).unwrap();
        assert_relative_eq!(mom[0], 0.02, epsilon = 1e-12);
        assert!(mom[1].is_nan());

        let lt_rev = table.column(Factor::LtRev).unwrap();
        assert!(lt_rev[0].is_nan());
        assert_relative_eq!(lt_rev[1], -0.002, epsilon = 1e-12);

        assert!(scratch_is_empty(scratch.path()));
    }

    #[tokio::test]
    async fn test_fetch_family_reports_http_status() {
        let mut files = library();
        files.remove(FactorFamily::Momentum.archive());
        let client = FrenchClient::with_base_url(serve(files).await).unwrap();

        match client.fetch_factors(date(1), date(31)).await {
            Err(DataError::Http(message)) => {
                assert!(message.contains(FactorFamily::Momentum.archive()));
                assert!(message.contains("404"));
            }
            other => panic!("expected Http error, got {:?}", other.map(|t| t.height())),
        }
    }
}
