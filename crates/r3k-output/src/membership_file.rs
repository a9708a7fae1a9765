//! Membership panel file.
//!
//! Header `month,<permno>,...`; one row per month (`YYYY-MM`); cells `0`/`1`.
//! Securities never marked have no column.

use crate::export::{ExportError, ExportFormat, Exporter, finish_csv, read_text};
use r3k::MembershipPanel;
use r3k_data::{Permno, YearMonth};
use std::path::Path;

/// Leading column of the membership file.
const MONTH_COLUMN: &str = "month";

impl Exporter for MembershipPanel {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let permnos = self.permnos();
                let mut wtr = csv::Writer::from_writer(vec![]);

                let mut header = vec![MONTH_COLUMN.to_string()];
                header.extend(permnos.iter().map(Permno::to_string));
                wtr.write_record(&header)?;

                for month in self.months() {
                    let mut record = vec![month.to_string()];
                    record.extend(
                        permnos
                            .iter()
                            .map(|p| u8::from(self.is_member(month, *p)).to_string()),
                    );
                    wtr.write_record(&record)?;
                }
                finish_csv(wtr)
            }
            ExportFormat::Json => Ok(serde_json::to_string(self)?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(self)?),
        }
    }
}

/// Read a membership file written by [`Exporter::export_to_file`].
///
/// Every month row is kept, including rows without members.
pub fn read_membership(path: &Path) -> Result<MembershipPanel, ExportError> {
    let text = read_text(path)?;
    let mut rdr = csv::Reader::from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some(MONTH_COLUMN) {
        return Err(ExportError::InvalidFormat(format!(
            "Membership file must start with a {} column",
            MONTH_COLUMN
        )));
    }
    let permnos = headers
        .iter()
        .skip(1)
        .map(str::parse::<Permno>)
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let month: YearMonth = record[0].parse()?;
        let mut members = Vec::new();
        for (cell, permno) in record.iter().skip(1).zip(&permnos) {
            match cell.trim() {
                "1" | "1.0" | "True" | "true" => members.push(*permno),
                "0" | "0.0" | "" | "False" | "false" => {}
                other => {
                    return Err(ExportError::InvalidFormat(format!(
                        "Invalid membership cell {:?} for {} in {}",
                        other, permno, month
                    )));
                }
            }
        }
        rows.push((month, members));
    }

    let mut panel = MembershipPanel::with_months(rows.iter().map(|(m, _)| *m));
    for (month, members) in rows {
        panel.mark(month, members);
    }
    Ok(panel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn sample() -> MembershipPanel {
        let mut panel = MembershipPanel::with_months([ym(2020, 1), ym(2020, 2), ym(2020, 3)]);
        panel.mark(ym(2020, 1), [Permno(10001), Permno(10002)]);
        panel.mark(ym(2020, 3), [Permno(10002)]);
        panel
    }

    #[test]
    fn test_membership_csv_layout() {
        let csv = sample().export_to_string(ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "month,10001,10002",
                "2020-01,1,1",
                "2020-02,0,0",
                "2020-03,0,1",
            ]
        );
    }

    #[test]
    fn test_membership_round_trip_gz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("russell3000.csv.gz");
        sample().export_to_file(&path, ExportFormat::Csv).unwrap();
        assert_eq!(read_membership(&path).unwrap(), sample());
    }

    #[rstest]
    #[case("1", true)]
    #[case("1.0", true)]
    #[case("True", true)]
    #[case("0", false)]
    #[case("0.0", false)]
    #[case("", false)]
    #[case("false", false)]
    fn test_membership_cell_spellings(#[case] cell: &str, #[case] member: bool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("russell3000.csv");
        fs::write(&path, format!("month,10001\n2020-01,{}\n", cell)).unwrap();

        let panel = read_membership(&path).unwrap();
        assert_eq!(panel.len(), 1);
        assert_eq!(panel.is_member(ym(2020, 1), Permno(10001)), member);
    }

    #[test]
    fn test_membership_rejects_bad_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("russell3000.csv");
        fs::write(&path, "month,1\n2020-01,maybe\n").unwrap();
        assert!(matches!(
            read_membership(&path),
            Err(ExportError::InvalidFormat(_))
        ));
    }
}
