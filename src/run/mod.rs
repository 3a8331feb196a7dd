// src/run/mod.rs

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::{Config, MonthSelection};
use crate::generate;
use crate::package;
use crate::series::{self, AuctionRow, MonthKey, MonthlySeries};

/// Outcome of one successfully processed ISIN-month.
#[derive(Debug)]
pub struct UnitReport {
    pub isin: String,
    pub month: MonthKey,
    pub archive: PathBuf,
}

/// End-of-run accounting. One failing unit never aborts the others; it lands
/// here instead.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub generated: Vec<UnitReport>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RunSummary {
    /// True when the run produced nothing and at least one unit failed.
    pub fn is_failure(&self) -> bool {
        self.generated.is_empty() && !self.failed.is_empty()
    }

    pub fn log(&self) {
        info!(
            generated = self.generated.len(),
            skipped = self.skipped.len(),
            failed = self.failed.len(),
            "run complete"
        );
        for report in &self.generated {
            info!(
                isin = %report.isin,
                month = %report.month,
                archive = %report.archive.display(),
                "generated"
            );
        }
        for reason in &self.skipped {
            warn!(%reason, "skipped");
        }
        for (unit, reason) in &self.failed {
            error!(%unit, %reason, "failed");
        }
    }
}

/// Months a run covers, given what the source actually contains.
///
/// `Auto` resolves to the single most recent month across the whole dataset;
/// an explicit month is kept even when absent so the caller can report it.
pub fn resolve_months(present: &BTreeSet<MonthKey>, selection: MonthSelection) -> Vec<MonthKey> {
    match selection {
        MonthSelection::Auto => present.iter().next_back().copied().into_iter().collect(),
        MonthSelection::Explicit(month) => vec![month],
        MonthSelection::All => present.iter().copied().collect(),
    }
}

/// Process every selected ISIN-month: generate the file pair, package it,
/// verify the archive. Per-unit failures are isolated and reported at the
/// end.
pub fn process_all(cfg: &Config, rows: &[AuctionRow]) -> Result<RunSummary> {
    let selection = cfg.month_selection()?;
    let units = series::group_by_unit(rows);
    let present: BTreeSet<MonthKey> = units.keys().map(|(_, month)| *month).collect();
    let months = resolve_months(&present, selection);

    let mut summary = RunSummary::default();
    let mut matched = 0usize;

    for ((isin, month), unit) in &units {
        if !months.contains(month) {
            continue;
        }
        matched += 1;

        if unit.is_empty() {
            summary
                .skipped
                .push(format!("{} {}: no source data", isin, month));
            continue;
        }

        match process_unit(cfg, unit) {
            Ok(report) => summary.generated.push(report),
            Err(e) => summary.failed.push((
                format!("{} {}", isin, month),
                format!("{:#}", e),
            )),
        }
    }

    if matched == 0 {
        let months: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        warn!(?months, "no source rows for the selected months");
        summary
            .skipped
            .push(format!("no source rows for {}", months.join(", ")));
    }
    Ok(summary)
}

fn process_unit(cfg: &Config, unit: &MonthlySeries) -> Result<UnitReport> {
    let pair = generate::generate_pair(cfg, unit)?;
    let archive = package::package_pair(cfg, &unit.isin, unit.month, &pair)?;
    package::verify_archive(&archive, &pair)?;
    Ok(UnitReport {
        isin: unit.isin.clone(),
        month: unit.month,
        archive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use crate::series::CATEGORY_COUNT;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(isin: &str, y: i32, m: u32, d: u32) -> AuctionRow {
        AuctionRow {
            date: date(y, m, d),
            isin: isin.into(),
            description: "BOT 12 MESI".into(),
            amounts: [Some(1.0); CATEGORY_COUNT],
        }
    }

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            output_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    /// Two ISINs with data in 2025-08, 2025-09 and (one of them) 2025-10.
    fn fixture_rows() -> Vec<AuctionRow> {
        vec![
            row("IT0000000001", 2025, 8, 13),
            row("IT0000000001", 2025, 9, 10),
            row("IT0000000001", 2025, 9, 24),
            row("IT0000000001", 2025, 10, 14),
            row("IT0000000002", 2025, 8, 13),
            row("IT0000000002", 2025, 9, 10),
        ]
    }

    fn archive_names(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.ends_with(".zip"))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn auto_mode_picks_latest_month_globally() {
        let tmp = tempdir().unwrap();
        let cfg = test_config(tmp.path());

        let summary = process_all(&cfg, &fixture_rows()).unwrap();
        assert_eq!(summary.generated.len(), 1);
        assert!(summary.failed.is_empty());

        // only ISIN 1 has rows in 2025-10
        assert_eq!(
            archive_names(tmp.path()),
            ["ITBI_IT0000000001_20251031.zip"]
        );
    }

    #[test]
    fn explicit_mode_produces_one_month_per_isin() {
        let tmp = tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.mode = Mode::Explicit;
        cfg.month = Some("2025-09".into());

        let summary = process_all(&cfg, &fixture_rows()).unwrap();
        assert_eq!(summary.generated.len(), 2);

        let names = archive_names(tmp.path());
        assert_eq!(
            names,
            [
                "ITBI_IT0000000001_20250930.zip",
                "ITBI_IT0000000002_20250930.zip",
            ]
        );
        assert!(names.iter().all(|n| n.ends_with("_20250930.zip")));
    }

    #[test]
    fn all_mode_produces_every_present_month() {
        let tmp = tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.mode = Mode::All;

        let summary = process_all(&cfg, &fixture_rows()).unwrap();
        assert_eq!(summary.generated.len(), 5);

        assert_eq!(
            archive_names(tmp.path()),
            [
                "ITBI_IT0000000001_20250831.zip",
                "ITBI_IT0000000001_20250930.zip",
                "ITBI_IT0000000001_20251031.zip",
                "ITBI_IT0000000002_20250831.zip",
                "ITBI_IT0000000002_20250930.zip",
            ]
        );
    }

    #[test]
    fn explicit_month_without_data_is_not_an_error() {
        let tmp = tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.mode = Mode::Explicit;
        cfg.month = Some("2024-01".into());

        let summary = process_all(&cfg, &fixture_rows()).unwrap();
        assert!(summary.generated.is_empty());
        assert!(summary.failed.is_empty());
        assert_eq!(summary.skipped.len(), 1);
        assert!(!summary.is_failure());
    }

    #[test]
    fn one_failing_unit_does_not_abort_the_rest() {
        let tmp = tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.mode = Mode::Explicit;
        cfg.month = Some("2025-09".into());

        // occupy ISIN 1's DATA filename with a directory so its write fails
        fs::create_dir_all(
            tmp.path().join("ITBI_IT0000000001_DATA_20250930.xls"),
        )
        .unwrap();

        let summary = process_all(&cfg, &fixture_rows()).unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].0.starts_with("IT0000000001"));
        assert_eq!(summary.generated.len(), 1);
        assert_eq!(summary.generated[0].isin, "IT0000000002");
        assert!(!summary.is_failure());
    }

    #[test]
    fn resolve_months_auto_takes_latest() {
        let present: BTreeSet<MonthKey> = [
            MonthKey::new(2025, 8).unwrap(),
            MonthKey::new(2025, 10).unwrap(),
            MonthKey::new(2025, 9).unwrap(),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            resolve_months(&present, MonthSelection::Auto),
            [MonthKey::new(2025, 10).unwrap()]
        );
        assert_eq!(resolve_months(&present, MonthSelection::All).len(), 3);
        assert_eq!(
            resolve_months(&present, MonthSelection::Explicit(MonthKey::new(2024, 1).unwrap())),
            [MonthKey::new(2024, 1).unwrap()]
        );
    }
}
