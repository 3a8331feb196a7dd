// src/generate/mod.rs

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::series::{MonthlySeries, CATEGORIES};

/// META sheet column order. CODE and DESCRIPTION are derived per series, the
/// release-date columns stay blank, everything else comes from config.
pub const META_COLUMNS: [&str; 18] = [
    "CODE",
    "DESCRIPTION",
    "FREQUENCY",
    "MULTIPLIER",
    "AGGREGATION_TYPE",
    "UNIT_TYPE",
    "DATA_TYPE",
    "DATA_UNIT",
    "SEASONALLY_ADJUSTED",
    "ANNUALIZED",
    "PROVIDER_MEASURE_URL",
    "PROVIDER",
    "SOURCE",
    "SOURCE_DESCRIPTION",
    "COUNTRY",
    "DATASET",
    "NEXT_RELEASE_DATE",
    "LAST_RELEASE_DATE",
];

/// Dates in the DATA sheet are ISO formatted.
const DATE_FORMAT_OUTPUT: &str = "%Y-%m-%d";

/// The DATA/META file pair generated for one ISIN-month.
#[derive(Debug, Clone)]
pub struct GeneratedPair {
    pub data: PathBuf,
    pub meta: PathBuf,
}

impl GeneratedPair {
    /// Bare filenames, as they appear inside the submission archive.
    pub fn entry_names(&self) -> Result<(String, String)> {
        let name = |p: &PathBuf| -> Result<String> {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .with_context(|| format!("`{}` has no filename", p.display()))
        };
        Ok((name(&self.data)?, name(&self.meta)?))
    }
}

/// Substitute `{isin}` and `{timestamp}` into a filename pattern.
pub fn fill_pattern(pattern: &str, isin: &str, timestamp: &str) -> String {
    pattern
        .replace("{isin}", isin)
        .replace("{timestamp}", timestamp)
}

/// Write the DATA and META files for one ISIN-month into the output
/// directory. Fails on an empty series or missing metadata; nothing is
/// defaulted silently.
pub fn generate_pair(cfg: &Config, unit: &MonthlySeries) -> Result<GeneratedPair> {
    fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("creating `{}`", cfg.output_dir.display()))?;

    let timestamp = unit.month.file_timestamp();
    let data = write_data_file(cfg, unit, &timestamp)
        .with_context(|| format!("DATA file for {} {}", unit.isin, unit.month))?;
    let meta = write_meta_file(cfg, unit, &timestamp)
        .with_context(|| format!("META file for {} {}", unit.isin, unit.month))?;

    Ok(GeneratedPair { data, meta })
}

/// DATA sheet template:
///
/// Row 1: (blank) | CODE1  | .. | CODE5
/// Row 2: (blank) | DESC1  | .. | DESC5
/// Row 3+: date   | value1 | .. | value5
fn write_data_file(cfg: &Config, unit: &MonthlySeries, timestamp: &str) -> Result<PathBuf> {
    if unit.is_empty() {
        bail!("series has no dates");
    }

    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_active_sheet_mut();
    sheet.set_name("DATA");

    // rows 1 and 2: codes and descriptions, column A left blank
    for (i, category) in CATEGORIES.iter().enumerate() {
        let col = (i + 2) as u32;
        sheet
            .get_cell_mut((col, 1))
            .set_value(category.code(&unit.isin));
        sheet
            .get_cell_mut((col, 2))
            .set_value(category.series_description(&unit.isin, &unit.description));
    }

    // rows 3+: one row per auction date, ascending
    for (i, (date, amounts)) in unit.rows().enumerate() {
        let row = (i + 3) as u32;
        sheet
            .get_cell_mut((1, row))
            .set_value(date.format(DATE_FORMAT_OUTPUT).to_string());
        for (slot, value) in amounts.iter().enumerate() {
            if let Some(value) = value {
                sheet
                    .get_cell_mut(((slot + 2) as u32, row))
                    .set_value_number(*value);
            }
        }
    }

    let path = cfg
        .output_dir
        .join(fill_pattern(&cfg.data_file_pattern, &unit.isin, timestamp));
    umya_spreadsheet::writer::xlsx::write(&book, &path)
        .with_context(|| format!("writing `{}`", path.display()))?;
    info!(path = %path.display(), rows = unit.len(), "wrote DATA file");
    Ok(path)
}

/// META sheet template: header row of `META_COLUMNS`, then one row per
/// series code.
fn write_meta_file(cfg: &Config, unit: &MonthlySeries, timestamp: &str) -> Result<PathBuf> {
    if cfg.metadata.frequency.is_empty() {
        bail!("metadata is missing FREQUENCY");
    }

    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_active_sheet_mut();
    sheet.set_name("META");

    for (i, column) in META_COLUMNS.iter().enumerate() {
        sheet.get_cell_mut(((i + 1) as u32, 1)).set_value(*column);
    }

    for (r, category) in CATEGORIES.iter().enumerate() {
        let code = category.code(&unit.isin);
        let description = category.series_description(&unit.isin, &unit.description);
        let values = meta_row(cfg, &code, &description);
        let row = (r + 2) as u32;
        for (c, value) in values.iter().enumerate() {
            if !value.is_empty() {
                sheet.get_cell_mut(((c + 1) as u32, row)).set_value(value);
            }
        }
    }

    let path = cfg
        .output_dir
        .join(fill_pattern(&cfg.meta_file_pattern, &unit.isin, timestamp));
    umya_spreadsheet::writer::xlsx::write(&book, &path)
        .with_context(|| format!("writing `{}`", path.display()))?;
    info!(path = %path.display(), "wrote META file");
    Ok(path)
}

/// One META row, aligned with `META_COLUMNS`.
fn meta_row(cfg: &Config, code: &str, description: &str) -> [String; 18] {
    let m = &cfg.metadata;
    [
        code.to_string(),
        description.to_string(),
        m.frequency.clone(),
        m.multiplier.clone(),
        m.aggregation_type.clone(),
        m.unit_type.clone(),
        m.data_type.clone(),
        m.data_unit.clone(),
        m.seasonally_adjusted.clone(),
        m.annualized.clone(),
        m.provider_measure_url.clone(),
        m.provider.clone(),
        m.source.clone(),
        m.source_description.clone(),
        m.country.clone(),
        m.dataset.clone(),
        String::new(), // NEXT_RELEASE_DATE
        String::new(), // LAST_RELEASE_DATE
    ]
}
