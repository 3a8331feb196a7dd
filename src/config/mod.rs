// src/config/mod.rs

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::series::MonthKey;

/// Which reporting months a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Most recent month present in the source data.
    Auto,
    /// The single configured `month`.
    Explicit,
    /// Every month present in the source data.
    All,
}

/// Resolved month selection, derived from `mode` + `month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSelection {
    Auto,
    Explicit(MonthKey),
    All,
}

/// Descriptive fields written into every META row. CODE and DESCRIPTION are
/// derived per series and are not configurable.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetadataDefaults {
    pub frequency: String,
    pub multiplier: String,
    pub aggregation_type: String,
    pub unit_type: String,
    pub data_type: String,
    pub data_unit: String,
    pub seasonally_adjusted: String,
    pub annualized: String,
    pub provider_measure_url: String,
    pub provider: String,
    pub source: String,
    pub source_description: String,
    pub country: String,
    pub dataset: String,
}

impl Default for MetadataDefaults {
    fn default() -> Self {
        Self {
            frequency: "M".into(),
            multiplier: "6".into(),
            aggregation_type: "END_OF_PERIOD".into(),
            unit_type: "LEVEL".into(),
            data_type: "CURRENCY".into(),
            data_unit: "EUR".into(),
            seasonally_adjusted: "NSA".into(),
            annualized: String::new(),
            provider_measure_url: DEFAULT_SOURCE_URL.into(),
            provider: "AfricaAI".into(),
            source: "BdIt".into(),
            source_description: "Banca d'Italia".into(),
            country: "ITA".into(),
            dataset: "ITBI".into(),
        }
    }
}

const DEFAULT_SOURCE_URL: &str =
    "https://www.bancaditalia.it/compiti/operazioni-mef/risultati-aste/index.html";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: Mode,
    /// Reporting month as `YYYY-MM`; required when `mode` is `explicit`.
    pub month: Option<String>,

    /// Page listing the auction-results downloads.
    pub source_url: String,
    /// Regex selecting the current-year auctions ZIP among the page's links.
    pub link_pattern: String,
    /// Already-downloaded workbook; when set, scraping is skipped entirely.
    pub input_file: Option<PathBuf>,

    pub download_dir: PathBuf,
    pub extracted_dir: PathBuf,
    pub output_dir: PathBuf,

    /// Filename patterns with `{isin}` and `{timestamp}` placeholders.
    pub data_file_pattern: String,
    pub meta_file_pattern: String,
    pub zip_file_pattern: String,

    pub metadata: MetadataDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            month: None,
            source_url: DEFAULT_SOURCE_URL.into(),
            link_pattern: r"aste_corrente.*\.zip".into(),
            input_file: None,
            download_dir: "downloads".into(),
            extracted_dir: "extracted".into(),
            output_dir: "output".into(),
            data_file_pattern: "ITBI_{isin}_DATA_{timestamp}.xls".into(),
            meta_file_pattern: "ITBI_{isin}_META_{timestamp}.xls".into(),
            zip_file_pattern: "ITBI_{isin}_{timestamp}.zip".into(),
            metadata: MetadataDefaults::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config `{}`", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config `{}`", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Surface bad settings before any file is touched.
    pub fn validate(&self) -> Result<()> {
        if self.mode == Mode::Explicit && self.month.is_none() {
            bail!("mode `explicit` requires a `month` (YYYY-MM)");
        }
        if let Some(month) = &self.month {
            MonthKey::parse(month).with_context(|| format!("config month `{}`", month))?;
        }
        for (name, pattern) in [
            ("data_file_pattern", &self.data_file_pattern),
            ("meta_file_pattern", &self.meta_file_pattern),
            ("zip_file_pattern", &self.zip_file_pattern),
        ] {
            if !pattern.contains("{isin}") || !pattern.contains("{timestamp}") {
                bail!("{} must contain {{isin}} and {{timestamp}}: `{}`", name, pattern);
            }
        }
        if self.metadata.frequency.is_empty() {
            bail!("metadata.frequency must not be empty");
        }
        Ok(())
    }

    pub fn month_selection(&self) -> Result<MonthSelection> {
        Ok(match self.mode {
            Mode::Auto => MonthSelection::Auto,
            Mode::All => MonthSelection::All,
            Mode::Explicit => {
                let month = self
                    .month
                    .as_deref()
                    .context("mode `explicit` requires a `month` (YYYY-MM)")?;
                MonthSelection::Explicit(MonthKey::parse(month)?)
            }
        })
    }
}
