// src/series/mod.rs

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, Result};

pub const CATEGORY_COUNT: usize = 5;

/// One of the five amount series published per auction.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub key: &'static str,
    pub suffix: &'static str,
    pub description: &'static str,
}

/// Output column order for the per-ISIN amount series.
pub const CATEGORIES: [Category; CATEGORY_COUNT] = [
    Category {
        key: "ASGN",
        suffix: "ASGN.ITBI.M",
        description: "amounts: assigned",
    },
    Category {
        key: "MAX",
        suffix: "MAX.ITBI.M",
        description: "amounts: maximum offered",
    },
    Category {
        key: "MIN",
        suffix: "MIN.ITBI.M",
        description: "amounts: minimum offered",
    },
    Category {
        key: "OFR",
        suffix: "OFR.ITBI.M",
        description: "amounts: offered",
    },
    Category {
        key: "REQ",
        suffix: "REQ.ITBI.M",
        description: "amounts: required",
    },
];

impl Category {
    /// Full series code, e.g. `IT0005514473.ASGN.ITBI.M`.
    pub fn code(&self, isin: &str) -> String {
        format!("{}.{}", isin, self.suffix)
    }

    /// Full series description. No spaces around `:` or `;`; the submission
    /// format is whitespace-sensitive here.
    pub fn series_description(&self, isin: &str, instrument: &str) -> String {
        format!("ISIN:{};{}:{}", isin, instrument, self.description)
    }
}

/// A (year, month) reporting period.
///
/// Construction is validated, so `last_day` cannot fail afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            bail!("month {} out of range 1-12", month);
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            bail!("invalid year {}", year);
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse `"YYYY-MM"`.
    pub fn parse(s: &str) -> Result<Self> {
        let (y, m) = match s.trim().split_once('-') {
            Some(parts) => parts,
            None => bail!("expected YYYY-MM, got `{}`", s),
        };
        let year: i32 = y.parse()?;
        let month: u32 = m.parse()?;
        Self::new(year, month)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Last calendar day of this month.
    pub fn last_day(&self) -> NaiveDate {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .expect("validated on construction")
            .pred_opt()
            .expect("first of month has a predecessor")
    }

    /// Filename timestamp: last day of the month as `YYYYMMDD`.
    pub fn file_timestamp(&self) -> String {
        self.last_day().format("%Y%m%d").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One parsed row of the source auction workbook. `amounts` is indexed by
/// `CATEGORIES` order; a column missing in the source stays `None`.
#[derive(Debug, Clone)]
pub struct AuctionRow {
    pub date: NaiveDate,
    pub isin: String,
    pub description: String,
    pub amounts: [Option<f64>; CATEGORY_COUNT],
}

/// All series for one ISIN within one reporting month.
#[derive(Debug, Clone)]
pub struct MonthlySeries {
    pub isin: String,
    pub description: String,
    pub month: MonthKey,
    rows: BTreeMap<NaiveDate, [Option<f64>; CATEGORY_COUNT]>,
}

impl MonthlySeries {
    pub fn new(isin: impl Into<String>, description: impl Into<String>, month: MonthKey) -> Self {
        Self {
            isin: isin.into(),
            description: description.into(),
            month,
            rows: BTreeMap::new(),
        }
    }

    /// Insert one auction's amounts. The first row seen for a date wins;
    /// supplementary tranches on the same day are not aggregated.
    pub fn insert(&mut self, date: NaiveDate, amounts: [Option<f64>; CATEGORY_COUNT]) {
        self.rows.entry(date).or_insert(amounts);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows in ascending date order.
    pub fn rows(&self) -> impl Iterator<Item = (&NaiveDate, &[Option<f64>; CATEGORY_COUNT])> {
        self.rows.iter()
    }
}

/// Group source rows into per-(ISIN, month) series. The first row seen for an
/// ISIN-month supplies the instrument description.
pub fn group_by_unit(rows: &[AuctionRow]) -> BTreeMap<(String, MonthKey), MonthlySeries> {
    let mut units: BTreeMap<(String, MonthKey), MonthlySeries> = BTreeMap::new();
    for row in rows {
        let month = MonthKey::from_date(row.date);
        let unit = units
            .entry((row.isin.clone(), month))
            .or_insert_with(|| MonthlySeries::new(&row.isin, &row.description, month));
        unit.insert(row.date, row.amounts);
    }
    units
}
