// src/source/mod.rs

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use glob::glob;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::series::{AuctionRow, CATEGORY_COUNT};

/// Italian day-first format used for date strings in the auction workbook.
const DATE_FORMAT_INPUT: &str = "%d/%m/%Y";

// Fixed column positions in the Banca d'Italia auction workbook.
const COL_DATE: usize = 0;
const COL_ISIN: usize = 2;
const COL_DESCRIPTION: usize = 5;

/// Source column per `CATEGORIES` slot (ASGN, MAX, MIN, OFR, REQ). The
/// workbook carries the amounts as offered=9, min=10, max=11, required=12,
/// assigned=13.
const AMOUNT_COLUMNS: [usize; CATEGORY_COUNT] = [13, 11, 10, 9, 12];

static ISIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").expect("ISIN regex is valid"));

/// Locate a previously extracted workbook under `dir` (first `*.xls*` match).
pub fn find_workbook(dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = dir.as_ref();
    let pattern = format!("{}/*.xls*", dir.display());
    let mut matches: Vec<PathBuf> = glob(&pattern)?.filter_map(Result::ok).collect();
    matches.sort();
    matches
        .into_iter()
        .next()
        .with_context(|| format!("no workbook found under `{}`", dir.display()))
}

/// Read every valid auction row from the workbook's first sheet.
///
/// The sheet carries preamble rows above and below its header; anything whose
/// ISIN or auction date does not parse is dropped.
pub fn read_auction_rows(path: impl AsRef<Path>) -> Result<Vec<AuctionRow>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("opening workbook `{}`", path.display()))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(range) => {
            range.with_context(|| format!("reading first sheet of `{}`", path.display()))?
        }
        None => bail!("workbook `{}` has no sheets", path.display()),
    };

    let header_idx = range
        .rows()
        .position(is_header_row)
        .with_context(|| format!("no ISIN header row in `{}`", path.display()))?;
    debug!(row = header_idx, "found header row");

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for row in range.rows().skip(header_idx + 1) {
        match parse_row(row) {
            Some(parsed) => rows.push(parsed),
            None => dropped += 1,
        }
    }

    if rows.is_empty() {
        bail!("no valid auction rows in `{}`", path.display());
    }
    if dropped > 0 {
        warn!(dropped, kept = rows.len(), "dropped unparseable rows");
    }
    Ok(rows)
}

fn is_header_row(row: &[Data]) -> bool {
    row.iter()
        .any(|cell| matches!(cell, Data::String(s) if s.trim().eq_ignore_ascii_case("ISIN")))
}

fn parse_row(row: &[Data]) -> Option<AuctionRow> {
    let isin = cell_string(row.get(COL_ISIN)?)?;
    if !ISIN_RE.is_match(&isin) {
        return None;
    }
    let date = parse_date(row.get(COL_DATE)?)?;
    let description = row
        .get(COL_DESCRIPTION)
        .and_then(cell_string)
        .unwrap_or_default();

    let mut amounts = [None; CATEGORY_COUNT];
    for (slot, &col) in AMOUNT_COLUMNS.iter().enumerate() {
        amounts[slot] = row.get(col).and_then(parse_amount);
    }

    Some(AuctionRow {
        date,
        isin,
        description,
        amounts,
    })
}

fn parse_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime().map(|dt| dt.date()),
        Data::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT_INPUT).ok(),
        _ => None,
    }
}

fn parse_amount(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        // some exports carry amounts as text with a decimal comma
        Data::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn cell_string(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}
