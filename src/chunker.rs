//! Document chunking strategies.
//!
//! Splits raw source material into unit texts suitable for independent
//! embedding and retrieval. The strategy is a tagged variant the caller
//! selects based on the declared input kind; nothing here sniffs filenames
//! or guesses formats.

use chrono::{DateTime, Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::ChunkingConfig;
use crate::core::errors::ApiError;

/// A ledger-shaped source: one profile plus dated entries grouped by account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerDocument {
    pub profile: LedgerProfile,
    pub accounts: Vec<LedgerAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerProfile {
    pub holder: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub name: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// ISO-8601 date (`2025-10-03`) or RFC 3339 datetime.
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub balance: f64,
}

/// A chunking request: the input kind declared by the caller together with
/// the source it applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkRequest {
    /// Blank-line separated prose; one unit per paragraph run.
    Paragraph { text: String },
    /// Fallback for unstructured text: consecutive character windows.
    FixedWidth {
        text: String,
        #[serde(default)]
        width: Option<usize>,
    },
    /// Structured ledger: one unit per profile, one per account-month.
    Ledger { document: LedgerDocument },
}

impl ChunkRequest {
    /// Produces the unit texts for this source.
    ///
    /// May legitimately return an empty list (blank input); callers decide
    /// whether that is an ingestion failure. Each returned unit is non-empty
    /// after trimming.
    pub fn into_units(self, config: &ChunkingConfig) -> Result<Vec<String>, ApiError> {
        match self {
            ChunkRequest::Paragraph { text } => Ok(split_paragraphs(&text)),
            ChunkRequest::FixedWidth { text, width } => Ok(split_fixed_width(
                &text,
                width.unwrap_or(config.fixed_width_chars),
            )),
            ChunkRequest::Ledger { document } => split_ledger(&document),
        }
    }
}

/// Splits on blank-line boundaries. A run of non-blank lines is one unit;
/// a trailing run without a closing blank line is still emitted.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut units = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_run(&mut run, &mut units);
        } else {
            run.push(line);
        }
    }
    flush_run(&mut run, &mut units);

    units
}

fn flush_run(run: &mut Vec<&str>, units: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    let unit = run.join("\n");
    run.clear();
    if !unit.trim().is_empty() {
        units.push(unit);
    }
}

/// Consecutive windows of `width` characters (not bytes).
pub fn split_fixed_width(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();

    chars
        .chunks(width)
        .map(|window| window.iter().collect::<String>())
        .filter(|unit| !unit.trim().is_empty())
        .collect()
}

/// One unit for the profile summary, then one unit per (account, month)
/// group with every entry rendered as a single line.
pub fn split_ledger(document: &LedgerDocument) -> Result<Vec<String>, ApiError> {
    let mut units = Vec::new();

    let profile = format!(
        "Customer profile for {}:\n{}",
        document.profile.holder.trim(),
        document.profile.summary.trim()
    );
    if !profile.trim().is_empty() {
        units.push(profile);
    }

    for account in &document.accounts {
        // BTreeMap keeps months in calendar order per account.
        let mut months: BTreeMap<(i32, u32), Vec<(NaiveDate, String)>> = BTreeMap::new();

        for entry in &account.entries {
            let day = entry_day(&entry.date)?;
            let line = format!(
                "On {}: {}, Amount: ${:.2}, Balance: ${:.2}",
                day.format("%B %-d, %Y"),
                entry.description.trim(),
                entry.amount,
                entry.balance
            );
            months
                .entry((day.year(), day.month()))
                .or_default()
                .push((day, line));
        }

        for ((year, month), mut lines) in months {
            lines.sort_by_key(|(day, _)| *day);

            let header_day = NaiveDate::from_ymd_opt(year, month, 1)
                .ok_or_else(|| ApiError::Ingestion(format!("invalid month {}-{}", year, month)))?;
            let mut unit = format!(
                "{} transactions for account \"{}\":",
                header_day.format("%B %Y"),
                account.name.trim()
            );
            for (_, line) in lines {
                unit.push('\n');
                unit.push_str(&line);
            }
            units.push(unit);
        }
    }

    Ok(units)
}

/// Calendar day of a ledger entry.
///
/// Datetimes keep the wall-clock date of their own offset. Converting to UTC
/// before taking the date can move an entry exported at local midnight into
/// the neighboring day, and with it into the wrong month group.
fn entry_day(raw: &str) -> Result<NaiveDate, ApiError> {
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day);
    }

    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|e| ApiError::Ingestion(format!("unparseable entry date '{}': {}", raw, e)))
}
