// Primitives for reading the CSV input tables.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::{debug, warn};
use snafu::prelude::*;

use quota_allocation::RegionScores;

use crate::quota::{
    config_reader::{ParticipantsSource, ScoreSource},
    io_common::simplify_file_name,
    *,
};

/// Reads the published participant table: one row per region, a code column
/// and a count column, with an optional national-total row that is skipped.
pub fn read_participants_csv(
    path: &Path,
    cfs: &ParticipantsSource,
) -> QuotaResult<BTreeMap<String, u64>> {
    let label = path.display().to_string();
    let rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .context(CsvOpenSnafu { path: label.clone() })?;
    parse_participants(rdr, label.as_str(), cfs)
}

fn parse_participants<R: std::io::Read>(
    mut rdr: csv::Reader<R>,
    label: &str,
    cfs: &ParticipantsSource,
) -> QuotaResult<BTreeMap<String, u64>> {
    let headers = rdr
        .headers()
        .context(CsvOpenSnafu {
            path: label.to_string(),
        })?
        .clone();
    let code_idx = find_column(&headers, cfs.code_column().as_str(), label)?;
    let count_idx = find_column(&headers, cfs.count_column().as_str(), label)?;
    let total_label = cfs.total_label();

    let mut res: BTreeMap<String, u64> = BTreeMap::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // Line 1 is the header.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        debug!("{:?} {:?}", lineno, line);
        let code = match line.get(code_idx) {
            Some(c) if !c.trim().is_empty() => c.trim().to_string(),
            _ => {
                warn!("{}: line {}: empty region code, skipping", label, lineno);
                continue;
            }
        };
        if code == total_label {
            continue;
        }
        match line.get(count_idx).and_then(|s| s.trim().parse::<u64>().ok()) {
            Some(count) => {
                *res.entry(code).or_insert(0) += count;
            }
            None => {
                warn!(
                    "{}: line {}: participant count is not a number, skipping",
                    label, lineno
                );
            }
        }
    }
    Ok(res)
}

/// Reads every CSV score board in the directory and merges them into one
/// per-region score table. The region code is the leading prefix of the user
/// identifier. Strictly positive scores enter the score list; every parsed
/// record, zero scores included, increments the region's record count.
pub fn read_score_files(
    dir: &Path,
    cfs: &ScoreSource,
) -> QuotaResult<BTreeMap<String, RegionScores>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .context(ListingScoresSnafu {
            path: dir.display().to_string(),
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|x| x == "csv").unwrap_or(false))
        .collect();
    // Stable file order so that score encounter order is reproducible.
    files.sort();

    if files.is_empty() {
        whatever!("no CSV score files found in {}", dir.display());
    }

    let mut all: BTreeMap<String, RegionScores> = BTreeMap::new();
    let mut parsed_files = 0usize;
    for f in files.iter() {
        let label = simplify_file_name(f);
        let rdr = match ReaderBuilder::new().has_headers(true).from_path(f) {
            Ok(r) => r,
            Err(e) => {
                warn!("Could not open score file {}: {}", label, e);
                continue;
            }
        };
        match parse_scores(rdr, label.as_str(), cfs, &mut all) {
            Ok(()) => parsed_files += 1,
            Err(e) => warn!("Could not read score file {}: {}", label, e),
        }
    }
    if parsed_files == 0 {
        whatever!(
            "none of the score files in {} could be read",
            dir.display()
        );
    }
    Ok(all)
}

fn parse_scores<R: std::io::Read>(
    mut rdr: csv::Reader<R>,
    label: &str,
    cfs: &ScoreSource,
    acc: &mut BTreeMap<String, RegionScores>,
) -> QuotaResult<()> {
    let headers = rdr
        .headers()
        .context(CsvOpenSnafu {
            path: label.to_string(),
        })?
        .clone();
    let user_idx = find_column(&headers, cfs.user_column().as_str(), label)?;
    // Fall back to the conventional column name when the configured one is
    // absent from this particular board.
    let score_idx = match find_column(&headers, cfs.score_column().as_str(), label) {
        Ok(i) => i,
        Err(_) if cfs.score_column() != "score" => find_column(&headers, "score", label)?,
        Err(e) => return Err(e),
    };
    let prefix_len = cfs.region_prefix_length();

    let mut local: BTreeMap<String, RegionScores> = BTreeMap::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let user = match line.get(user_idx) {
            Some(u) if !u.trim().is_empty() => u.trim(),
            _ => {
                warn!("{}: line {}: empty user identifier, skipping", label, lineno);
                continue;
            }
        };
        if user.chars().count() < prefix_len {
            warn!(
                "{}: line {}: user '{}' is too short to carry a region code, skipping",
                label, lineno, user
            );
            continue;
        }
        let region: String = user.chars().take(prefix_len).collect();

        let score = match line.get(score_idx).and_then(|s| s.trim().parse::<f64>().ok()) {
            Some(s) if s >= 0.0 => s,
            _ => {
                warn!(
                    "{}: line {}: score is not a non-negative number, skipping",
                    label, lineno
                );
                continue;
            }
        };

        let entry = local.entry(region).or_insert_with(RegionScores::default);
        entry.record_count += 1;
        if score > 0.0 {
            entry.scores.push(score);
        }
    }
    // Merge only once the whole board has parsed: a structural error midway
    // leaves the accumulator untouched.
    for (region, rs) in local {
        let entry = acc.entry(region).or_insert_with(RegionScores::default);
        entry.record_count += rs.record_count;
        entry.scores.extend(rs.scores);
    }
    Ok(())
}

fn find_column(headers: &csv::StringRecord, name: &str, label: &str) -> QuotaResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .context(MissingColumnSnafu {
            column: name.to_string(),
            path: label.to_string(),
        })
}
