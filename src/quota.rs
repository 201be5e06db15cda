use log::{info, warn};

use quota_allocation::*;
use snafu::{prelude::*, Snafu};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use text_diff::print_diff;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_excel;
pub mod regions;

use crate::quota::config_reader::*;
use crate::quota::io_common::resolve_path;
use crate::quota::regions::RegionDirectory;

#[derive(Debug, Snafu)]
pub enum QuotaError {
    #[snafu(display("Error opening config file {path}"))]
    OpeningConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error opening region mapping file {path}"))]
    OpeningMapping {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("The config file path has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Missing column '{column}' in {path}"))]
    MissingColumn { column: String, path: String },
    #[snafu(display("Error opening Excel workbook {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Workbook {path} has no usable sheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Error listing score files in {path}"))]
    ListingScores {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing output file {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error opening reference file {path}"))]
    OpeningReference {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type QuotaResult<T> = Result<T, QuotaError>;

/// Runs one allocation batch: loads the sources described by the config file
/// and invokes the allocator once per configured counting policy.
///
/// A policy run failing (for example the published participant table being
/// unavailable to the 'official' policy) is reported and does not abort the
/// other runs; the batch only fails when no run could be completed.
pub fn run_batch(
    config_path: String,
    out_override: Option<String>,
    reference_path: Option<String>,
) -> QuotaResult<()> {
    let config_p = Path::new(config_path.as_str());
    let config_str = fs::read_to_string(config_path.clone()).context(OpeningConfigSnafu {
        path: config_path.clone(),
    })?;
    let config: QuotaConfig = serde_json::from_str(&config_str).context(ParsingJsonSnafu {
        path: config_path.clone(),
    })?;
    info!("config: {:?}", config);

    // Validate the rules:
    let rules = validate_rules(&config.rules)?;
    let policies = validate_policies(&config.rules)?;

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let directory = RegionDirectory::from_json_file(&resolve_path(
        root_p,
        config.region_mapping_file.as_str(),
    ))?;

    // The score table defines the output roster; without it no run can proceed.
    let scores = io_csv::read_score_files(
        &resolve_path(root_p, config.score_source.results_directory.as_str()),
        &config.score_source,
    )?;

    // The published participant table is only required by the 'official'
    // policy: keep the other runs alive when it cannot be loaded.
    let participants = match load_participants(root_p, &config.participants_source) {
        Ok(table) => Some(table),
        Err(e) => {
            warn!("The published participant table could not be loaded: {}", e);
            None
        }
    };

    let out_dir = out_override
        .or_else(|| config.output_settings.output_directory.clone())
        .unwrap_or_else(|| ".".to_string());

    let mut completed = 0usize;
    for (idx, policy) in policies.iter().enumerate() {
        // The reference, when given, is checked against the first configured run.
        let reference = if idx == 0 {
            reference_path.as_deref()
        } else {
            None
        };
        let res = run_policy(
            &config,
            &rules,
            *policy,
            participants.as_ref(),
            &scores,
            &directory,
            out_dir.as_str(),
            reference,
        );
        match res {
            Ok(()) => completed += 1,
            Err(e) => warn!(
                "Allocation run under policy '{}' failed: {}",
                policy.label(),
                e
            ),
        }
    }

    if completed == 0 {
        whatever!("no allocation run could be completed");
    }
    Ok(())
}

fn load_participants(
    root_p: &Path,
    source: &ParticipantsSource,
) -> QuotaResult<BTreeMap<String, u64>> {
    let path = resolve_path(root_p, source.file_path.as_str());
    match source.provider.as_str() {
        "csv" => io_csv::read_participants_csv(&path, source),
        "xlsx" => io_excel::read_participants_xlsx(&path, source),
        x => whatever!("participants provider not implemented: {:?}", x),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_policy(
    config: &QuotaConfig,
    rules: &AllocationConfig,
    policy: CountingPolicy,
    participants: Option<&BTreeMap<String, u64>>,
    scores: &BTreeMap<String, RegionScores>,
    directory: &RegionDirectory,
    out_dir: &str,
    reference_path: Option<&str>,
) -> QuotaResult<()> {
    let empty: BTreeMap<String, u64> = BTreeMap::new();
    let official = match (policy, participants) {
        (CountingPolicy::Official, None) => {
            whatever!("the 'official' counting policy requires the published participant table")
        }
        (_, Some(table)) => table,
        (_, None) => &empty,
    };

    let result = match run_allocation_stats(official, scores, policy, rules) {
        Ok(r) => r,
        Err(e) => whatever!("allocation failed: {}", e),
    };

    for code in result.skipped_regions.iter() {
        warn!(
            "Region '{} ({})' has no positive score record and is absent from the output",
            directory.name(code),
            code
        );
    }

    let table = render_csv(&result, directory, rules)?;
    print_summary(
        config.output_settings.contest_name.as_str(),
        policy,
        &result,
        directory,
        rules,
    );

    // The output directory may not exist yet on a fresh checkout.
    fs::create_dir_all(out_dir).context(WritingOutputSnafu {
        path: out_dir.to_string(),
    })?;
    let out_path: PathBuf = [
        out_dir,
        format!("calculated_quotas_{}.csv", policy.label()).as_str(),
    ]
    .iter()
    .collect();
    fs::write(&out_path, table.as_bytes()).context(WritingOutputSnafu {
        path: out_path.display().to_string(),
    })?;
    info!(
        "Allocation under policy '{}' written to {}",
        policy.label(),
        out_path.display()
    );

    if let Some(ref_p) = reference_path {
        let reference = fs::read_to_string(ref_p).context(OpeningReferenceSnafu {
            path: ref_p.to_string(),
        })?;
        if !check_reference(reference.as_str(), table.as_str()) {
            whatever!("Difference detected between the calculated allocation and the reference")
        }
    }

    Ok(())
}

/// Renders the allocation records as the flat output table.
fn render_csv(
    result: &AllocationResult,
    directory: &RegionDirectory,
    rules: &AllocationConfig,
) -> QuotaResult<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let header: Vec<String> = [
        "regionName",
        "baseAQuota",
        "b1",
        "b2",
        "b3",
        "totalB",
        "totalQuota",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Err(e) = wtr.write_record(&header) {
        whatever!("could not write the output header: {}", e);
    }
    for r in result.records.iter() {
        let row: Vec<String> = vec![
            directory.name(r.region_code.as_str()),
            rules.base_a_quota.to_string(),
            format!("{:.2}", r.b1),
            r.b2.to_string(),
            r.b3.to_string(),
            r.total_b.to_string(),
            r.total_quota.to_string(),
        ];
        if let Err(e) = wtr.write_record(&row) {
            whatever!("could not write the output row: {}", e);
        }
    }
    let bytes = match wtr.into_inner() {
        Ok(b) => b,
        Err(e) => whatever!("could not flush the output table: {}", e),
    };
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => whatever!("output table is not valid UTF-8: {}", e),
    }
}

fn print_summary(
    contest_name: &str,
    policy: CountingPolicy,
    result: &AllocationResult,
    directory: &RegionDirectory,
    rules: &AllocationConfig,
) {
    println!(
        "\n--- {} quota allocation ({} counting) ---",
        contest_name,
        policy.label()
    );
    println!(
        "{:<16} {:>4} {:>8} {:>4} {:>4} {:>7} {:>11}",
        "region", "A", "B1", "B2", "B3", "totalB", "totalQuota"
    );
    for r in result.records.iter() {
        println!(
            "{:<16} {:>4} {:>8.2} {:>4} {:>4} {:>7} {:>11}",
            directory.name(r.region_code.as_str()),
            rules.base_a_quota,
            r.b1,
            r.b2,
            r.b3,
            r.total_b,
            r.total_quota
        );
    }
    println!(
        "national participants: {}  B2 awards: {}  B3 awards: {}",
        result.national_total_participants, result.b2_awards, result.b3_awards
    );
}

// Returns true when the produced table matches the reference; prints a diff
// otherwise.
fn check_reference(reference: &str, produced: &str) -> bool {
    if reference == produced {
        true
    } else {
        warn!("Found differences with the reference table");
        print_diff(reference, produced, "\n");
        false
    }
}
