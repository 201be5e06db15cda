use crate::quota::*;

use quota_allocation::{AllocationConfig, CountingPolicy, RatioCapCount, RoundingRule};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "contestName")]
    pub contest_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

/// Where the published per-region participant counts come from.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantsSource {
    /// `csv` or `xlsx`.
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "codeColumn")]
    _code_column: Option<String>,
    #[serde(rename = "countColumn")]
    _count_column: Option<String>,
    /// The label of the national-total row, which is skipped on load.
    #[serde(rename = "totalLabel")]
    _total_label: Option<String>,
}

impl ParticipantsSource {
    pub fn code_column(&self) -> String {
        self._code_column.clone().unwrap_or_else(|| "code".to_string())
    }

    pub fn count_column(&self) -> String {
        self._count_column.clone().unwrap_or_else(|| "count".to_string())
    }

    pub fn total_label(&self) -> String {
        self._total_label.clone().unwrap_or_else(|| "TOTAL".to_string())
    }
}

/// Where the per-contestant score records come from: a directory of CSV
/// score boards, one or more per contest.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSource {
    #[serde(rename = "resultsDirectory")]
    pub results_directory: String,
    #[serde(rename = "userColumn")]
    _user_column: Option<String>,
    #[serde(rename = "scoreColumn")]
    _score_column: Option<String>,
    /// The region code is the leading prefix of the user identifier.
    #[serde(rename = "regionPrefixLength")]
    _region_prefix_length: Option<usize>,
}

impl ScoreSource {
    pub fn user_column(&self) -> String {
        self._user_column.clone().unwrap_or_else(|| "user".to_string())
    }

    pub fn score_column(&self) -> String {
        self._score_column.clone().unwrap_or_else(|| "score".to_string())
    }

    pub fn region_prefix_length(&self) -> usize {
        self._region_prefix_length.unwrap_or(2)
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRules {
    #[serde(rename = "totalBQuotas")]
    pub total_b_quotas: u32,
    #[serde(rename = "segmentCount")]
    pub segment_count: usize,
    #[serde(rename = "topScoreCount")]
    pub top_score_count: usize,
    #[serde(rename = "maxRegionParticipantRatio")]
    pub max_region_participant_ratio: f64,
    #[serde(rename = "maxBQuotaPerRegion")]
    pub max_b_quota_per_region: u32,
    #[serde(rename = "baseAQuota")]
    pub base_a_quota: u32,
    #[serde(rename = "roundingRule")]
    pub rounding_rule: Option<String>,
    #[serde(rename = "ratioCapCounting")]
    pub ratio_cap_counting: Option<String>,
    #[serde(rename = "countingPolicies")]
    pub counting_policies: Option<Vec<String>>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(rename = "participantsSource")]
    pub participants_source: ParticipantsSource,
    #[serde(rename = "scoreSource")]
    pub score_source: ScoreSource,
    #[serde(rename = "regionMappingFile")]
    pub region_mapping_file: String,
    pub rules: QuotaRules,
}

pub fn validate_rules(rules: &QuotaRules) -> QuotaResult<AllocationConfig> {
    let res = AllocationConfig {
        total_b_quotas: rules.total_b_quotas,
        segment_count: rules.segment_count,
        top_score_count: rules.top_score_count,
        max_region_participant_ratio: rules.max_region_participant_ratio,
        max_b_quota_per_region: rules.max_b_quota_per_region,
        base_a_quota: rules.base_a_quota,
        rounding_rule: match rules.rounding_rule.as_deref() {
            None | Some("halfToEven") => RoundingRule::HalfToEven,
            Some("halfAwayFromZero") => RoundingRule::HalfAwayFromZero,
            Some(x) => {
                whatever!("unknown rounding rule: {:?}", x)
            }
        },
        ratio_cap: match rules.ratio_cap_counting.as_deref() {
            None | Some("nonZeroScorers") => RatioCapCount::NonZeroScorers,
            Some("allScorers") => RatioCapCount::AllScorers,
            Some("disabled") => RatioCapCount::Disabled,
            Some(x) => {
                whatever!("unknown ratio cap counting: {:?}", x)
            }
        },
    };
    Ok(res)
}

pub fn validate_policies(rules: &QuotaRules) -> QuotaResult<Vec<CountingPolicy>> {
    let names = rules.counting_policies.clone().unwrap_or_else(|| {
        vec![
            "official".to_string(),
            "allScorers".to_string(),
            "nonZeroScorers".to_string(),
        ]
    });
    let mut policies: Vec<CountingPolicy> = Vec::new();
    for name in names.iter() {
        let policy = match name.as_str() {
            "official" => CountingPolicy::Official,
            "allScorers" => CountingPolicy::AllScorers,
            "nonZeroScorers" => CountingPolicy::NonZeroScorers,
            x => {
                whatever!("unknown counting policy: {:?}", x)
            }
        };
        policies.push(policy);
    }
    Ok(policies)
}
