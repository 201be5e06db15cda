// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

/// The scores observed for one region, as assembled by the readers.
///
/// `scores` only holds the strictly positive scores, in the order they were
/// encountered. `record_count` counts every score record for the region,
/// including the zero scorers, so that counting policies which include them
/// can be applied without reparsing the source.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct RegionScores {
    pub scores: Vec<f64>,
    pub record_count: u64,
}

impl RegionScores {
    /// Number of contestants with a strictly positive score.
    pub fn non_zero_count(&self) -> u64 {
        self.scores.len() as u64
    }
}

// ******** Output data structures *********

/// The final allocation for one region.
///
/// `b1` is kept at full precision; it is only fixed to two decimal places
/// when rendered. `total_b` is the post-cap integer total.
#[derive(PartialEq, Debug, Clone)]
pub struct AllocationRecord {
    pub region_code: String,
    pub b1: f64,
    pub b2: u32,
    pub b3: u32,
    pub total_b: u32,
    pub total_quota: u32,
}

/// The outcome of one allocation run under a single counting policy.
#[derive(PartialEq, Debug, Clone)]
pub struct AllocationResult {
    /// The B1 denominator: the sum of the participant counts selected by the
    /// active counting policy.
    pub national_total_participants: u64,
    /// Number of B2 awards actually handed out.
    pub b2_awards: u32,
    /// Number of B3 awards actually handed out.
    pub b3_awards: u32,
    /// One record per region with at least one positive score, region code
    /// ascending.
    pub records: Vec<AllocationRecord>,
    /// Regions with no positive score record: absent from the score source,
    /// or present with only zero scores. They are excluded from `records`
    /// entirely, though their counts still feed the B1 denominator.
    pub skipped_regions: Vec<String>,
}

/// Errors that prevent the allocation from completing.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum AllocationErrors {
    EmptyAllocation,
}

impl Error for AllocationErrors {}

impl Display for AllocationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationErrors::EmptyAllocation => {
                write!(f, "no region has any score: nothing to allocate")
            }
        }
    }
}

// ********* Configuration **********

/// How the per-region participant counts feeding B1 are obtained.
///
/// The policy only changes the B1 input; B2 and B3 always work on the score
/// lists directly.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CountingPolicy {
    /// Use the externally published participant table.
    Official,
    /// Count all score records per region, zero scorers included.
    AllScorers,
    /// Count only the strictly positive score records per region.
    NonZeroScorers,
}

impl CountingPolicy {
    /// A short stable label, used in output file names and logs.
    pub fn label(&self) -> &'static str {
        match self {
            CountingPolicy::Official => "official",
            CountingPolicy::AllScorers => "all_scorers",
            CountingPolicy::NonZeroScorers => "non_zero_scorers",
        }
    }
}

/// The rounding applied to `b1 + b2 + b3` before capping.
///
/// The choice matters at exact half-integer sums; it is configuration, not a
/// fixed rule.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RoundingRule {
    HalfToEven,
    HalfAwayFromZero,
}

/// Which per-region contestant count the participant-ratio cap multiplies
/// with. The count always comes from the score source, regardless of the
/// active `CountingPolicy`.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RatioCapCount {
    Disabled,
    NonZeroScorers,
    AllScorers,
}

/// The constants and policy choices governing one allocation run.
///
/// Passed explicitly to every run so that runs under different policies can
/// proceed independently without shared state.
#[derive(PartialEq, Debug, Clone)]
pub struct AllocationConfig {
    /// S: size of the B-quota pool.
    pub total_b_quotas: u32,
    /// K1: number of score segments per region for B2.
    pub segment_count: usize,
    /// K2: number of top individual scores per region considered for B3.
    pub top_score_count: usize,
    /// P: fractional participant-ratio cap.
    pub max_region_participant_ratio: f64,
    pub max_b_quota_per_region: u32,
    /// Fixed baseline quota granted to every region.
    pub base_a_quota: u32,
    pub rounding_rule: RoundingRule,
    pub ratio_cap: RatioCapCount,
}

impl AllocationConfig {
    pub const DEFAULT_CONFIG: AllocationConfig = AllocationConfig {
        total_b_quotas: 150,
        segment_count: 5,
        top_score_count: 5,
        max_region_participant_ratio: 0.05,
        max_b_quota_per_region: 12,
        base_a_quota: 5,
        rounding_rule: RoundingRule::HalfToEven,
        ratio_cap: RatioCapCount::NonZeroScorers,
    };

    /// Number of B2 award slots: floor(S x 0.3).
    pub fn b2_slots(&self) -> usize {
        (self.total_b_quotas as f64 * 0.3).floor() as usize
    }

    /// Number of B3 award slots: floor(S x 0.2).
    pub fn b3_slots(&self) -> usize {
        (self.total_b_quotas as f64 * 0.2).floor() as usize
    }
}
