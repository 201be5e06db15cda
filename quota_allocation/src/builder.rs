pub use crate::config::*;

use std::collections::BTreeMap;

/// A builder for assembling allocation inputs record by record.
///
/// This is the simplest entry point when the score records arrive one at a
/// time rather than as pre-grouped tables.
///
/// ```
/// use quota_allocation::builder::Builder;
/// use quota_allocation::{AllocationConfig, CountingPolicy};
/// # use quota_allocation::AllocationErrors;
///
/// let mut builder = Builder::new(&AllocationConfig::DEFAULT_CONFIG)?
///     .participants(&[("GD".to_string(), 468), ("ZJ".to_string(), 293)])?;
///
/// builder.add_score_record("GD", 245.0)?;
/// builder.add_score_record("GD", 0.0)?;
/// builder.add_score_record("ZJ", 310.5)?;
///
/// let result = builder.run(CountingPolicy::Official)?;
/// assert_eq!(result.records.len(), 2);
///
/// # Ok::<(), AllocationErrors>(())
/// ```
pub struct Builder {
    pub(crate) _config: AllocationConfig,
    pub(crate) _participants: BTreeMap<String, u64>,
    pub(crate) _scores: BTreeMap<String, RegionScores>,
}

impl Builder {
    pub fn new(config: &AllocationConfig) -> Result<Builder, AllocationErrors> {
        Ok(Builder {
            _config: config.clone(),
            _participants: BTreeMap::new(),
            _scores: BTreeMap::new(),
        })
    }

    /// Sets the published participant table, replacing any previous one.
    pub fn participants(self, counts: &[(String, u64)]) -> Result<Builder, AllocationErrors> {
        Ok(Builder {
            _config: self._config,
            _participants: counts.iter().cloned().collect(),
            _scores: self._scores,
        })
    }

    /// Adds one contestant score record for a region.
    ///
    /// Zero scores are counted for the zero-inclusive policies but never
    /// enter the score list.
    pub fn add_score_record(&mut self, region_code: &str, score: f64) -> Result<(), AllocationErrors> {
        let entry = self
            ._scores
            .entry(region_code.to_string())
            .or_insert_with(RegionScores::default);
        entry.record_count += 1;
        if score > 0.0 {
            entry.scores.push(score);
        }
        Ok(())
    }

    /// Runs the allocation over the assembled inputs under one policy.
    pub fn run(&self, policy: CountingPolicy) -> Result<AllocationResult, AllocationErrors> {
        crate::run_allocation_stats(&self._participants, &self._scores, policy, &self._config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_counts_zero_records() {
        let mut builder = Builder::new(&AllocationConfig::DEFAULT_CONFIG)
            .unwrap()
            .participants(&[("AA".to_string(), 10)])
            .unwrap();
        builder.add_score_record("AA", 50.0).unwrap();
        builder.add_score_record("AA", 0.0).unwrap();
        builder.add_score_record("BB", 60.0).unwrap();

        let res = builder.run(CountingPolicy::AllScorers).unwrap();
        // AA has 2 records (one zero), BB has 1.
        assert_eq!(res.national_total_participants, 3);
        let aa = res
            .records
            .iter()
            .find(|r| r.region_code == "AA")
            .unwrap();
        assert!((aa.b1 - 150.0 * 0.5 * (2.0 / 3.0)).abs() < 1e-9);
    }
}
