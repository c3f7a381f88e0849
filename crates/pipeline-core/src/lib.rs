pub mod config;
pub mod credential;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use credential::*;
pub use error::*;
pub use traits::*;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_from_score_covers_all_buckets() {
        assert_eq!(Grade::from_score(95.0).as_str(), "Strong Buy");
        assert_eq!(Grade::from_score(65.0).as_str(), "Buy");
        assert_eq!(Grade::from_score(50.0).as_str(), "Neutral");
        assert_eq!(Grade::from_score(25.0).as_str(), "Sell");
        assert_eq!(Grade::from_score(5.0).as_str(), "Strong Sell");
    }

    #[test]
    fn fundamental_snapshot_completeness_counts_populated_fields() {
        let snap = FundamentalSnapshot {
            revenue: Some(100.0),
            net_income: Some(10.0),
            ..Default::default()
        };
        assert!((snap.completeness() - 2.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn scoring_weights_default_sums_to_one() {
        ScoringWeights::default().validate().unwrap();
    }

    #[test]
    fn scoring_weights_rejects_bad_sum() {
        let bad = ScoringWeights { fundamental: 0.5, ..ScoringWeights::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn sector_ranges_falls_back_to_default_bucket() {
        let mut ranges = SectorRanges::default();
        ranges.ranges.entry("default".to_string()).or_default().insert("pe".to_string(), (0.0, 50.0));
        assert!(ranges.plausible(Some("unknown_sector"), "pe", 20.0));
        assert!(!ranges.plausible(Some("unknown_sector"), "pe", 500.0));
    }

    #[test]
    fn sector_ranges_with_no_entry_is_permissive() {
        let ranges = SectorRanges::default();
        assert!(ranges.plausible(None, "pe", 1_000_000.0));
    }
}
