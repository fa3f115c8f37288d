//! Strength band table (spec §6). A sample's bucket is the highest band
//! whose `min_strength_db` *and* `min_band_rms_g` are both met; `None` below
//! `l1` (the implicit L0).

use crate::types::StrengthBucket;

struct Band {
    key: StrengthBucket,
    min_strength_db: f64,
    min_band_rms_g: f64,
}

const BANDS: [Band; 5] = [
    Band { key: StrengthBucket::L5, min_strength_db: 34.0, min_band_rms_g: 0.048 },
    Band { key: StrengthBucket::L4, min_strength_db: 28.0, min_band_rms_g: 0.024 },
    Band { key: StrengthBucket::L3, min_strength_db: 22.0, min_band_rms_g: 0.012 },
    Band { key: StrengthBucket::L2, min_strength_db: 16.0, min_band_rms_g: 0.006 },
    Band { key: StrengthBucket::L1, min_strength_db: 10.0, min_band_rms_g: 0.003 },
];

/// Highest band whose thresholds are both met by `strength_db`/`band_rms_g`.
pub fn bucket_for(strength_db: f64, band_rms_g: f64) -> Option<StrengthBucket> {
    BANDS
        .iter()
        .find(|b| strength_db >= b.min_strength_db && band_rms_g >= b.min_band_rms_g)
        .map(|b| b.key)
}

/// `min_strength_db` threshold of the `l2` band — the ceiling below which a
/// finding's strength is "negligible" (used by the confidence formula's
/// strength-band cap, SPEC_FULL.md §E).
pub fn negligible_strength_max_db() -> f64 {
    BANDS.iter().rev().nth(1).map(|b| b.min_strength_db).unwrap_or(8.0)
}

/// `min_strength_db` threshold of the `l3` band — the ceiling below which a
/// finding's strength is "light".
pub fn light_strength_max_db() -> f64 {
    BANDS.iter().rev().nth(2).map(|b| b.min_strength_db).unwrap_or(16.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_l1_is_none() {
        assert!(bucket_for(5.0, 0.001).is_none());
    }

    #[test]
    fn exact_l3_threshold_matches_l3() {
        assert_eq!(bucket_for(22.0, 0.012), Some(StrengthBucket::L3));
    }

    #[test]
    fn high_db_but_low_amplitude_does_not_promote() {
        // strength_db alone can't satisfy a band without the amplitude condition.
        assert_eq!(bucket_for(34.0, 0.001), None);
    }

    #[test]
    fn negligible_and_light_thresholds_come_from_table() {
        assert_eq!(negligible_strength_max_db(), 16.0);
        assert_eq!(light_strength_max_db(), 22.0);
    }
}
