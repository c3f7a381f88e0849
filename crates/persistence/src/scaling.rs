//! The single ×100 integer-scaling transform (SPEC_FULL Open Question #2, DESIGN.md
//! decision #2). Every engine upstream reports unscaled `f64`; this is the only place
//! in the crate that converts a price to the integer representation `daily_charts`
//! stores its OHLCV columns in.

/// Rounds to the nearest hundredth-of-a-cent-safe integer. `daily_charts.open/high/
/// low/close/volume` are `INTEGER` columns holding price × 100.
pub fn scale_for_storage(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_and_rounds_to_the_nearest_cent() {
        assert_eq!(scale_for_storage(123.456), 12346);
        assert_eq!(scale_for_storage(0.0), 0);
        assert_eq!(scale_for_storage(99.995), 9999 + 1);
    }
}
