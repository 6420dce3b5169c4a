//! Clock access for timestamp stamping.

use chrono::Utc;

/// Current wall-clock time in whole epoch milliseconds.
///
/// Millisecond timestamps stay far below 2^53, so the float representation
/// is exact.
#[must_use]
pub fn now_millis() -> f64 {
    Utc::now().timestamp_millis() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_produce_integral_milliseconds() {
        let now = now_millis();
        assert!(now > 1.6e12);
        assert_eq!(now.fract(), 0.0);
    }
}
