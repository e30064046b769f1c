//! Identifier and clock helpers shared by the tracers.

use chrono::Utc;

/// Generate a unique identifier for a trace or span.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Milliseconds between two timestamps.
///
/// Saturates at zero so a clock step backwards never yields a negative duration.
pub fn duration_ms(start_time: u64, end_time: u64) -> u64 {
    end_time.saturating_sub(start_time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_duration_never_negative() {
        assert_eq!(duration_ms(1_000, 1_250), 250);
        assert_eq!(duration_ms(1_250, 1_000), 0);
    }
}
