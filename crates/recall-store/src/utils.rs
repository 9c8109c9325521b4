// crates/recall-store/src/utils.rs
// Shared utility functions

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// Convert a Path to an owned String, replacing invalid UTF-8 with U+FFFD.
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Truncate to at most `max_bytes` without splitting a UTF-8 character.
pub fn truncate_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Serialize an embedding as little-endian f32 bytes (sqlite-vec blob format).
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Cosine distance (0..=2) to similarity score (1 = identical).
pub fn distance_to_score(distance: f64) -> f64 {
    1.0 - distance
}

/// RFC 3339 with microsecond precision, `Z` suffix. Fixed width, so text
/// order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_path_to_string() {
        use std::path::PathBuf;
        let path = PathBuf::from("/home/user/.recall/recall.db");
        assert_eq!(path_to_string(&path), "/home/user/.recall/recall.db");
    }

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate_at_boundary("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(truncate_at_boundary("aé", 2), "a");
        assert_eq!(truncate_at_boundary("aé", 3), "aé");
    }

    #[test]
    fn test_embedding_to_bytes() {
        let bytes = embedding_to_bytes(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[4..], &(-2.5f32).to_le_bytes());
    }

    #[test]
    fn test_distance_to_score() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(0.25), 0.75);
    }

    #[test]
    fn test_timestamp_round_trip_and_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let later = earlier + chrono::Duration::microseconds(1);
        let a = format_timestamp(&earlier);
        let b = format_timestamp(&later);
        assert_eq!(a, "2026-01-02T03:04:05.000000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(&b), Some(later));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
