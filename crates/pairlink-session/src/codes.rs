//! Communion codes, phone number normalization and reply timestamps

use chrono::{DateTime, Local};
use rand::Rng;

const COMMUNION_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a communion code: 8 uppercase alphanumerics as `XXXX-XXXX`
pub fn communion_code() -> String {
    let mut rng = rand::thread_rng();
    let glyphs: String = (0..8)
        .map(|_| COMMUNION_CHARS[rng.gen_range(0..COMMUNION_CHARS.len())] as char)
        .collect();
    format!("{}-{}", &glyphs[..4], &glyphs[4..])
}

/// Strip everything but ASCII digits from a phone number
pub fn normalize_number(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Timestamp attached to a successful pairing reply (`YYYYMMDD-HHMM`)
pub fn reply_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y%m%d-%H%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_communion_code_format() {
        for _ in 0..100 {
            let code = communion_code();
            assert_eq!(code.len(), 9);
            let (head, tail) = code.split_at(4);
            assert!(tail.starts_with('-'));
            assert!(head
                .chars()
                .chain(tail[1..].chars())
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("+1 (555) 010-9999"), "15550109999");
        assert_eq!(normalize_number("abc"), "");
    }

    #[test]
    fn test_reply_timestamp() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 0).unwrap();
        assert_eq!(reply_timestamp(now), "20260307-0905");
    }
}
