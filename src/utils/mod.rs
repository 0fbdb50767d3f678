//! Utility functions and helpers.

pub mod http;

use std::fmt::Write;

/// Join ids into the pipe-separated list the upstream API expects.
pub fn join_ids(ids: &[u64]) -> String {
    let mut joined = String::with_capacity(ids.len() * 8);
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            joined.push('|');
        }
        let _ = write!(joined, "{id}");
    }
    joined
}

/// Milliseconds elapsed since `start`, saturating.
pub fn elapsed_ms(start: std::time::Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids(&[5, 3, 9]), "5|3|9");
        assert_eq!(join_ids(&[42]), "42");
        assert_eq!(join_ids(&[]), "");
    }
}
