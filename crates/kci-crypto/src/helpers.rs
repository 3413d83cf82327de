//! Constant-time comparison.

/// Performs a constant-time comparison of two byte strings.
/// Used for challenge blobs and key material so that the position of the
/// first differing byte does not leak through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        diff |= lhs ^ rhs;
    }
    diff == 0
}
