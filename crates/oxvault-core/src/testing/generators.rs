//! Test content generators.

use rand::Rng;

/// Random bytes of the given size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// Deterministic content where every byte depends on its offset.
///
/// Misplaced chunks show up as mismatches, unlike with constant fills.
pub fn patterned(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| u8::try_from((i * 31 + i / 251) % 251).unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(random_bytes(100).len(), 100);
        assert_eq!(patterned(5000).len(), 5000);
    }

    #[test]
    fn test_patterned_is_deterministic_and_varied() {
        let a = patterned(1024);
        assert_eq!(a, patterned(1024));
        assert_ne!(a[..512], a[512..]);
    }
}
