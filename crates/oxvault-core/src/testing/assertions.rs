//! Content assertions.

use crate::volume::{EncryptedVolume, VolumeExt};

/// Assert that two byte slices are equal.
///
/// On failure, reports the sizes or the first differing offset instead of
/// dumping both buffers.
pub fn assert_bytes_equal(actual: &[u8], expected: &[u8], context: &str) {
    assert!(
        actual.len() == expected.len(),
        "{context}: size mismatch - expected {} bytes, got {} bytes",
        expected.len(),
        actual.len()
    );
    if let Some(i) = actual.iter().zip(expected).position(|(a, e)| a != e) {
        panic!(
            "{context}: content mismatch at byte {i} - expected 0x{:02x}, got 0x{:02x}",
            expected[i], actual[i]
        );
    }
}

/// Assert that the volume file at `path` holds exactly `expected`.
pub fn assert_volume_file<V: EncryptedVolume + ?Sized>(volume: &V, path: &str, expected: &[u8]) {
    match volume.load_whole_file(path, None) {
        Ok(actual) => assert_bytes_equal(&actual, expected, path),
        Err(e) => panic!("{path}: could not load volume file: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryVolume;

    #[test]
    fn test_equal_passes() {
        assert_bytes_equal(b"abc", b"abc", "same");
    }

    #[test]
    #[should_panic(expected = "content mismatch at byte 1")]
    fn test_reports_first_difference() {
        assert_bytes_equal(b"abc", b"axc", "diff");
    }

    #[test]
    #[should_panic(expected = "size mismatch")]
    fn test_reports_size() {
        assert_bytes_equal(b"ab", b"abc", "short");
    }

    #[test]
    fn test_volume_file() {
        let volume = MemoryVolume::new();
        volume.put_file("/f", b"data");
        assert_volume_file(&volume, "/f", b"data");
    }
}
