// =============================================================================
// CODEC - image obfuscation
// =============================================================================

/// Magic token that must open every decrypted image.
pub const MAGIC: &str = "80JF34R9S";

/// XOR `data` byte-wise with a repeating `key`. An empty key leaves the
/// data untouched. The transform is its own inverse, so the same call both
/// obfuscates and restores an image.
pub fn transcode(data: &mut [u8], key: &[u8]) {
    if key.is_empty() {
        return;
    }
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % key.len()];
    }
}

/// Check that `text` opens with the magic token and return the record
/// stream after it. `None` means the image must be rejected.
pub fn strip_magic(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let rest = text.strip_prefix(MAGIC)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trips(data: &[u8], key: &[u8]) {
        let mut buf = data.to_vec();
        transcode(&mut buf, key);
        transcode(&mut buf, key);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_empty_key_is_identity() {
        let mut buf = b"80JF34R9S 0 9 5".to_vec();
        transcode(&mut buf, b"");
        assert_eq!(buf, b"80JF34R9S 0 9 5");
    }

    #[test]
    fn test_transcode_is_self_inverse() {
        round_trips(b"80JF34R9S 0 9 5 1 32 2 31", b"k");
        round_trips(b"80JF34R9S 0 9 5 1 32 2 31", b"secret");
        round_trips(b"ab", b"a key longer than the data itself");
        round_trips(b"", b"key");
    }

    #[test]
    fn test_transcode_changes_bytes() {
        let mut buf = b"80JF34R9S".to_vec();
        transcode(&mut buf, b"pw");
        assert_ne!(buf, b"80JF34R9S");
    }

    #[test]
    fn test_strip_magic_accepts_records() {
        assert_eq!(strip_magic("80JF34R9S 0 31"), Some(" 0 31"));
        assert_eq!(strip_magic("  80JF34R9S 0 31"), Some(" 0 31"));
    }

    #[test]
    fn test_strip_magic_accepts_empty_image() {
        assert_eq!(strip_magic("80JF34R9S"), Some(""));
    }

    #[test]
    fn test_strip_magic_rejects_mismatch() {
        assert_eq!(strip_magic("80JF34R9X 0 31"), None);
        assert_eq!(strip_magic("80JF34R9Sx"), None);
        assert_eq!(strip_magic(""), None);
    }
}
