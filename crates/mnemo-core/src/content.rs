//! Content normalisation and fingerprinting.
//!
//! Shared by the metadata store's content-hash index (C3) and the duplicate detector's
//! fast path (C6). The fingerprint is a deterministic hash of `normalize(content)`: NFC
//! form, trimmed, with runs of whitespace collapsed to a single space.

use unicode_normalization::UnicodeNormalization;

pub const MAX_CONTENT_LEN: usize = 64 * 1024;

/// NFC-normalise, trim, and collapse whitespace runs.
pub fn normalize(raw: &str) -> String {
    let nfc: String = raw.nfc().collect();
    let mut out = String::with_capacity(nfc.len());
    let mut last_was_space = false;
    for ch in nfc.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Deterministic fingerprint of normalised content, hex-encoded.
pub fn fingerprint(normalised: &str) -> String {
    blake3::hash(normalised.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(normalize("  hello   world\n\n"), "hello world");
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(&normalize("hello   world"));
        let b = fingerprint(&normalize("hello world"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_different_content() {
        let a = fingerprint(&normalize("hello world"));
        let b = fingerprint(&normalize("goodbye world"));
        assert_ne!(a, b);
    }
}
