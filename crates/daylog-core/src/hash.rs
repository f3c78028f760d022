//! Content fingerprints for the version chain.
//!
//! The digest is 32-bit FNV-1a over the UTF-16 code units of the text,
//! rendered as unpadded lowercase hex. It is a change detector, not a
//! security primitive. Digests already stored by the web client use the same
//! function, so records written there keep their identity here.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Digest of the empty string; the baseline `contentHash` of every fresh record.
pub const EMPTY_CONTENT_HASH: &str = "811c9dc5";

/// Hash log content into its fingerprint.
///
/// # Examples
///
/// ```
/// use daylog_core::hash::{content_hash, EMPTY_CONTENT_HASH};
///
/// assert_eq!(content_hash(""), EMPTY_CONTENT_HASH);
/// assert_ne!(content_hash("hello"), content_hash("Hello"));
/// ```
#[must_use]
pub fn content_hash(content: &str) -> String {
    let digest = content
        .encode_utf16()
        .fold(FNV_OFFSET_BASIS, |hash, unit| {
            (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
        });
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_hash() {
        assert_eq!(content_hash("Hello, World!"), content_hash("Hello, World!"));
    }

    #[test]
    fn empty_string_has_well_known_digest() {
        assert_eq!(content_hash(""), EMPTY_CONTENT_HASH);
    }

    #[test]
    fn matches_reference_fnv1a_vectors() {
        assert_eq!(content_hash("a"), "e40c292c");
        assert_eq!(content_hash("foobar"), "bf9cf968");
    }

    #[test]
    fn detects_small_differences() {
        let pairs = [
            ("Hello, World!", "Hello, World!!"),
            ("Hello World", "Hello  World"),
            ("Line1\nLine2", "Line1\n\nLine2"),
            ("hello", "Hello"),
            ("trailing", "trailing "),
            ("crlf\r\n", "crlf\n"),
        ];
        for (left, right) in pairs {
            assert_ne!(content_hash(left), content_hash(right), "{left:?} vs {right:?}");
        }
    }

    #[test]
    fn output_is_lowercase_hex() {
        for content in ["Test content", "[09:00] + 작업", "😀 👍 🎉", "!@#$%^&*()"] {
            let hash = content_hash(content);
            assert!(!hash.is_empty());
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn handles_long_text() {
        let content = "A".repeat(10_000);
        assert_eq!(content_hash(&content), content_hash(&content));
    }
}
