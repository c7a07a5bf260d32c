//! File-system-safe collection name encoding
//!
//! Collection names may contain any codepoint, so directory-mode output
//! percent-encodes every byte outside the unreserved set (alphanumerics and
//! `-_.~`). The path separator falls outside that set and is therefore
//! always encoded. Encoding is symmetric; metadata files additionally store
//! the original name, so decoding is only needed for paths, never for the
//! wire.
//!
//! Escaped names longer than 238 bytes would overflow common 255-byte file
//! name limits once the `.metadata.json.gz` suffix is added. Those are
//! truncated to a 208-byte stem, marked with a literal `%24`, and made
//! unique with a base64url-encoded SHA-1 of the original name.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha1::{Digest, Sha1};

use super::errors::{CatalogError, CatalogResult};

/// Longest escaped stem that still fits beside the longest file suffix.
pub const MAX_ESCAPED_LEN: usize = 238;

/// Stem length kept when a name is truncated.
const TRUNCATED_STEM_LEN: usize = 208;

/// Marker between a truncated stem and its hash suffix.
const HASH_MARKER: &str = "%24";

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Percent-escapes a collection name for use as a file name stem.
pub fn escape_collection_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name.as_bytes() {
        if is_unreserved(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

/// Decodes a percent-escaped stem back to the original name.
pub fn unescape_collection_name(escaped: &str) -> CatalogResult<String> {
    let bytes = unescape_bytes(escaped)?;
    String::from_utf8(bytes)
        .map_err(|_| CatalogError::invalid_escape(escaped, "not valid UTF-8"))
}

/// Decodes a percent-escaped stem to raw bytes.
///
/// Truncated stems decode to a byte prefix of the original name, which may
/// end inside a multi-byte character; callers that need a `String` go
/// through [`unescape_collection_name`].
pub fn unescape_bytes(escaped: &str) -> CatalogResult<Vec<u8>> {
    let raw = escaped.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            if i + 2 >= raw.len() {
                return Err(CatalogError::invalid_escape(
                    escaped,
                    "truncated percent escape",
                ));
            }
            let hi = hex_val(raw[i + 1]);
            let lo = hex_val(raw[i + 2]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                _ => {
                    return Err(CatalogError::invalid_escape(escaped, "invalid hex digits"))
                }
            }
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Escapes a collection name into a file stem, truncating and hashing when
/// the escaped form exceeds [`MAX_ESCAPED_LEN`].
pub fn collection_file_stem(name: &str) -> String {
    let escaped = escape_collection_name(name);
    if escaped.len() <= MAX_ESCAPED_LEN {
        return escaped;
    }

    // Back off so the cut never lands inside a %XX triple; the decoded stem
    // must stay a clean byte prefix of the original name.
    let mut cut = TRUNCATED_STEM_LEN;
    for probe in (cut.saturating_sub(2)..cut).rev() {
        if escaped.as_bytes()[probe] == b'%' {
            cut = probe;
            break;
        }
    }
    let stem = &escaped[..cut];

    let digest = Sha1::digest(name.as_bytes());
    let hash = URL_SAFE_NO_PAD.encode(digest);

    format!("{}{}{}", stem, HASH_MARKER, hash)
}

/// Length of a base64url-encoded SHA-1 digest without padding.
const HASH_LEN: usize = 27;

/// Splits a truncated stem into its escaped prefix and hash suffix.
///
/// Returns `None` for stems short enough to have escaped whole. Detection
/// is structural (length plus trailing marker); callers resolving real
/// collection names always prefer the metadata file's `collectionName`,
/// which is authoritative either way.
pub fn truncated_hash_suffix(stem: &str) -> Option<(&str, &str)> {
    // The cut backs off at most two bytes from the nominal stem length
    let min_len = TRUNCATED_STEM_LEN - 2 + HASH_MARKER.len() + HASH_LEN;
    if stem.len() < min_len || stem.len() > MAX_ESCAPED_LEN {
        return None;
    }
    let marker_at = stem.len().checked_sub(HASH_LEN + HASH_MARKER.len())?;
    if &stem[marker_at..marker_at + HASH_MARKER.len()] == HASH_MARKER {
        Some((&stem[..marker_at], &stem[marker_at + HASH_MARKER.len()..]))
    } else {
        None
    }
}

/// Returns the base64url-encoded SHA-1 of a collection name.
pub fn name_hash(name: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha1::digest(name.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_unchanged() {
        assert_eq!(escape_collection_name("users"), "users");
        assert_eq!(escape_collection_name("a-b_c.d~e"), "a-b_c.d~e");
    }

    #[test]
    fn test_separator_and_specials_escaped() {
        assert_eq!(escape_collection_name("a/b"), "a%2Fb");
        assert_eq!(escape_collection_name("a b$"), "a%20b%24");
        assert_eq!(escape_collection_name("a\\b"), "a%5Cb");
    }

    #[test]
    fn test_newlines_escaped() {
        assert_eq!(escape_collection_name("a\nb"), "a%0Ab");
        assert_eq!(escape_collection_name("\r\n"), "%0D%0A");
        // A name made entirely of newlines still encodes and decodes
        let name = "\n\n\n";
        let escaped = escape_collection_name(name);
        assert_eq!(unescape_collection_name(&escaped).unwrap(), name);
    }

    #[test]
    fn test_unicode_roundtrip() {
        for name in ["caf\u{e9}", "\u{65e5}\u{672c}\u{8a9e}", "a\u{0301}union", "\u{1f4a5}coll"] {
            let escaped = escape_collection_name(name);
            assert!(escaped.bytes().all(|b| is_unreserved(b) || b == b'%'));
            assert_eq!(unescape_collection_name(&escaped).unwrap(), name);
        }
    }

    #[test]
    fn test_unescape_rejects_bad_input() {
        assert!(unescape_collection_name("abc%").is_err());
        assert!(unescape_collection_name("abc%2").is_err());
        assert!(unescape_collection_name("abc%zz").is_err());
    }

    #[test]
    fn test_short_name_stem_is_escaped_name() {
        let stem = collection_file_stem("orders");
        assert_eq!(stem, "orders");
        assert!(truncated_hash_suffix(&stem).is_none());
    }

    #[test]
    fn test_long_name_truncated_with_hash() {
        let name = "x".repeat(400);
        let stem = collection_file_stem(&name);

        assert!(stem.len() <= MAX_ESCAPED_LEN);
        let (prefix, hash) = truncated_hash_suffix(&stem).unwrap();
        assert_eq!(prefix, "x".repeat(208));
        assert_eq!(hash, name_hash(&name));

        // The decoded prefix is a byte prefix of the original
        let decoded = unescape_bytes(prefix).unwrap();
        assert_eq!(&decoded[..], &name.as_bytes()[..decoded.len()]);
    }

    #[test]
    fn test_truncation_never_splits_percent_triple() {
        // Every byte of this name escapes to three characters, so a blind
        // 208-byte cut would land mid-triple two times out of three.
        let name = "/".repeat(300);
        let stem = collection_file_stem(&name);
        let (prefix, _) = truncated_hash_suffix(&stem).unwrap();

        assert!(prefix.len() <= 208);
        let decoded = unescape_bytes(prefix).unwrap();
        assert_eq!(&decoded[..], &name.as_bytes()[..decoded.len()]);
    }

    #[test]
    fn test_distinct_long_names_get_distinct_stems() {
        let base = "y".repeat(300);
        let a = format!("{}-alpha", base);
        let b = format!("{}-beta", base);
        assert_ne!(collection_file_stem(&a), collection_file_stem(&b));
    }

    #[test]
    fn test_hash_is_stable() {
        // Pinned so dumps stay readable across releases
        assert_eq!(name_hash("abc"), "qZk-NkcGgWq6PiVxeFDCbJzQ2J0");
    }
}
