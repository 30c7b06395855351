//! Cache keys for resize requests.
//!
//! A fingerprint identifies the *logical* result of a resize: the same
//! upload resized to the same dimensions always maps to the same key, across
//! process restarts. Keys double as stored filenames, so they are fixed
//! length and filesystem safe.
//!
//! ## Key fields
//!
//! - source filename
//! - requested width and height, as decimal strings
//! - declared format name
//! - SHA-256 of the uploaded bytes
//!
//! The content hash matters: without it, two different pictures uploaded as
//! `photo.jpg` at the same size would share one cached result. Requested
//! dimensions are part of the key too, so every size gets its own entry.
//!
//! Fields are joined with NUL, which never appears in any of them, behind a
//! scheme tag. Bump [`KEY_SCHEME`] to invalidate every existing key when the
//! field set changes.

use crate::types::{DeclaredFormat, ResizeRequest};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version tag hashed ahead of the fields.
const KEY_SCHEME: &[u8] = b"resize-v1";

/// Number of digest bytes kept (128 bits).
const FINGERPRINT_BYTES: usize = 16;

/// Field separator in the canonical join.
const SEPARATOR: &[u8] = b"\0";

/// A 128-bit request digest, rendered as 32 lower-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity fields of a resize request, borrowed.
#[derive(Debug, Clone, Copy)]
pub struct FingerprintInput<'a> {
    pub source_name: &'a str,
    pub width: &'a str,
    pub height: &'a str,
    pub format: &'a str,
    pub content_hash: &'a str,
}

/// SHA-256 of the uploaded bytes, returned as a hex string.
pub fn hash_content(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Derive the fingerprint for a set of identity fields.
pub fn fingerprint(input: FingerprintInput<'_>) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(KEY_SCHEME);
    for field in [
        input.source_name,
        input.width,
        input.height,
        input.format,
        input.content_hash,
    ] {
        hasher.update(SEPARATOR);
        hasher.update(field.as_bytes());
    }

    let digest = hasher.finalize();
    Fingerprint(
        digest[..FINGERPRINT_BYTES]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect(),
    )
}

/// Fingerprint a full request, hashing its content on the way.
pub fn fingerprint_request(request: &ResizeRequest) -> Fingerprint {
    fingerprint_parts(
        &request.source_name,
        request.width,
        request.height,
        request.format,
        &hash_content(&request.content),
    )
}

fn fingerprint_parts(
    source_name: &str,
    width: u32,
    height: u32,
    format: DeclaredFormat,
    content_hash: &str,
) -> Fingerprint {
    fingerprint(FingerprintInput {
        source_name,
        width: &width.to_string(),
        height: &height.to_string(),
        format: format.name(),
        content_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(name: &'a str, w: &'a str, h: &'a str, fmt: &'a str) -> FingerprintInput<'a> {
        FingerprintInput {
            source_name: name,
            width: w,
            height: h,
            format: fmt,
            content_hash: "c0ffee",
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(input("cat.jpg", "100", "0", "jpeg"));
        let b = fingerprint(input("cat.jpg", "100", "0", "jpeg"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_128_bit_hex() {
        let f = fingerprint(input("cat.jpg", "100", "0", "jpeg"));
        assert_eq!(f.as_str().len(), 32);
        assert!(
            f.as_str()
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        );
    }

    #[test]
    fn fingerprint_is_stable_across_runs() {
        // Pinned value: a change here invalidates every stored file
        let f = fingerprint(input("cat.jpg", "100", "0", "jpeg"));
        assert_eq!(f.as_str(), "05b073952263a2804687b4878ab4e076");
    }

    #[test]
    fn fingerprint_varies_with_each_field() {
        let base = fingerprint(input("cat.jpg", "100", "0", "jpeg"));
        assert_ne!(base, fingerprint(input("dog.jpg", "100", "0", "jpeg")));
        assert_ne!(base, fingerprint(input("cat.jpg", "101", "0", "jpeg")));
        assert_ne!(base, fingerprint(input("cat.jpg", "100", "1", "jpeg")));
        assert_ne!(base, fingerprint(input("cat.jpg", "100", "0", "png")));

        let other_content = FingerprintInput {
            content_hash: "decaf",
            ..input("cat.jpg", "100", "0", "jpeg")
        };
        assert_ne!(base, fingerprint(other_content));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(
            fingerprint(input("ab", "c", "0", "png")),
            fingerprint(input("a", "bc", "0", "png"))
        );
    }

    #[test]
    fn request_fingerprint_includes_content() {
        let mut request = ResizeRequest {
            source_name: "photo.jpg".into(),
            width: 100,
            height: 0,
            format: DeclaredFormat::Jpeg,
            content: b"first upload".to_vec(),
        };
        let first = fingerprint_request(&request);
        request.content = b"second upload".to_vec();
        assert_ne!(first, fingerprint_request(&request));
    }

    #[test]
    fn hash_content_is_sha256_hex() {
        let h = hash_content(b"hello world");
        assert_eq!(h.len(), 64);
        assert_eq!(h, hash_content(b"hello world"));
        assert_ne!(h, hash_content(b"hello world!"));
    }
}
