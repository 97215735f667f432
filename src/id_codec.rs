//! Path & ID Codec (C1): opaque recording identifiers, service-reference
//! validation, cache-key derivation and filesystem path confinement.

use std::path::{Component, Path, PathBuf};

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::cache::VOD_CACHE_VERSION;
use crate::error::AppError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::URL_SAFE_NO_PAD;

static SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(init\.mp4|seg_.+\.(ts|m4s|mp4))$").expect("valid regex"));

static ID_ALPHABET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

/// A colon-delimited identifier for a recording, ending in an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef(String);

impl ServiceRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trailing absolute filesystem path carried by the reference.
    pub fn file_path(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ServiceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates a raw service reference string per §3's invariants: valid UTF-8
/// (guaranteed by `&str`), no control characters, no `\`, `?`, `#`, no `..`
/// segments, and a trailing absolute filesystem path.
pub fn validate_ref(raw: &str) -> Result<ServiceRef, AppError> {
    if raw.is_empty() {
        return Err(AppError::InvalidInput("empty service reference".into()));
    }
    if raw.chars().any(|c| c.is_control()) {
        return Err(AppError::InvalidInput(
            "service reference contains control characters".into(),
        ));
    }
    for forbidden in ['\\', '?', '#'] {
        if raw.contains(forbidden) {
            return Err(AppError::InvalidInput(format!(
                "service reference contains forbidden character '{forbidden}'"
            )));
        }
    }
    let path_part = raw.rsplit(':').next().unwrap_or(raw);
    if !path_part.starts_with('/') {
        return Err(AppError::InvalidInput(
            "service reference must end with an absolute path".into(),
        ));
    }
    if Path::new(path_part)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(AppError::InvalidInput(
            "service reference path may not contain '..' segments".into(),
        ));
    }
    Ok(ServiceRef(raw.to_string()))
}

/// URL-safe base64 (no padding) of the trimmed `ServiceRef` bytes.
pub fn encode_id(service_ref: &ServiceRef) -> String {
    B64.encode(service_ref.as_str().trim().as_bytes())
}

/// Decodes and revalidates a recording id, returning `None` for any
/// malformed input per property 2 of §8: length outside 16..=1024, a
/// non-alphabet byte, bytes that don't decode to UTF-8, or a decoded
/// reference that fails `validate_ref`.
pub fn decode_id(id: &str) -> Option<ServiceRef> {
    if id.len() < 16 || id.len() > 1024 {
        return None;
    }
    if !ID_ALPHABET_RE.is_match(id) {
        return None;
    }
    let bytes = B64.decode(id).ok()?;
    let raw = String::from_utf8(bytes).ok()?;
    validate_ref(&raw).ok()
}

/// Hex SHA-256 over the trimmed service reference, salted with the cache
/// version so bumping `VOD_CACHE_VERSION` invalidates prior artifacts
/// without deleting them.
pub fn cache_key(service_ref: &ServiceRef) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{VOD_CACHE_VERSION}:{}", service_ref.as_str().trim()));
    hex::encode(hasher.finalize())
}

/// Hex SHA-1 over the trimmed service reference, salted the same way, used
/// for the flat MP4 cache namespace (`dataDir/vod-cache/<sha1hex>.mp4`).
pub fn mp4_cache_key(service_ref: &ServiceRef) -> String {
    use sha1::Sha1;
    let mut hasher = Sha1::new();
    hasher.update(format!("{VOD_CACHE_VERSION}:{}", service_ref.as_str().trim()));
    hex::encode(hasher.finalize())
}

/// `hlsRoot/recordings/<cacheKey>` for HLS artifacts.
pub fn hls_cache_dir(hls_recordings_root: &Path, service_ref: &ServiceRef) -> PathBuf {
    hls_recordings_root.join(cache_key(service_ref))
}

/// `dataDir/vod-cache/<sha1hex>.mp4` for the direct-MP4 artifact.
pub fn mp4_cache_path(mp4_cache_root: &Path, service_ref: &ServiceRef) -> PathBuf {
    mp4_cache_root.join(format!("{}.mp4", mp4_cache_key(service_ref)))
}

/// Resolves `candidate` (relative or absolute) against `root`, following
/// symlinks on both sides, and verifies the resolved path is `root` itself or
/// strictly below it. Absolute candidates and candidates containing a
/// backslash are rejected outright since this path is meant to stay inside a
/// single cache root.
pub fn confine(root: &Path, candidate: &str) -> Result<PathBuf, AppError> {
    if candidate.contains('\\') {
        return Err(AppError::InvalidInput(
            "path escapes cache root (backslash)".into(),
        ));
    }
    if Path::new(candidate).is_absolute() {
        return Err(AppError::InvalidInput(
            "path escapes cache root (absolute path)".into(),
        ));
    }
    if Path::new(candidate)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(AppError::InvalidInput(
            "path escapes cache root ('..' segment)".into(),
        ));
    }
    let joined = root.join(candidate);
    let resolved_root = resolve_existing_or_self(root)?;
    let resolved_target = resolve_existing_or_self(&joined)?;
    if resolved_target == resolved_root || resolved_target.starts_with(&resolved_root) {
        Ok(joined)
    } else {
        Err(AppError::InvalidInput("path escapes cache root".into()))
    }
}

/// Resolves symlinks on `path`, walking up to the nearest existing ancestor
/// when the tail doesn't exist yet (e.g. a not-yet-created tmp file) and
/// re-appending the non-existent suffix.
fn resolve_existing_or_self(path: &Path) -> Result<PathBuf, AppError> {
    let mut existing = path.to_path_buf();
    let mut suffix: Vec<std::ffi::OsString> = Vec::new();
    loop {
        match std::fs::canonicalize(&existing) {
            Ok(mut resolved) => {
                for part in suffix.into_iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(_) => {
                let Some(parent) = existing.parent() else {
                    return Ok(path.to_path_buf());
                };
                if let Some(name) = existing.file_name() {
                    suffix.push(name.to_os_string());
                }
                existing = parent.to_path_buf();
            }
        }
    }
}

/// Segment filename allow-list (§4.1, property 7): `init.mp4` or
/// `seg_*.{ts,m4s,mp4}`, case-sensitive, no partial matches.
pub fn is_allowed_segment_name(name: &str) -> bool {
    SEGMENT_RE.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ref() -> &'static str {
        "1:0:1:445D:453:1:C00000:0:0:0:/media/hdd/movie/orf1.ts"
    }

    #[test]
    fn round_trip_law_holds_for_valid_refs() {
        let r = validate_ref(sample_ref()).unwrap();
        let id = encode_id(&r);
        let decoded = decode_id(&id).expect("decode succeeds");
        assert_eq!(decoded, r);
    }

    #[test]
    fn decode_rejects_bad_length() {
        assert!(decode_id("short").is_none());
        let long = "a".repeat(1025);
        assert!(decode_id(&long).is_none());
    }

    #[test]
    fn decode_rejects_non_alphabet_bytes() {
        assert!(decode_id("not-base64!!!!!!").is_none());
    }

    #[test]
    fn decode_rejects_non_utf8_after_decoding() {
        // Bytes 0xff 0xfe are not valid UTF-8; base64url-encode them.
        let id = B64.encode([0xffu8, 0xfe, 0xfd, 0xfc, 0xfb, 0xfa, 0xf9, 0xf8, 0xf7, 0xf6]);
        assert!(decode_id(&id).is_none());
    }

    #[test]
    fn decode_rejects_ref_failing_validation() {
        let id = B64.encode(b"no-colon-no-path");
        assert!(decode_id(&id).is_none());
    }

    #[test]
    fn validate_ref_rejects_parent_dir_segments() {
        assert!(validate_ref("1:0:1:0:0:0:0:0:0:/media/hdd/../etc/passwd").is_err());
    }

    #[test]
    fn validate_ref_rejects_control_characters() {
        assert!(validate_ref("1:0:1:0:0:0:0:0:0:/media/hdd/foo\n.ts").is_err());
    }

    #[test]
    fn cache_key_is_deterministic_and_stable_width() {
        let r = validate_ref(sample_ref()).unwrap();
        let k1 = cache_key(&r);
        let k2 = cache_key(&r);
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn segment_allow_list_matches_property_7() {
        assert!(is_allowed_segment_name("init.mp4"));
        assert!(is_allowed_segment_name("seg_00001.m4s"));
        assert!(is_allowed_segment_name("seg_00001.ts"));
        assert!(is_allowed_segment_name("seg_00001.mp4"));
        assert!(!is_allowed_segment_name("../evil.ts"));
        assert!(!is_allowed_segment_name("seg_.ts"));
        assert!(!is_allowed_segment_name("SEG_1.ts"));
        assert!(!is_allowed_segment_name("index.m3u8"));
    }

    #[test]
    fn confine_rejects_escape_attempts() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(confine(tmp.path(), "seg_1.ts").is_ok());
        assert!(confine(tmp.path(), "../escape.ts").is_err());
        assert!(confine(tmp.path(), "/etc/passwd").is_err());
        assert!(confine(tmp.path(), "a\\b").is_err());
    }

    #[test]
    fn confine_follows_symlinked_root() {
        let real_root = tempfile::tempdir().unwrap();
        let link_dir = tempfile::tempdir().unwrap();
        let link_path = link_dir.path().join("link");
        #[cfg(unix)]
        std::os::unix::fs::symlink(real_root.path(), &link_path).unwrap();
        #[cfg(unix)]
        {
            let resolved = confine(&link_path, "seg_1.ts").unwrap();
            assert!(resolved.starts_with(&link_path));
        }
    }
}
