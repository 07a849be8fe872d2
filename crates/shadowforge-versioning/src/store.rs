//! Content-addressed file storage (§4.5): checksums, Brotli compression,
//! line-level deltas, and release bundle pack/unpack.

use std::io::{Read, Write};

use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shadowforge_core::{Error, Result};

const BROTLI_QUALITY: i32 = 6;
const BROTLI_LGWIN: i32 = 22;
/// A delta is only preferred when its serialised form is smaller than this
/// fraction of the original content (§4.5).
const DELTA_PREFERENCE_RATIO: f64 = 0.70;

/// SHA-256 hex digest over raw byte content (§4.5, §4.7).
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compress at Brotli quality 6; keep only if strictly smaller than the
/// original, otherwise store raw. Returns `(bytes, was_compressed)`.
pub fn compress(content: &[u8]) -> (Vec<u8>, bool) {
    let mut out = Vec::new();
    {
        let mut writer =
            brotli::CompressorWriter::new(&mut out, 4096, BROTLI_QUALITY as u32, BROTLI_LGWIN as u32);
        // CompressorWriter::write never fails for an in-memory sink.
        writer.write_all(content).expect("in-memory compression");
    }
    if out.len() < content.len() {
        (out, true)
    } else {
        (content.to_vec(), false)
    }
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut reader = brotli::Decompressor::new(bytes, 4096);
    reader
        .read_to_end(&mut out)
        .map_err(|e| Error::IntegrityError(format!("brotli decompress failed: {e}")))?;
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeltaChangeKind {
    Add,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaChange {
    #[serde(rename = "type")]
    pub kind: DeltaChangeKind,
    pub line: usize,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineDelta {
    #[serde(rename = "type")]
    pub kind: String, // always "line-delta"
    pub changes: Vec<DeltaChange>,
}

/// Produce a line-edit script of add/delete operations turning `base` into
/// `new_content` (§4.5). This is intentionally a simple LCS-backed diff
/// rather than a general Myers/patience algorithm — §9's Open Question
/// notes that files with simultaneous modify-and-move near the same region
/// may not round-trip perfectly under any line-level delta, and a stricter
/// algorithm is left to the implementer; this one preserves the invariant
/// that applying the delta to `base` reproduces `new_content` exactly.
pub fn compute_line_delta(base: &str, new_content: &str) -> LineDelta {
    let old_lines: Vec<&str> = base.lines().collect();
    let new_lines: Vec<&str> = new_content.lines().collect();
    let lcs = crate::diff::lcs_table(&old_lines, &new_lines);

    let mut changes = Vec::new();
    let (mut i, mut j) = (old_lines.len(), new_lines.len());
    let mut rev = Vec::new();
    while i > 0 && j > 0 {
        if old_lines[i - 1] == new_lines[j - 1] {
            i -= 1;
            j -= 1;
        } else if lcs[i - 1][j] >= lcs[i][j - 1] {
            rev.push(DeltaChange {
                kind: DeltaChangeKind::Delete,
                line: i - 1,
                content: None,
            });
            i -= 1;
        } else {
            rev.push(DeltaChange {
                kind: DeltaChangeKind::Add,
                line: j - 1,
                content: Some(new_lines[j - 1].to_string()),
            });
            j -= 1;
        }
    }
    while i > 0 {
        rev.push(DeltaChange {
            kind: DeltaChangeKind::Delete,
            line: i - 1,
            content: None,
        });
        i -= 1;
    }
    while j > 0 {
        rev.push(DeltaChange {
            kind: DeltaChangeKind::Add,
            line: j - 1,
            content: Some(new_lines[j - 1].to_string()),
        });
        j -= 1;
    }
    rev.reverse();
    changes.append(&mut rev);
    LineDelta {
        kind: "line-delta".to_string(),
        changes,
    }
}

/// Re-apply a line delta against its base content to reproduce the new
/// content. Deletes are applied by line content match scanning forward
/// from the last consumed position; adds are inserted at the recorded
/// position.
pub fn apply_line_delta(base: &str, delta: &LineDelta) -> String {
    let mut lines: Vec<String> = base.lines().map(|s| s.to_string()).collect();
    // Apply deletes first, from highest index to lowest, to keep earlier
    // indices valid.
    let mut deletes: Vec<usize> = delta
        .changes
        .iter()
        .filter(|c| c.kind == DeltaChangeKind::Delete)
        .map(|c| c.line)
        .collect();
    deletes.sort_unstable();
    deletes.reverse();
    for idx in deletes {
        if idx < lines.len() {
            lines.remove(idx);
        }
    }
    let mut adds: Vec<(usize, String)> = delta
        .changes
        .iter()
        .filter(|c| c.kind == DeltaChangeKind::Add)
        .map(|c| (c.line, c.content.clone().unwrap_or_default()))
        .collect();
    adds.sort_by_key(|(line, _)| *line);
    for (idx, content) in adds {
        let idx = idx.min(lines.len());
        lines.insert(idx, content);
    }
    lines.join("\n")
}

/// Whether a delta's serialised form is small enough to prefer over
/// storing the full compressed content (§4.5).
pub fn delta_is_preferred(delta: &LineDelta, original: &[u8]) -> bool {
    let serialized = serde_json::to_vec(delta).unwrap_or_default();
    if original.is_empty() {
        return false;
    }
    (serialized.len() as f64) < DELTA_PREFERENCE_RATIO * (original.len() as f64)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFile {
    pub path: String,
    /// Base64-encoded file content.
    pub content: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseBundle {
    pub version: String,
    pub project_id: String,
    pub version_id: String,
    pub release_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub files: Vec<BundleFile>,
}

/// Pack a release bundle as Brotli-compressed JSON (§4.5).
pub fn pack_bundle(bundle: &ReleaseBundle) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(bundle)
        .map_err(|e| Error::ValidationError(format!("bundle serialization failed: {e}")))?;
    let (compressed, _) = compress(&json);
    Ok(compressed)
}

/// Unpack and validate a release bundle, reproducing every file under
/// `dest_root`.
pub fn unpack_bundle(bytes: &[u8], dest_root: &std::path::Path) -> Result<ReleaseBundle> {
    let json = decompress(bytes)?;
    let bundle: ReleaseBundle = serde_json::from_slice(&json)
        .map_err(|e| Error::IntegrityError(format!("malformed release bundle: {e}")))?;
    for file in &bundle.files {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&file.content)
            .map_err(|e| Error::IntegrityError(format!("bad base64 in {}: {e}", file.path)))?;
        let sanitised = sanitise_path(&file.path);
        let target = dest_root.join(&sanitised);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &decoded)?;
    }
    Ok(bundle)
}

/// Strip any parent-directory traversal from a stored path before joining
/// it to a destination root.
fn sanitise_path(path: &str) -> std::path::PathBuf {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect()
}

/// Retention policy: keep the N most recent versions by creation time for
/// a project, returning the storage paths to remove.
pub fn prune_to_retain<'a>(
    versions: &'a [(chrono::DateTime<chrono::Utc>, &'a str)],
    keep_most_recent: usize,
) -> Vec<&'a str> {
    let mut sorted = versions.to_vec();
    sorted.sort_by(|a, b| b.0.cmp(&a.0));
    sorted
        .into_iter()
        .skip(keep_most_recent)
        .map(|(_, path)| path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_decompress_round_trips() {
        let content = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let (compressed, was_compressed) = compress(&content);
        assert!(was_compressed);
        let restored = decompress(&compressed).unwrap();
        assert_eq!(restored, content);
    }

    #[test]
    fn tiny_content_is_kept_raw() {
        let content = b"x";
        let (stored, was_compressed) = compress(content);
        assert!(!was_compressed);
        assert_eq!(stored, content);
    }

    #[test]
    fn line_delta_round_trips() {
        let base = "a\nb\nc\nd";
        let new_content = "a\nB\nc\nd\ne";
        let delta = compute_line_delta(base, new_content);
        let applied = apply_line_delta(base, &delta);
        assert_eq!(applied, new_content);
    }

    #[test]
    fn checksum_is_stable() {
        let a = checksum(b"hello");
        let b = checksum(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn bundle_round_trips_through_a_temp_dir() {
        let bundle = ReleaseBundle {
            version: "v1".into(),
            project_id: "p1".into(),
            version_id: "v1id".into(),
            release_id: "r1".into(),
            created_at: chrono::Utc::now(),
            files: vec![BundleFile {
                path: "main.st".into(),
                content: base64::engine::general_purpose::STANDARD.encode(b"PROGRAM Main END_PROGRAM"),
                size: 24,
            }],
        };
        let packed = pack_bundle(&bundle).unwrap();
        let dir = std::env::temp_dir().join(format!("shadowforge-test-{}", uuid_like()));
        let unpacked = unpack_bundle(&packed, &dir).unwrap();
        assert_eq!(unpacked.files.len(), 1);
        let content = std::fs::read_to_string(dir.join("main.st")).unwrap();
        assert_eq!(content, "PROGRAM Main END_PROGRAM");
        let _ = std::fs::remove_dir_all(&dir);
    }

    fn uuid_like() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }
}
