//! LCS-based unified diff engine (§4.6): hunk grouping, per-file and
//! aggregate summaries, and optional moved-file detection.

use serde::{Deserialize, Serialize};

const DEFAULT_CONTEXT_LINES: usize = 3;
/// Minimum LCS similarity ratio for two files to be considered a move
/// rather than an independent add+delete pair.
const MOVE_SIMILARITY_THRESHOLD: f64 = 0.80;

/// Longest-common-subsequence length table, `table[i][j]` = LCS length of
/// `a[..i]` and `b[..j]`. Shared with `store::compute_line_delta`.
pub(crate) fn lcs_table(a: &[&str], b: &[&str]) -> Vec<Vec<u32>> {
    let (m, n) = (a.len(), b.len());
    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if a[i - 1] == b[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }
    table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineTag {
    Context,
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffLine {
    pub tag: LineTag,
    pub old_line: Option<usize>,
    pub new_line: Option<usize>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<DiffLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub lines_added: usize,
    pub lines_deleted: usize,
    pub lines_modified: usize,
    pub hunks: Vec<Hunk>,
}

/// Opcode over a contiguous run, expressed in terms of source indices.
#[derive(Debug, Clone, Copy)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

fn opcodes(old_lines: &[&str], new_lines: &[&str]) -> Vec<Op> {
    let table = lcs_table(old_lines, new_lines);
    let (mut i, mut j) = (old_lines.len(), new_lines.len());
    let mut rev = Vec::new();
    while i > 0 && j > 0 {
        if old_lines[i - 1] == new_lines[j - 1] {
            rev.push(Op::Equal(i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            rev.push(Op::Delete(i - 1));
            i -= 1;
        } else {
            rev.push(Op::Insert(j - 1));
            j -= 1;
        }
    }
    while i > 0 {
        rev.push(Op::Delete(i - 1));
        i -= 1;
    }
    while j > 0 {
        rev.push(Op::Insert(j - 1));
        j -= 1;
    }
    rev.reverse();
    rev
}

/// Unified diff of one file's content, grouped into hunks with
/// `context_lines` lines of surrounding context on each side (default 3).
pub fn diff_file(path: &str, old_content: &str, new_content: &str, context_lines: Option<usize>) -> FileDiff {
    let context = context_lines.unwrap_or(DEFAULT_CONTEXT_LINES);
    let old_lines: Vec<&str> = old_content.lines().collect();
    let new_lines: Vec<&str> = new_content.lines().collect();
    let ops = opcodes(&old_lines, &new_lines);

    let mut lines_added = 0;
    let mut lines_deleted = 0;
    for op in &ops {
        match op {
            Op::Insert(_) => lines_added += 1,
            Op::Delete(_) => lines_deleted += 1,
            Op::Equal(_, _) => {}
        }
    }
    let lines_modified = lines_added.min(lines_deleted);

    let hunks = group_into_hunks(&ops, &old_lines, &new_lines, context);

    FileDiff {
        path: path.to_string(),
        lines_added,
        lines_deleted,
        lines_modified,
        hunks,
    }
}

/// Adjacent change clusters are merged into one hunk when the gap of
/// context between them is `<= 2*context_lines` (so their context
/// windows would otherwise overlap).
fn group_into_hunks(ops: &[Op], old_lines: &[&str], new_lines: &[&str], context: usize) -> Vec<Hunk> {
    let change_indices: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Equal(_, _)))
        .map(|(idx, _)| idx)
        .collect();
    if change_indices.is_empty() {
        return Vec::new();
    }

    let mut clusters: Vec<(usize, usize)> = Vec::new();
    let mut start = change_indices[0];
    let mut prev = change_indices[0];
    for &idx in &change_indices[1..] {
        if idx - prev <= 2 * context + 1 {
            prev = idx;
        } else {
            clusters.push((start, prev));
            start = idx;
            prev = idx;
        }
    }
    clusters.push((start, prev));

    clusters
        .into_iter()
        .map(|(lo, hi)| {
            let window_lo = lo.saturating_sub(context);
            let window_hi = (hi + context + 1).min(ops.len());
            build_hunk(&ops[window_lo..window_hi], old_lines, new_lines)
        })
        .collect()
}

fn build_hunk(window: &[Op], old_lines: &[&str], new_lines: &[&str]) -> Hunk {
    let mut lines = Vec::new();
    let mut old_start = None;
    let mut new_start = None;
    let mut old_len = 0;
    let mut new_len = 0;

    for op in window {
        match *op {
            Op::Equal(oi, ni) => {
                old_start.get_or_insert(oi);
                new_start.get_or_insert(ni);
                old_len += 1;
                new_len += 1;
                lines.push(DiffLine {
                    tag: LineTag::Context,
                    old_line: Some(oi + 1),
                    new_line: Some(ni + 1),
                    content: old_lines[oi].to_string(),
                });
            }
            Op::Delete(oi) => {
                old_start.get_or_insert(oi);
                old_len += 1;
                lines.push(DiffLine {
                    tag: LineTag::Removed,
                    old_line: Some(oi + 1),
                    new_line: None,
                    content: old_lines[oi].to_string(),
                });
            }
            Op::Insert(ni) => {
                new_start.get_or_insert(ni);
                new_len += 1;
                lines.push(DiffLine {
                    tag: LineTag::Added,
                    old_line: None,
                    new_line: Some(ni + 1),
                    content: new_lines[ni].to_string(),
                });
            }
        }
    }

    Hunk {
        old_start: old_start.map(|v| v + 1).unwrap_or(0),
        old_len,
        new_start: new_start.map(|v| v + 1).unwrap_or(0),
        new_len,
        lines,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub files_changed: usize,
    pub total_lines_added: usize,
    pub total_lines_deleted: usize,
    pub total_lines_modified: usize,
    pub files: Vec<FileDiff>,
    pub moves: Vec<MovedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovedFile {
    pub from_path: String,
    pub to_path: String,
    pub similarity: f64,
}

/// Diff every file present in either `old_files` or `new_files`, keyed by
/// path. `tags.json` is skipped: tag metadata is compared separately from
/// logic content. When `detect_moves` is set, files that only appear on
/// one side are checked pairwise for >= 80% LCS similarity and reported
/// as moves instead of independent add/delete entries.
pub fn compare_file_sets(
    old_files: &[(String, String)],
    new_files: &[(String, String)],
    detect_moves: bool,
) -> ComparisonSummary {
    use std::collections::BTreeMap;

    let is_tags_metadata = |p: &str| p.ends_with("tags.json") || p.contains("/tags.json");

    let old_map: BTreeMap<&str, &str> = old_files
        .iter()
        .filter(|(p, _)| !is_tags_metadata(p))
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    let new_map: BTreeMap<&str, &str> = new_files
        .iter()
        .filter(|(p, _)| !is_tags_metadata(p))
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    let mut all_paths: Vec<&str> = old_map.keys().chain(new_map.keys()).copied().collect();
    all_paths.sort_unstable();
    all_paths.dedup();

    let mut removed_only: Vec<&str> = Vec::new();
    let mut added_only: Vec<&str> = Vec::new();
    let mut files = Vec::new();

    for path in all_paths {
        match (old_map.get(path), new_map.get(path)) {
            (Some(old), Some(new)) => {
                if old != new {
                    files.push(diff_file(path, old, new, None));
                }
            }
            (Some(_), None) => removed_only.push(path),
            (None, Some(_)) => added_only.push(path),
            (None, None) => unreachable!(),
        }
    }

    let mut moves = Vec::new();
    if detect_moves {
        let mut matched_added: Vec<bool> = vec![false; added_only.len()];
        for old_path in &removed_only {
            let old_content = old_map[old_path];
            let mut best: Option<(usize, f64)> = None;
            for (idx, new_path) in added_only.iter().enumerate() {
                if matched_added[idx] {
                    continue;
                }
                let new_content = new_map[new_path];
                let sim = similarity_ratio(old_content, new_content);
                if sim >= MOVE_SIMILARITY_THRESHOLD && best.map(|(_, s)| sim > s).unwrap_or(true) {
                    best = Some((idx, sim));
                }
            }
            if let Some((idx, sim)) = best {
                matched_added[idx] = true;
                moves.push(MovedFile {
                    from_path: old_path.to_string(),
                    to_path: added_only[idx].to_string(),
                    similarity: sim,
                });
            } else {
                files.push(diff_file(old_path, old_content, "", None));
            }
        }
        for (idx, new_path) in added_only.iter().enumerate() {
            if !matched_added[idx] {
                files.push(diff_file(new_path, "", new_map[new_path], None));
            }
        }
    } else {
        for path in &removed_only {
            files.push(diff_file(path, old_map[path], "", None));
        }
        for path in &added_only {
            files.push(diff_file(path, "", new_map[path], None));
        }
    }

    let total_lines_added = files.iter().map(|f| f.lines_added).sum();
    let total_lines_deleted = files.iter().map(|f| f.lines_deleted).sum();
    let total_lines_modified = files.iter().map(|f| f.lines_modified).sum();

    ComparisonSummary {
        files_changed: files.len(),
        total_lines_added,
        total_lines_deleted,
        total_lines_modified,
        files,
        moves,
    }
}

fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a_lines: Vec<&str> = a.lines().collect();
    let b_lines: Vec<&str> = b.lines().collect();
    if a_lines.is_empty() && b_lines.is_empty() {
        return 1.0;
    }
    let table = lcs_table(&a_lines, &b_lines);
    let lcs_len = table[a_lines.len()][b_lines.len()] as f64;
    let denom = a_lines.len().max(b_lines.len()) as f64;
    if denom == 0.0 {
        1.0
    } else {
        lcs_len / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_content_has_no_hunks() {
        let diff = diff_file("a.st", "x\ny\nz", "x\ny\nz", None);
        assert!(diff.hunks.is_empty());
        assert_eq!(diff.lines_added, 0);
        assert_eq!(diff.lines_deleted, 0);
    }

    #[test]
    fn single_line_change_produces_one_hunk() {
        let old = "a\nb\nc\nd\ne";
        let new = "a\nB\nc\nd\ne";
        let diff = diff_file("a.st", old, new, Some(1));
        assert_eq!(diff.hunks.len(), 1);
        assert_eq!(diff.lines_added, 1);
        assert_eq!(diff.lines_deleted, 1);
        assert_eq!(diff.lines_modified, 1);
    }

    #[test]
    fn distant_changes_produce_separate_hunks() {
        let old = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let mut new_lines: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        new_lines[1] = "X".to_string();
        new_lines[18] = "Y".to_string();
        let new = new_lines.join("\n");
        let diff = diff_file("a.st", &old, &new, Some(2));
        assert_eq!(diff.hunks.len(), 2);
    }

    #[test]
    fn tags_json_is_skipped_in_multi_file_comparison() {
        let old_files = vec![("tags.json".to_string(), "{}".to_string())];
        let new_files = vec![("tags.json".to_string(), "{\"a\":1}".to_string())];
        let summary = compare_file_sets(&old_files, &new_files, false);
        assert_eq!(summary.files_changed, 0);
    }

    #[test]
    fn nested_tags_json_is_skipped_too() {
        let old_files = vec![("myproject/tags.json".to_string(), "{}".to_string())];
        let new_files = vec![("myproject/tags.json".to_string(), "{\"a\":1}".to_string())];
        let summary = compare_file_sets(&old_files, &new_files, false);
        assert_eq!(summary.files_changed, 0);
    }

    #[test]
    fn move_is_detected_above_threshold() {
        let body = (0..10).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let old_files = vec![("old/main.st".to_string(), body.clone())];
        let new_files = vec![("new/main.st".to_string(), body)];
        let summary = compare_file_sets(&old_files, &new_files, true);
        assert_eq!(summary.moves.len(), 1);
        assert_eq!(summary.moves[0].from_path, "old/main.st");
        assert_eq!(summary.moves[0].to_path, "new/main.st");
    }
}
