//! Version, snapshot, and release operations (§4.7, §4.8).

use chrono::Utc;
use shadowforge_core::{
    model::{
        ChangeType, ChangelogEntry, DeployStatus, FileKind, Release, ReleaseStatus, ResourceId,
        Snapshot, SnapshotPromotion, Stage, Version, VersionApproval, VersionFile, VersionStatus,
    },
    Error, Result,
};

use crate::diff::{self, ComparisonSummary};
use crate::store;

/// Input to `create_version`: one file as it exists after the edit being
/// captured.
pub struct NewVersionFile {
    pub path: String,
    pub file_type: FileKind,
    pub content: String,
}

pub struct NewVersionInput {
    pub project_id: ResourceId,
    pub branch_id: ResourceId,
    pub author: String,
    pub message: String,
    pub files: Vec<NewVersionFile>,
    /// Overrides the default of 3 approvals required before release (§4.7
    /// step 7). `None` keeps the default.
    pub approvals_required: Option<u32>,
}

/// Default `Version::approvals_required` when a caller doesn't override it
/// (§4.7 step 7).
pub const DEFAULT_APPROVALS_REQUIRED: u32 = 3;

/// Auto-increment a version label from its parent's, e.g. `v4` -> `v5`.
/// A version with no parent, or a parent whose label doesn't end in a
/// run of digits, starts the chain at `v1`.
fn next_label(parent_label: Option<&str>) -> String {
    match parent_label {
        Some(label) => {
            let digit_start = label
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_ascii_digit())
                .last()
                .map(|(idx, _)| idx);
            match digit_start {
                Some(idx) => {
                    let prefix = &label[..idx];
                    let n: u64 = label[idx..].parse().unwrap_or(0);
                    format!("{prefix}{}", n + 1)
                }
                None => format!("{label}-1"),
            }
        }
        None => "v1".to_string(),
    }
}

/// Capture a new immutable version from a set of files, diffing each file
/// against its counterpart in `parent_files` (by path) to build the
/// per-file change records and a unified-diff preview.
pub fn create_version(
    input: NewVersionInput,
    parent: Option<&Version>,
    parent_files: &[(String, String)],
) -> (Version, Vec<VersionFile>) {
    let now = Utc::now();
    let version_id = ResourceId::new();
    let label = next_label(parent.map(|p| p.label.as_str()));

    let mut version_files = Vec::with_capacity(input.files.len());
    let mut original_size = 0u64;
    let mut compressed_size = 0u64;
    let parent_lookup: std::collections::HashMap<&str, &str> = parent_files
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();

    for file in &input.files {
        let bytes = file.content.as_bytes();
        let sha256 = store::checksum(bytes);
        let (compressed, was_compressed) = store::compress(bytes);
        original_size += bytes.len() as u64;
        compressed_size += compressed.len() as u64;

        let (change_type, diff_preview, lines_added, lines_deleted, is_delta) =
            match parent_lookup.get(file.path.as_str()) {
                None => (ChangeType::Added, None, file.content.lines().count() as u32, 0, false),
                Some(&prev) if prev == file.content => continue,
                Some(&prev) => {
                    let file_diff = diff::diff_file(&file.path, prev, &file.content, None);
                    let delta = store::compute_line_delta(prev, &file.content);
                    let prefers_delta = store::delta_is_preferred(&delta, bytes);
                    let preview: String = file_diff
                        .hunks
                        .iter()
                        .flat_map(|h| h.lines.iter())
                        .take(50)
                        .map(|l| l.content.clone())
                        .collect::<Vec<_>>()
                        .join("\n");
                    (
                        ChangeType::Modified,
                        Some(preview),
                        file_diff.lines_added as u32,
                        file_diff.lines_deleted as u32,
                        prefers_delta,
                    )
                }
            };

        version_files.push(VersionFile {
            version_id,
            path: file.path.clone(),
            file_type: file.file_type,
            change_type,
            lines_added,
            lines_deleted,
            size: bytes.len() as u64,
            sha256,
            storage_path: format!("versions/{version_id}/{}", file.path),
            is_compressed: was_compressed,
            is_delta,
            delta_base_file_id: None,
            diff_preview,
        });
    }

    for (path, _) in parent_files {
        if !input.files.iter().any(|f| &f.path == path) {
            version_files.push(VersionFile {
                version_id,
                path: path.clone(),
                file_type: FileKind::Logic,
                change_type: ChangeType::Deleted,
                lines_added: 0,
                lines_deleted: 0,
                size: 0,
                sha256: String::new(),
                storage_path: String::new(),
                is_compressed: false,
                is_delta: false,
                delta_base_file_id: None,
                diff_preview: None,
            });
        }
    }

    let mut combined = Vec::new();
    for file in &input.files {
        combined.extend_from_slice(file.path.as_bytes());
        combined.extend_from_slice(file.content.as_bytes());
    }
    let combined_checksum = store::checksum(&combined);

    let version = Version {
        id: version_id,
        project_id: input.project_id,
        branch_id: input.branch_id,
        label,
        author: input.author,
        timestamp: now,
        message: input.message,
        status: VersionStatus::Draft,
        checksum: combined_checksum,
        parent_version_id: parent.map(|p| p.id),
        approvals: Vec::new(),
        approvals_required: input.approvals_required.unwrap_or(DEFAULT_APPROVALS_REQUIRED),
        signed: false,
        signed_by: None,
        signed_at: None,
        signature: None,
        original_size,
        compressed_size,
        changelog: vec![ChangelogEntry {
            timestamp: now,
            kind: "created".to_string(),
            detail: "version captured".to_string(),
        }],
    };

    (version, version_files)
}

/// Transition a version's status, rejecting any edge not named by
/// `VersionStatus::can_transition_to` (§4.7, §3 invariants).
pub fn update_version_status(version: &mut Version, next: VersionStatus) -> Result<()> {
    if !version.status.can_transition_to(next) {
        return Err(Error::ValidationError(format!(
            "cannot transition version from {:?} to {:?}",
            version.status, next
        )));
    }
    version.status = next;
    version.changelog.push(ChangelogEntry {
        timestamp: Utc::now(),
        kind: "status-change".to_string(),
        detail: format!("{next:?}"),
    });
    Ok(())
}

/// Sign a version. Re-signing by the same signer is a no-op; signing a
/// version already signed by someone else is a conflict.
pub fn sign_version(version: &mut Version, signer: &str, signature: String) -> Result<()> {
    if version.signed {
        if version.signed_by.as_deref() == Some(signer) {
            return Ok(());
        }
        return Err(Error::ConflictError(format!(
            "version already signed by {}",
            version.signed_by.clone().unwrap_or_default()
        )));
    }
    version.signed = true;
    version.signed_by = Some(signer.to_string());
    version.signed_at = Some(Utc::now());
    version.signature = Some(signature);
    version.changelog.push(ChangelogEntry {
        timestamp: Utc::now(),
        kind: "signed".to_string(),
        detail: signer.to_string(),
    });
    Ok(())
}

/// Record an approval, rejecting a second approval from the same name.
pub fn approve_version(version: &mut Version, approver: &str) -> Result<()> {
    if version.approvals.iter().any(|a| a.name == approver) {
        return Err(Error::ConflictError(format!(
            "{approver} has already approved this version"
        )));
    }
    version.approvals.push(VersionApproval {
        name: approver.to_string(),
        timestamp: Utc::now(),
    });
    version.changelog.push(ChangelogEntry {
        timestamp: Utc::now(),
        kind: "approved".to_string(),
        detail: approver.to_string(),
    });
    Ok(())
}

/// Diff two versions' file content (already loaded by the caller from the
/// content-addressed store).
pub fn compare_versions(
    old_files: &[(String, String)],
    new_files: &[(String, String)],
    detect_moves: bool,
) -> ComparisonSummary {
    diff::compare_file_sets(old_files, new_files, detect_moves)
}

/// Create a named pointer at a version, rejecting a name already in use
/// within the project.
pub fn create_snapshot(
    project_id: ResourceId,
    version_id: ResourceId,
    name: String,
    description: Option<String>,
    tags: Vec<String>,
    created_by: String,
    existing_names: &[String],
) -> Result<Snapshot> {
    if existing_names.iter().any(|n| n == &name) {
        return Err(Error::ConflictError(format!(
            "a snapshot named {name:?} already exists in this project"
        )));
    }
    Ok(Snapshot {
        id: ResourceId::new(),
        project_id,
        version_id,
        name,
        description,
        tags,
        created_by,
        created_at: Utc::now(),
    })
}

fn stage_name_for_rank(rank: u8) -> &'static str {
    match rank {
        0 => "DEV",
        1 => "QA",
        2 => "STAGING",
        3 => "PROD",
        _ => "a later stage",
    }
}

/// Promote a snapshot along the stage order, gating the move on the
/// target stage outranking the source and on safety checks having
/// passed. Promoting into `Staging` or `Prod` auto-mints a `Release` from
/// the snapshot's version, matching the "every production-bound snapshot
/// has a release" invariant.
#[allow(clippy::too_many_arguments)]
pub fn promote_snapshot(
    snapshot: &Snapshot,
    version: &mut Version,
    from_stage: Stage,
    to_stage: Stage,
    promoted_by: String,
    checks_passed: bool,
    notes: Option<String>,
    bundle_path: String,
    bundle_size: u64,
    bundle_checksum: String,
    release_name: String,
    release_version: String,
) -> Result<(SnapshotPromotion, Option<Release>)> {
    let (from_rank, to_rank) = match (from_stage.promotion_rank(), to_stage.promotion_rank()) {
        (Some(f), Some(t)) => (f, t),
        _ => {
            return Err(Error::ValidationError(
                "promotion requires two ranked stages (dev/qa/staging/prod)".to_string(),
            ))
        }
    };
    if to_rank != from_rank + 1 {
        let requires = if to_rank == 0 {
            "no prior stage".to_string()
        } else {
            format!("prior {} promotion", stage_name_for_rank(to_rank - 1))
        };
        return Err(Error::PreconditionFailed(format!(
            "cannot promote from {from_stage:?} to {to_stage:?}: requires {requires}"
        )));
    }
    if !checks_passed {
        return Err(Error::PreconditionFailed(
            "safety checks must pass before promotion".to_string(),
        ));
    }

    let promotion = SnapshotPromotion {
        snapshot_id: snapshot.id,
        from_stage,
        to_stage,
        promoted_by: promoted_by.clone(),
        promoted_at: Utc::now(),
        notes,
        checks_passed,
    };

    let release = if matches!(to_stage, Stage::Staging | Stage::Prod) {
        if version.status == VersionStatus::Draft {
            update_version_status(version, VersionStatus::Staged)?;
        }
        Some(Release {
            id: ResourceId::new(),
            project_id: snapshot.project_id,
            snapshot_id: snapshot.id,
            version_id: snapshot.version_id,
            name: release_name,
            version: release_version,
            environment: to_stage,
            bundle_path,
            bundle_size,
            bundle_checksum,
            signed: false,
            signature: String::new(),
            signed_by: promoted_by,
            status: ReleaseStatus::Active,
            linked_deploys: 0,
            last_deployed_at: None,
        })
    } else {
        None
    };

    Ok((promotion, release))
}

/// Move a release's environment forward, validating the same stage-rank
/// ordering as snapshot promotion.
pub fn promote_release(release: &mut Release, to_stage: Stage) -> Result<()> {
    let (from_rank, to_rank) = match (release.environment.promotion_rank(), to_stage.promotion_rank()) {
        (Some(f), Some(t)) => (f, t),
        _ => {
            return Err(Error::ValidationError(
                "release promotion requires two ranked stages".to_string(),
            ))
        }
    };
    if to_rank <= from_rank {
        return Err(Error::PreconditionFailed(format!(
            "cannot promote release from {:?} to {to_stage:?}",
            release.environment
        )));
    }
    release.environment = to_stage;
    Ok(())
}

/// Record that a deploy using this release finished, updating the
/// release's usage bookkeeping (§4.8: "linked_deploys", "last_deployed_at").
pub fn record_release_deployment(release: &mut Release, status: DeployStatus) {
    if status == DeployStatus::Success {
        release.linked_deploys += 1;
        release.last_deployed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_version(status: VersionStatus) -> Version {
        Version {
            id: ResourceId::new(),
            project_id: ResourceId::new(),
            branch_id: ResourceId::new(),
            label: "v1".into(),
            author: "a".into(),
            timestamp: Utc::now(),
            message: "init".into(),
            status,
            checksum: "abc".into(),
            parent_version_id: None,
            approvals: Vec::new(),
            approvals_required: 0,
            signed: false,
            signed_by: None,
            signed_at: None,
            signature: None,
            original_size: 0,
            compressed_size: 0,
            changelog: Vec::new(),
        }
    }

    #[test]
    fn label_increments_trailing_digits() {
        assert_eq!(next_label(None), "v1");
        assert_eq!(next_label(Some("v1")), "v2");
        assert_eq!(next_label(Some("v9")), "v10");
    }

    #[test]
    fn create_version_diffs_against_parent() {
        let input = NewVersionInput {
            project_id: ResourceId::new(),
            branch_id: ResourceId::new(),
            author: "alice".into(),
            message: "tweak setpoint".into(),
            files: vec![NewVersionFile {
                path: "main.st".into(),
                file_type: FileKind::Logic,
                content: "PROGRAM Main\nx := 2;\nEND_PROGRAM".into(),
            }],
            approvals_required: None,
        };
        let parent_files = vec![("main.st".to_string(), "PROGRAM Main\nx := 1;\nEND_PROGRAM".to_string())];
        let (version, files) = create_version(input, None, &parent_files);
        assert_eq!(version.label, "v1");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].change_type, ChangeType::Modified);
        assert_eq!(version.approvals_required, DEFAULT_APPROVALS_REQUIRED);
    }

    #[test]
    fn approvals_required_is_overridable() {
        let input = NewVersionInput {
            project_id: ResourceId::new(),
            branch_id: ResourceId::new(),
            author: "alice".into(),
            message: "tweak setpoint".into(),
            files: vec![NewVersionFile {
                path: "main.st".into(),
                file_type: FileKind::Logic,
                content: "PROGRAM Main\nx := 1;\nEND_PROGRAM".into(),
            }],
            approvals_required: Some(1),
        };
        let (version, _) = create_version(input, None, &[]);
        assert_eq!(version.approvals_required, 1);
    }

    #[test]
    fn combined_checksum_depends_on_path_and_content() {
        let make = |path: &str, content: &str| NewVersionInput {
            project_id: ResourceId::new(),
            branch_id: ResourceId::new(),
            author: "alice".into(),
            message: "m".into(),
            files: vec![NewVersionFile {
                path: path.into(),
                file_type: FileKind::Logic,
                content: content.into(),
            }],
            approvals_required: None,
        };
        let (a, _) = create_version(make("main.st", "same"), None, &[]);
        let (b, _) = create_version(make("other.st", "same"), None, &[]);
        assert_ne!(a.checksum, b.checksum);
    }

    #[test]
    fn status_transition_rejects_skipping_staged() {
        let mut version = base_version(VersionStatus::Draft);
        assert!(update_version_status(&mut version, VersionStatus::Released).is_err());
        assert!(update_version_status(&mut version, VersionStatus::Staged).is_ok());
        assert_eq!(version.status, VersionStatus::Staged);
    }

    #[test]
    fn re_signing_by_same_signer_is_a_no_op() {
        let mut version = base_version(VersionStatus::Staged);
        sign_version(&mut version, "alice", "sig1".into()).unwrap();
        assert!(sign_version(&mut version, "alice", "sig2".into()).is_ok());
        assert_eq!(version.signature.as_deref(), Some("sig1"));
    }

    #[test]
    fn signing_by_a_different_signer_conflicts() {
        let mut version = base_version(VersionStatus::Staged);
        sign_version(&mut version, "alice", "sig1".into()).unwrap();
        assert!(sign_version(&mut version, "bob", "sig2".into()).is_err());
    }

    #[test]
    fn duplicate_approver_is_rejected() {
        let mut version = base_version(VersionStatus::Staged);
        approve_version(&mut version, "alice").unwrap();
        assert!(approve_version(&mut version, "alice").is_err());
    }

    #[test]
    fn promoting_to_staging_mints_a_release() {
        let snapshot = Snapshot {
            id: ResourceId::new(),
            project_id: ResourceId::new(),
            version_id: ResourceId::new(),
            name: "nightly".into(),
            description: None,
            tags: Vec::new(),
            created_by: "ci".into(),
            created_at: Utc::now(),
        };
        let mut version = base_version(VersionStatus::Draft);
        let (promotion, release) = promote_snapshot(
            &snapshot,
            &mut version,
            Stage::Qa,
            Stage::Staging,
            "alice".into(),
            true,
            None,
            "bundles/x".into(),
            1024,
            "deadbeef".into(),
            "release-1".into(),
            "1.0.0".into(),
        )
        .unwrap();
        assert_eq!(promotion.to_stage, Stage::Staging);
        assert!(release.is_some());
        assert_eq!(version.status, VersionStatus::Staged);
    }

    #[test]
    fn promotion_rejects_backward_moves() {
        let snapshot = Snapshot {
            id: ResourceId::new(),
            project_id: ResourceId::new(),
            version_id: ResourceId::new(),
            name: "s".into(),
            description: None,
            tags: Vec::new(),
            created_by: "ci".into(),
            created_at: Utc::now(),
        };
        let mut version = base_version(VersionStatus::Staged);
        let result = promote_snapshot(
            &snapshot,
            &mut version,
            Stage::Prod,
            Stage::Qa,
            "alice".into(),
            true,
            None,
            "bundles/x".into(),
            1024,
            "deadbeef".into(),
            "release-1".into(),
            "1.0.0".into(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn promotion_rejects_skipping_qa() {
        let snapshot = Snapshot {
            id: ResourceId::new(),
            project_id: ResourceId::new(),
            version_id: ResourceId::new(),
            name: "s".into(),
            description: None,
            tags: Vec::new(),
            created_by: "ci".into(),
            created_at: Utc::now(),
        };
        let mut version = base_version(VersionStatus::Draft);
        let result = promote_snapshot(
            &snapshot,
            &mut version,
            Stage::Dev,
            Stage::Staging,
            "alice".into(),
            true,
            None,
            "bundles/x".into(),
            1024,
            "deadbeef".into(),
            "release-1".into(),
            "1.0.0".into(),
        );
        match result {
            Err(Error::PreconditionFailed(msg)) => assert!(msg.contains("QA")),
            other => panic!("expected a precondition failure naming QA, got {other:?}"),
        }
    }
}
