//! The persisted data model: projects, logic, tags, the version chain, and
//! the deployment records that sit on top of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Vendor flavour of an ST source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    Neutral,
    Siemens,
    Rockwell,
    Beckhoff,
}

/// A connection profile for a project's live controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub vendor: Vendor,
    pub address: String,
    pub port: u16,
    pub slot: Option<u8>,
    pub rack: Option<u8>,
}

/// Top-level container; owns logic files, tags, versions, snapshots,
/// releases, deployments, branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ResourceId,
    pub name: String,
    pub connection: Option<ConnectionProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named ST source, immutable at version-capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicFile {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub path: String,
    pub vendor: Vendor,
    pub content: String,
    pub author: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TagType {
    Bool,
    Int,
    Dint,
    Real,
    Lreal,
    String,
    Time,
    Array,
    Udt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagSource {
    Shadow,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagScope {
    Global,
    Program,
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagLifecycle {
    Draft,
    Active,
    Deprecated,
    Archived,
}

/// Alarm thresholds on a numeric tag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AlarmThresholds {
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub critical: Option<f64>,
}

/// A named addressable variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub name: String,
    pub tag_type: TagType,
    pub udt_type: Option<String>,
    pub value: serde_json::Value,
    pub vendor_address: Option<String>,
    pub source: TagSource,
    pub scope: TagScope,
    pub lifecycle: TagLifecycle,
    /// "area/equipment/routine" hierarchy path.
    pub hierarchy_path: String,
    pub alarms: AlarmThresholds,
    pub read_only: bool,
    pub requires_approval: bool,
}

/// One member of a UDT's ordered member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdtMember {
    pub name: String,
    pub member_type: TagType,
    pub udt_type: Option<String>,
    pub array_size: Option<u32>,
    pub default: Option<serde_json::Value>,
    pub description: Option<String>,
}

/// A named composite type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Udt {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub name: String,
    pub members: Vec<UdtMember>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Main,
    Dev,
    Qa,
    Staging,
    Prod,
}

impl Stage {
    /// The strictly-increasing promotion order `dev < qa < staging < prod`
    /// (§3 invariants). `Main` is a branch-only stage and never appears in
    /// a promotion chain.
    pub fn promotion_rank(self) -> Option<u8> {
        match self {
            Stage::Dev => Some(0),
            Stage::Qa => Some(1),
            Stage::Staging => Some(2),
            Stage::Prod => Some(3),
            Stage::Main => None,
        }
    }
}

/// A mutable pointer at a (project, stage); versions are immutable nodes
/// reached through it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub name: String,
    pub stage: Stage,
    pub parent_branch_id: Option<ResourceId>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    Draft,
    Staged,
    Released,
    Deprecated,
}

impl VersionStatus {
    /// The only transitions `updateVersionStatus` permits (§4.7).
    pub fn can_transition_to(self, next: VersionStatus) -> bool {
        matches!(
            (self, next),
            (VersionStatus::Draft, VersionStatus::Staged)
                | (VersionStatus::Staged, VersionStatus::Released)
                | (VersionStatus::Released, VersionStatus::Deprecated)
        )
    }
}

/// A changelog entry appended on every mutation permitted after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub detail: String,
}

/// An immutable capture of a project's files at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub branch_id: ResourceId,
    pub label: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: VersionStatus,
    pub checksum: String,
    pub parent_version_id: Option<ResourceId>,
    pub approvals: Vec<VersionApproval>,
    pub approvals_required: u32,
    pub signed: bool,
    pub signed_by: Option<String>,
    pub signed_at: Option<DateTime<Utc>>,
    pub signature: Option<String>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub changelog: Vec<ChangelogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionApproval {
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Logic,
    Tag,
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// Per-version file record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionFile {
    pub version_id: ResourceId,
    pub path: String,
    pub file_type: FileKind,
    pub change_type: ChangeType,
    pub lines_added: u32,
    pub lines_deleted: u32,
    pub size: u64,
    pub sha256: String,
    pub storage_path: String,
    pub is_compressed: bool,
    pub is_delta: bool,
    pub delta_base_file_id: Option<ResourceId>,
    /// First 50 lines of unified diff, for modified files.
    pub diff_preview: Option<String>,
}

/// A named, mutable-metadata pointer to a single immutable version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub version_id: ResourceId,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// An immutable record of one promotion along the stage order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPromotion {
    pub snapshot_id: ResourceId,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub promoted_by: String,
    pub promoted_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub checks_passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Active,
    Deprecated,
    Archived,
}

/// An immutable, signed, bundled artefact built from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub snapshot_id: ResourceId,
    pub version_id: ResourceId,
    pub name: String,
    pub version: String,
    pub environment: Stage,
    pub bundle_path: String,
    pub bundle_size: u64,
    pub bundle_checksum: String,
    pub signed: bool,
    pub signature: String,
    pub signed_by: String,
    pub status: ReleaseStatus,
    pub linked_deploys: u32,
    pub last_deployed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStrategy {
    Atomic,
    Canary,
    Staged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStatus {
    Pending,
    Running,
    Paused,
    Success,
    Failed,
    RolledBack,
}

/// A deployment attempt of a release into one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRecord {
    pub id: ResourceId,
    pub project_id: ResourceId,
    pub release_id: ResourceId,
    pub version_id: ResourceId,
    pub snapshot_id: Option<ResourceId>,
    pub deploy_name: String,
    pub environment: Stage,
    pub strategy: DeployStrategy,
    pub status: DeployStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub estimated_downtime_seconds: u64,
    pub initiated_by: String,
    pub approved_by: Option<String>,
    pub approval_count: u32,
    pub approvals_required: u32,
    pub target_runtimes: Vec<String>,
    pub progress_percent: u8,
    pub error_message: Option<String>,
    pub rollback_reason: Option<String>,
    pub previous_version_id: Option<ResourceId>,
    pub checks_passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApproverRole {
    OperationsManager,
    SafetyEngineer,
    LeadDeveloper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployApproval {
    pub id: ResourceId,
    pub deploy_id: ResourceId,
    pub approver_name: Option<String>,
    pub approver_role: ApproverRole,
    pub status: ApprovalStatus,
    pub comment: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub is_required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Syntax,
    Tags,
    Conflicts,
    Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pending,
    Running,
    Passed,
    Warning,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCheck {
    pub id: ResourceId,
    pub deploy_id: ResourceId,
    pub name: String,
    pub check_type: CheckType,
    pub status: CheckStatus,
    pub severity: CheckSeverity,
    pub message: String,
    pub details: serde_json::Value,
    pub timing_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployLog {
    pub deploy_id: ResourceId,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub step: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollbackStatus {
    Pending,
    Running,
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRollback {
    pub id: ResourceId,
    pub deploy_id: ResourceId,
    pub triggered_by: String,
    pub reason: String,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RollbackStatus,
    pub is_automatic: bool,
}

impl DeployRecord {
    /// `approvalsRequired` is 0 below staging, 1 for staging, 2 for
    /// production (§3 invariants).
    pub fn approvals_required_for(stage: Stage) -> u32 {
        match stage {
            Stage::Staging => 1,
            Stage::Prod => 2,
            _ => 0,
        }
    }

    /// Required approver roles seeded on deployment creation (§4.9 step 5).
    pub fn required_roles_for(stage: Stage) -> Vec<ApproverRole> {
        match stage {
            Stage::Staging => vec![ApproverRole::OperationsManager],
            Stage::Prod => vec![ApproverRole::SafetyEngineer, ApproverRole::LeadDeveloper],
            _ => vec![],
        }
    }

    /// A deployment may enter `running` only when both gates hold (§3, §8).
    pub fn can_start(&self) -> bool {
        self.checks_passed && self.approval_count >= self.approvals_required
    }
}
