//! Content-addressed file storage, diffing, and the version/snapshot/
//! release pipeline that sits on top of the core data model.

pub mod diff;
pub mod store;
pub mod version;

pub use diff::{compare_file_sets, diff_file, ComparisonSummary, FileDiff, Hunk, MovedFile};
pub use store::{
    apply_line_delta, checksum, compress, compute_line_delta, decompress, delta_is_preferred,
    pack_bundle, prune_to_retain, unpack_bundle, BundleFile, DeltaChange, DeltaChangeKind, LineDelta,
    ReleaseBundle,
};
pub use version::{
    approve_version, compare_versions, create_snapshot, create_version, promote_release,
    promote_snapshot, record_release_deployment, sign_version, update_version_status,
    NewVersionFile, NewVersionInput,
};
