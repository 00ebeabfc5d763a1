//! Transfer lifecycle entities
//!
//! PendingUpload, Upload, and Download rows track a piece of content
//! moving through the engine. All three are created by the
//! orchestrator or reconciler, mutated through their status lifecycle,
//! and kept forever once terminal (completed/failed/rejected) so
//! callers can poll history.
//!
//! ## Lifecycles
//!
//! ```text
//! PendingUpload:  AwaitingApproval ──► Approved
//!                        │
//!                        └────────────► Rejected
//!
//! Upload:    Pending ──► Uploading ──► Completed
//!                            │
//!                            └───────► Failed
//!
//! Download:  Pending ──► Downloading ──► Completed
//!                             │
//!                             └────────► Failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;
use super::newtypes::{ContentHash, MappingId, RemoteId, SyncPath, TransferId};
use super::version::UploadMethod;

// ============================================================================
// PendingUpload
// ============================================================================

/// Approval state of a candidate upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingUploadStatus {
    /// Waiting for an external caller to approve or reject
    #[default]
    AwaitingApproval,
    /// Approved; eligible for the upload queue
    Approved,
    /// Rejected; terminal
    Rejected,
}

impl PendingUploadStatus {
    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            PendingUploadStatus::AwaitingApproval => "awaiting_approval",
            PendingUploadStatus::Approved => "approved",
            PendingUploadStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PendingUploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PendingUploadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_approval" => Ok(PendingUploadStatus::AwaitingApproval),
            "approved" => Ok(PendingUploadStatus::Approved),
            "rejected" => Ok(PendingUploadStatus::Rejected),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown pending upload status: {other}"
            ))),
        }
    }
}

/// A candidate local change awaiting approval
///
/// The engine creates these; it never approves them itself. An external
/// caller inspects the row (cost estimate, conflict info) and flips it
/// to approved or rejected through the policy interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpload {
    id: TransferId,
    mapping_id: MappingId,
    local_path: SyncPath,
    file_name: String,
    file_size: u64,
    content_hash: ContentHash,
    /// Estimated remote-store cost in the store's native unit
    estimated_cost: Option<f64>,
    recommended_method: UploadMethod,
    /// Human-readable note when the change collides with remote state
    conflict_info: Option<String>,
    status: PendingUploadStatus,
    created_at: DateTime<Utc>,
}

impl PendingUpload {
    /// Creates a new candidate in `AwaitingApproval`
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the path has no file name
    pub fn new(
        mapping_id: MappingId,
        local_path: SyncPath,
        file_size: u64,
        content_hash: ContentHash,
        estimated_cost: Option<f64>,
        recommended_method: UploadMethod,
    ) -> Result<Self, DomainError> {
        let file_name = local_path
            .file_name()
            .ok_or_else(|| {
                DomainError::ValidationFailed(format!("Path has no file name: {local_path}"))
            })?
            .to_string();

        Ok(Self {
            id: TransferId::new(),
            mapping_id,
            local_path,
            file_name,
            file_size,
            content_hash,
            estimated_cost,
            recommended_method,
            conflict_info: None,
            status: PendingUploadStatus::AwaitingApproval,
            created_at: Utc::now(),
        })
    }

    /// Reconstructs a PendingUpload from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransferId,
        mapping_id: MappingId,
        local_path: SyncPath,
        file_name: String,
        file_size: u64,
        content_hash: ContentHash,
        estimated_cost: Option<f64>,
        recommended_method: UploadMethod,
        conflict_info: Option<String>,
        status: PendingUploadStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            mapping_id,
            local_path,
            file_name,
            file_size,
            content_hash,
            estimated_cost,
            recommended_method,
            conflict_info,
            status,
            created_at,
        }
    }

    /// Returns the row id
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the local path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the content hash
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the estimated cost, if computed
    pub fn estimated_cost(&self) -> Option<f64> {
        self.estimated_cost
    }

    /// Returns the recommended upload method
    pub fn recommended_method(&self) -> UploadMethod {
        self.recommended_method
    }

    /// Returns the conflict note, if any
    pub fn conflict_info(&self) -> Option<&str> {
        self.conflict_info.as_deref()
    }

    /// Returns the approval status
    pub fn status(&self) -> PendingUploadStatus {
        self.status
    }

    /// Returns when the candidate was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Records a conflict note
    pub fn set_conflict_info(&mut self, info: impl Into<String>) {
        self.conflict_info = Some(info.into());
    }

    /// Approves the candidate, optionally overriding the upload method
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` unless the candidate is
    /// still awaiting approval.
    pub fn approve(&mut self, method: Option<UploadMethod>) -> Result<(), DomainError> {
        if self.status != PendingUploadStatus::AwaitingApproval {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: PendingUploadStatus::Approved.name().to_string(),
            });
        }
        if let Some(method) = method {
            self.recommended_method = method;
        }
        self.status = PendingUploadStatus::Approved;
        Ok(())
    }

    /// Rejects the candidate
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` unless the candidate is
    /// still awaiting approval.
    pub fn reject(&mut self) -> Result<(), DomainError> {
        if self.status != PendingUploadStatus::AwaitingApproval {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: PendingUploadStatus::Rejected.name().to_string(),
            });
        }
        self.status = PendingUploadStatus::Rejected;
        Ok(())
    }
}

// ============================================================================
// Upload
// ============================================================================

/// Status of an Upload lifecycle row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    /// Returns true for completed/failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "uploading" => Ok(UploadStatus::Uploading),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown upload status: {other}"
            ))),
        }
    }
}

/// One upload attempt moving through the queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    id: TransferId,
    mapping_id: MappingId,
    local_path: SyncPath,
    file_size: u64,
    content_hash: ContentHash,
    method: UploadMethod,
    /// Queue ordering key, higher first
    priority: i32,
    status: UploadStatus,
    /// Bytes sent so far
    progress: u64,
    remote_data_id: Option<RemoteId>,
    remote_metadata_id: Option<RemoteId>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Upload {
    /// Creates a new upload in `Pending`
    pub fn new(
        mapping_id: MappingId,
        local_path: SyncPath,
        file_size: u64,
        content_hash: ContentHash,
        method: UploadMethod,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransferId::new(),
            mapping_id,
            local_path,
            file_size,
            content_hash,
            method,
            priority,
            status: UploadStatus::Pending,
            progress: 0,
            remote_data_id: None,
            remote_metadata_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs an Upload from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransferId,
        mapping_id: MappingId,
        local_path: SyncPath,
        file_size: u64,
        content_hash: ContentHash,
        method: UploadMethod,
        priority: i32,
        status: UploadStatus,
        progress: u64,
        remote_data_id: Option<RemoteId>,
        remote_metadata_id: Option<RemoteId>,
        error_message: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            mapping_id,
            local_path,
            file_size,
            content_hash,
            method,
            priority,
            status,
            progress,
            remote_data_id,
            remote_metadata_id,
            error_message,
            created_at,
            updated_at,
        }
    }

    /// Checks if a status transition is valid
    ///
    /// Valid transitions:
    /// - Pending -> Uploading, Failed
    /// - Uploading -> Completed, Failed
    /// - Completed, Failed -> (terminal)
    pub fn can_transition_to(&self, target: UploadStatus) -> bool {
        match (self.status, target) {
            (UploadStatus::Pending, UploadStatus::Uploading) => true,
            (UploadStatus::Pending, UploadStatus::Failed) => true,
            (UploadStatus::Uploading, UploadStatus::Completed) => true,
            (UploadStatus::Uploading, UploadStatus::Failed) => true,
            _ => false,
        }
    }

    /// Attempts to transition to a new status
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: UploadStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the upload in flight
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Uploading)
    }

    /// Marks the upload completed with the ids the store returned
    pub fn complete(
        &mut self,
        data_id: RemoteId,
        metadata_id: RemoteId,
    ) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Completed)?;
        self.progress = self.file_size;
        self.remote_data_id = Some(data_id);
        self.remote_metadata_id = Some(metadata_id);
        Ok(())
    }

    /// Marks the upload failed with the captured error message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(UploadStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    /// Records transfer progress in bytes
    pub fn set_progress(&mut self, bytes: u64) {
        self.progress = bytes.min(self.file_size);
        self.updated_at = Utc::now();
    }

    // --- Getters ---

    /// Returns the row id
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the local path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the content hash
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Returns the upload method
    pub fn method(&self) -> UploadMethod {
        self.method
    }

    /// Returns the queue priority
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the current status
    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Returns bytes sent so far
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Returns the remote data id, if completed
    pub fn remote_data_id(&self) -> Option<&RemoteId> {
        self.remote_data_id.as_ref()
    }

    /// Returns the remote metadata id, if completed
    pub fn remote_metadata_id(&self) -> Option<&RemoteId> {
        self.remote_metadata_id.as_ref()
    }

    /// Returns the captured error message, if failed
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns when the upload row was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the upload row was last updated
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// ============================================================================
// Download
// ============================================================================

/// Status of a Download lifecycle row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl DownloadStatus {
    /// Returns the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    /// Returns true for completed/failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Failed)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DownloadStatus::Pending),
            "downloading" => Ok(DownloadStatus::Downloading),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown download status: {other}"
            ))),
        }
    }
}

/// One download attempt driven by the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Download {
    id: TransferId,
    mapping_id: MappingId,
    remote_file_id: RemoteId,
    local_path: SyncPath,
    /// Expected size, when the remote listing reported one
    file_size: Option<u64>,
    status: DownloadStatus,
    progress: u64,
    /// Hash recomputed from the written bytes, once completed
    content_hash: Option<ContentHash>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Download {
    /// Creates a new download in `Pending`
    pub fn new(
        mapping_id: MappingId,
        remote_file_id: RemoteId,
        local_path: SyncPath,
        file_size: Option<u64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransferId::new(),
            mapping_id,
            remote_file_id,
            local_path,
            file_size,
            status: DownloadStatus::Pending,
            progress: 0,
            content_hash: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstructs a Download from stored fields
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransferId,
        mapping_id: MappingId,
        remote_file_id: RemoteId,
        local_path: SyncPath,
        file_size: Option<u64>,
        status: DownloadStatus,
        progress: u64,
        content_hash: Option<ContentHash>,
        error_message: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            mapping_id,
            remote_file_id,
            local_path,
            file_size,
            status,
            progress,
            content_hash,
            error_message,
            created_at,
            updated_at,
        }
    }

    /// Checks if a status transition is valid
    ///
    /// Valid transitions:
    /// - Pending -> Downloading, Failed
    /// - Downloading -> Completed, Failed
    /// - Completed, Failed -> (terminal)
    pub fn can_transition_to(&self, target: DownloadStatus) -> bool {
        match (self.status, target) {
            (DownloadStatus::Pending, DownloadStatus::Downloading) => true,
            (DownloadStatus::Pending, DownloadStatus::Failed) => true,
            (DownloadStatus::Downloading, DownloadStatus::Completed) => true,
            (DownloadStatus::Downloading, DownloadStatus::Failed) => true,
            _ => false,
        }
    }

    /// Attempts to transition to a new status
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidState` if the transition is not allowed.
    pub fn transition_to(&mut self, target: DownloadStatus) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.status.name().to_string(),
                to: target.name().to_string(),
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the download in flight
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition_to(DownloadStatus::Downloading)
    }

    /// Marks the download completed with the recomputed hash
    pub fn complete(&mut self, content_hash: ContentHash) -> Result<(), DomainError> {
        self.transition_to(DownloadStatus::Completed)?;
        if let Some(size) = self.file_size {
            self.progress = size;
        }
        self.content_hash = Some(content_hash);
        Ok(())
    }

    /// Marks the download failed with the captured error message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.transition_to(DownloadStatus::Failed)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    // --- Getters ---

    /// Returns the row id
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Returns the mapping id
    pub fn mapping_id(&self) -> MappingId {
        self.mapping_id
    }

    /// Returns the remote file id
    pub fn remote_file_id(&self) -> &RemoteId {
        &self.remote_file_id
    }

    /// Returns the local destination path
    pub fn local_path(&self) -> &SyncPath {
        &self.local_path
    }

    /// Returns the expected size, if known
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Returns the current status
    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    /// Returns bytes received so far
    pub fn progress(&self) -> u64 {
        self.progress
    }

    /// Returns the recomputed hash, if completed
    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// Returns the captured error message, if failed
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns when the download row was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the download row was last updated
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_hash() -> ContentHash {
        ContentHash::new("e".repeat(64)).unwrap()
    }

    fn sample_path() -> SyncPath {
        SyncPath::new(PathBuf::from("/data/drive/report.pdf")).unwrap()
    }

    mod pending_upload_tests {
        use super::*;

        #[test]
        fn test_new_awaits_approval() {
            let pending = PendingUpload::new(
                MappingId::new(),
                sample_path(),
                2_000_000,
                sample_hash(),
                Some(0.042),
                UploadMethod::Chunked,
            )
            .unwrap();

            assert_eq!(pending.status(), PendingUploadStatus::AwaitingApproval);
            assert_eq!(pending.file_name(), "report.pdf");
            assert_eq!(pending.estimated_cost(), Some(0.042));
        }

        #[test]
        fn test_approve_with_method_override() {
            let mut pending = PendingUpload::new(
                MappingId::new(),
                sample_path(),
                100,
                sample_hash(),
                None,
                UploadMethod::Chunked,
            )
            .unwrap();

            pending.approve(Some(UploadMethod::Direct)).unwrap();
            assert_eq!(pending.status(), PendingUploadStatus::Approved);
            assert_eq!(pending.recommended_method(), UploadMethod::Direct);
        }

        #[test]
        fn test_reject_is_terminal() {
            let mut pending = PendingUpload::new(
                MappingId::new(),
                sample_path(),
                100,
                sample_hash(),
                None,
                UploadMethod::Direct,
            )
            .unwrap();

            pending.reject().unwrap();
            assert!(pending.approve(None).is_err());
            assert!(pending.reject().is_err());
        }
    }

    mod upload_tests {
        use super::*;

        fn sample_upload() -> Upload {
            Upload::new(
                MappingId::new(),
                sample_path(),
                2_000_000,
                sample_hash(),
                UploadMethod::Chunked,
                5,
            )
        }

        #[test]
        fn test_happy_path() {
            let mut upload = sample_upload();
            assert_eq!(upload.status(), UploadStatus::Pending);

            upload.start().unwrap();
            assert_eq!(upload.status(), UploadStatus::Uploading);

            upload
                .complete(
                    RemoteId::new("data1".to_string()).unwrap(),
                    RemoteId::new("meta1".to_string()).unwrap(),
                )
                .unwrap();
            assert_eq!(upload.status(), UploadStatus::Completed);
            assert_eq!(upload.progress(), 2_000_000);
            assert!(upload.remote_data_id().is_some());
        }

        #[test]
        fn test_fail_from_uploading() {
            let mut upload = sample_upload();
            upload.start().unwrap();
            upload.fail("remote unreachable").unwrap();

            assert_eq!(upload.status(), UploadStatus::Failed);
            assert_eq!(upload.error_message(), Some("remote unreachable"));
        }

        #[test]
        fn test_terminal_states_reject_transitions() {
            let mut upload = sample_upload();
            upload.start().unwrap();
            upload.fail("boom").unwrap();

            assert!(upload.start().is_err());
            assert!(upload
                .complete(
                    RemoteId::new("d".to_string()).unwrap(),
                    RemoteId::new("m".to_string()).unwrap(),
                )
                .is_err());
        }

        #[test]
        fn test_complete_requires_uploading() {
            let mut upload = sample_upload();
            let result = upload.complete(
                RemoteId::new("d".to_string()).unwrap(),
                RemoteId::new("m".to_string()).unwrap(),
            );
            assert!(result.is_err());
        }

        #[test]
        fn test_progress_is_capped() {
            let mut upload = sample_upload();
            upload.set_progress(5_000_000);
            assert_eq!(upload.progress(), 2_000_000);
        }
    }

    mod download_tests {
        use super::*;

        fn sample_download() -> Download {
            Download::new(
                MappingId::new(),
                RemoteId::new("file1".to_string()).unwrap(),
                sample_path(),
                Some(42),
            )
        }

        #[test]
        fn test_happy_path() {
            let mut download = sample_download();
            download.start().unwrap();
            download.complete(sample_hash()).unwrap();

            assert_eq!(download.status(), DownloadStatus::Completed);
            assert_eq!(download.progress(), 42);
            assert!(download.content_hash().is_some());
        }

        #[test]
        fn test_fail_records_message() {
            let mut download = sample_download();
            download.start().unwrap();
            download.fail("listing expired").unwrap();

            assert_eq!(download.status(), DownloadStatus::Failed);
            assert_eq!(download.error_message(), Some("listing expired"));
        }

        #[test]
        fn test_pending_can_fail_directly() {
            let mut download = sample_download();
            download.fail("never started").unwrap();
            assert_eq!(download.status(), DownloadStatus::Failed);
        }
    }
}
