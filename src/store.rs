//! The storage workflow: persist received instances under
//! `<root>/<StudyInstanceUID>/<SOPInstanceUID>.dcm`.

use camino::Utf8PathBuf;
use dicom::dictionary_std::tags;
use dicom::object::FileMetaTableBuilder;

use crate::commands::{ServiceResponse, Status, StoreRequest, store_rsp};
use crate::error::{DicomStorageError, MissingRequiredTag};
use crate::sanitize::sanitize;

/// What to do when an instance with the same storage path already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Replace the stored file. Re-sent instances succeed.
    #[default]
    Overwrite,
    /// Keep the stored file and answer with status `0x0111`.
    Reject,
}

/// Filesystem destination of received instances.
pub struct StorageSink {
    root: Utf8PathBuf,
    duplicates: DuplicatePolicy,
}

impl StorageSink {
    pub fn new(root: Utf8PathBuf, duplicates: DuplicatePolicy) -> Self {
        Self { root, duplicates }
    }

    /// Where an instance is (or would be) stored.
    pub fn path_for(&self, study_instance_uid: &str, sop_instance_uid: &str) -> Utf8PathBuf {
        self.root
            .join(sanitize(study_instance_uid))
            .join(format!("{}.dcm", sanitize(sop_instance_uid)))
    }

    /// Persist one instance. The file is written with a fresh meta table
    /// carrying the transfer syntax the data set arrived in.
    fn store(
        &self,
        request: StoreRequest,
        transfer_syntax: &str,
    ) -> Result<Utf8PathBuf, DicomStorageError> {
        let study_instance_uid = request
            .object
            .element(tags::STUDY_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(MissingRequiredTag("StudyInstanceUID"))?;
        let path = self.path_for(&study_instance_uid, &request.sop_instance_uid);
        if self.duplicates == DuplicatePolicy::Reject && path.exists() {
            return Err(DicomStorageError::Duplicate(request.sop_instance_uid));
        }
        if let Some(parent_dir) = path.parent() {
            fs_err::create_dir_all(parent_dir)?;
        }
        let meta = FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(&request.sop_class_uid)
            .media_storage_sop_instance_uid(&request.sop_instance_uid)
            .transfer_syntax(transfer_syntax)
            .build()?;
        request.object.with_exact_meta(meta).write_to_file(&path)?;
        Ok(path)
    }
}

/// Respond to a C-STORE. Storage failures become failure statuses on the
/// response, never errors bubbling up to the association loop.
pub(crate) fn run_store(
    sink: &StorageSink,
    request: StoreRequest,
    transfer_syntax: &str,
) -> ServiceResponse {
    let message_id = request.message_id;
    let sop_class_uid = request.sop_class_uid.clone();
    let sop_instance_uid = request.sop_instance_uid.clone();
    let status = match sink.store(request, transfer_syntax) {
        Ok(path) => {
            tracing::info!(event = "storage", path = path.into_string());
            Status::Success
        }
        Err(DicomStorageError::Duplicate(uid)) => {
            tracing::warn!(event = "storage", sop_instance_uid = uid, "duplicate instance refused");
            Status::DUPLICATE_SOP_INSTANCE
        }
        Err(e) => {
            tracing::error!(event = "storage", error = e.to_string());
            Status::PROCESSING_FAILURE
        }
    };
    store_rsp(message_id, &sop_class_uid, &sop_instance_uid, status)
}
