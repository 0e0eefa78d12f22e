/// Error which might happen while persisting a received DICOM instance.
#[derive(thiserror::Error, Debug)]
pub enum DicomStorageError {
    #[error(transparent)]
    IO(#[from] std::io::Error),

    #[error(transparent)]
    Write(#[from] dicom::object::WriteError),

    #[error(transparent)]
    MissingTag(#[from] MissingRequiredTag),

    #[error("failed to build DICOM meta file information")]
    Meta(#[from] dicom::object::meta::Error),

    #[error("instance \"{0}\" is already in storage")]
    Duplicate(String),
}

#[derive(thiserror::Error, Debug)]
#[error("DICOM object does not have the required tag: \"{0}\"")]
pub struct MissingRequiredTag(pub &'static str);
