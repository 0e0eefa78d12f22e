use dicom::core::{DataDictionary, Tag};
use dicom::dictionary_std::StandardDataDictionary;
use dicom::ul::pdu::AbortRQSource;

use crate::service::ServiceKind;
use crate::state::{AssociationState, InvalidTransition};

/// Error which might happen while serving an association.
#[derive(thiserror::Error, Debug)]
pub(crate) enum AssociationError {
    #[error("Could not establish association.")]
    CouldNotEstablish(dicom::ul::association::server::Error),

    #[error("Failed to receive PDU from SCU")]
    Receive(#[from] dicom::ul::association::server::Error),

    #[error("Failed to read incoming DICOM command")]
    FailedToReadCommand(dicom::object::ReadError),

    #[error("{0}")]
    CannotRespond(&'static str),

    #[error("Missing {}", name_of(.0))]
    MissingTag(Tag),

    #[error("Value for {} is not a number", name_of(.0))]
    InvalidNumber(Tag),

    #[error("Could not retrieve {}", name_of(.0))]
    CouldNotRetrieve(Tag),

    #[error("Missing presentation context")]
    MissingPresentationContext,

    #[error("Unsupported transfer syntax \"{0}\"")]
    UnsupportedTransferSyntax(String),

    #[error("Unsupported command field {0:#06x}")]
    UnsupportedOperation(u16),

    #[error("{requested} request received on the {port} port")]
    WrongService {
        requested: ServiceKind,
        port: ServiceKind,
    },

    #[error("Request announced a data set but none was sent")]
    MissingIdentifier,

    #[error("Data fragment received before any command")]
    DataWithoutCommand,

    #[error("Command received while the previous command's data set is outstanding")]
    CommandWhileAwaitingData,

    #[error("Operation received while association is {0:?}")]
    NotActive(AssociationState),

    #[error(transparent)]
    State(#[from] InvalidTransition),

    #[error("Association aborted by {0:?}")]
    Aborted(AbortRQSource),

    #[error("Unhandled PDU: {0}")]
    UnhandledPdu(String),
}

/// Get the standard name of a tag.
fn name_of(tag: &Tag) -> &'static str {
    StandardDataDictionary
        .by_tag(*tag)
        .map(|e| e.alias)
        .unwrap_or("unknown tag")
}
