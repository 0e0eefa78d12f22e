//! Typed DIMSE operation requests and responses.
//!
//! Command sets are always encoded in Implicit VR Little Endian; the data
//! set payload (if any) travels in the transfer syntax negotiated for the
//! presentation context and is handled by the association loop.

use dicom::core::{DataElement, Tag, VR};
use dicom::dicom_value;
use dicom::dictionary_std::{tags, uids};
use dicom::object::InMemDicomObject;

use crate::association_error::AssociationError;
use crate::dicomrs_settings::ClientAETitle;
use crate::service::ServiceKind;

// Command field values of the request operations we serve (PS3.7 E.1-1).
pub(crate) const C_STORE_RQ: u16 = 0x0001;
pub(crate) const C_FIND_RQ: u16 = 0x0020;
pub(crate) const C_MOVE_RQ: u16 = 0x0021;
pub(crate) const C_ECHO_RQ: u16 = 0x0030;
/// May interleave with C-FIND/C-MOVE responses; logged and ignored.
pub(crate) const C_CANCEL_RQ: u16 = 0x0FFF;
/// Bit set in the command field of the response answering a request.
const RSP: u16 = 0x8000;

/// Command Data Set Type value meaning "no data set follows".
pub(crate) const DATA_SET_MISSING: u16 = 0x0101;
/// Recommended Command Data Set Type value when a data set follows.
/// Peers may use any value other than [DATA_SET_MISSING] to mean the same.
pub(crate) const DATA_SET_EXISTS: u16 = 0x0102;

// Command group elements for C-MOVE sub-operation progress (PS3.7 9.3.4.2).
const NUMBER_OF_REMAINING_SUBOPERATIONS: Tag = Tag(0x0000, 0x1020);
const NUMBER_OF_COMPLETED_SUBOPERATIONS: Tag = Tag(0x0000, 0x1021);
const NUMBER_OF_FAILED_SUBOPERATIONS: Tag = Tag(0x0000, 0x1022);
const NUMBER_OF_WARNING_SUBOPERATIONS: Tag = Tag(0x0000, 0x1023);

/// Status of one response in a response sequence.
///
/// Every response sequence ends in exactly one terminal status; all
/// non-terminal responses are [Status::Pending].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Pending,
    Warning(u16),
    Failure(u16),
}

impl Status {
    /// A C-STORE could not persist the instance.
    pub const PROCESSING_FAILURE: Status = Status::Failure(0x0110);
    /// The SOP instance is already stored and the sink refuses to overwrite.
    pub const DUPLICATE_SOP_INSTANCE: Status = Status::Failure(0x0111);
    /// A C-FIND or C-MOVE could not process the identifier.
    pub const UNABLE_TO_PROCESS: Status = Status::Failure(0xC000);
    /// The C-MOVE destination AE is unknown to the backend.
    pub const MOVE_DESTINATION_UNKNOWN: Status = Status::Failure(0xA801);

    pub(crate) const fn code(self) -> u16 {
        match self {
            Status::Success => 0x0000,
            Status::Pending => 0xFF00,
            Status::Warning(code) | Status::Failure(code) => code,
        }
    }

    /// Whether this status legally ends a response sequence.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Status::Pending)
    }
}

/// An operation request read off an association. Immutable once received.
pub(crate) enum ServiceRequest {
    Echo(EchoRequest),
    Find(FindRequest),
    Store(StoreRequest),
    Move(MoveRequest),
}

pub(crate) struct EchoRequest {
    pub message_id: u16,
}

pub(crate) struct FindRequest {
    pub message_id: u16,
    pub sop_class_uid: String,
    /// Matching keys. An empty value means "return this attribute,
    /// match anything".
    pub identifier: InMemDicomObject,
}

pub(crate) struct StoreRequest {
    pub message_id: u16,
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub object: InMemDicomObject,
}

pub(crate) struct MoveRequest {
    pub message_id: u16,
    pub sop_class_uid: String,
    pub destination: ClientAETitle,
    pub identifier: InMemDicomObject,
}

impl ServiceRequest {
    /// Parse an assembled command set (plus the data set that followed it,
    /// when one was announced) into a typed request.
    pub(crate) fn parse(
        command: &InMemDicomObject,
        data: Option<InMemDicomObject>,
    ) -> Result<Self, AssociationError> {
        let command_field = uint16_of(command, tags::COMMAND_FIELD)?;
        let message_id = uint16_of(command, tags::MESSAGE_ID)?;
        match command_field {
            C_ECHO_RQ => Ok(Self::Echo(EchoRequest { message_id })),
            C_FIND_RQ => Ok(Self::Find(FindRequest {
                message_id,
                sop_class_uid: str_of(command, tags::AFFECTED_SOP_CLASS_UID)?,
                identifier: data.ok_or(AssociationError::MissingIdentifier)?,
            })),
            C_STORE_RQ => Ok(Self::Store(StoreRequest {
                message_id,
                sop_class_uid: str_of(command, tags::AFFECTED_SOP_CLASS_UID)?,
                sop_instance_uid: str_of(command, tags::AFFECTED_SOP_INSTANCE_UID)?,
                object: data.ok_or(AssociationError::MissingIdentifier)?,
            })),
            C_MOVE_RQ => Ok(Self::Move(MoveRequest {
                message_id,
                sop_class_uid: str_of(command, tags::AFFECTED_SOP_CLASS_UID)?,
                destination: ClientAETitle::from(str_of(command, tags::MOVE_DESTINATION)?),
                identifier: data.ok_or(AssociationError::MissingIdentifier)?,
            })),
            other => Err(AssociationError::UnsupportedOperation(other)),
        }
    }

    /// The service class which answers this operation.
    pub(crate) fn kind(&self) -> ServiceKind {
        match self {
            Self::Echo(_) => ServiceKind::Verification,
            Self::Find(_) => ServiceKind::Query,
            Self::Store(_) => ServiceKind::Storage,
            Self::Move(_) => ServiceKind::Move,
        }
    }
}

/// One response of a workflow's response sequence.
pub(crate) struct ServiceResponse {
    pub status: Status,
    pub command: InMemDicomObject,
    pub data: Option<InMemDicomObject>,
}

/// Sub-operation progress counters carried in C-MOVE response command sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SubOpCounters {
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

pub(crate) fn echo_rsp(message_id: u16) -> ServiceResponse {
    let command = InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, uids::VERIFICATION),
        ),
        DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(U16, [C_ECHO_RQ | RSP]),
        ),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            dicom_value!(U16, [message_id]),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [DATA_SET_MISSING]),
        ),
        DataElement::new(
            tags::STATUS,
            VR::US,
            dicom_value!(U16, [Status::Success.code()]),
        ),
    ]);
    ServiceResponse {
        status: Status::Success,
        command,
        data: None,
    }
}

pub(crate) fn store_rsp(
    message_id: u16,
    sop_class_uid: &str,
    sop_instance_uid: &str,
    status: Status,
) -> ServiceResponse {
    let command = InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, sop_class_uid),
        ),
        DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(U16, [C_STORE_RQ | RSP]),
        ),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            dicom_value!(U16, [message_id]),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [DATA_SET_MISSING]),
        ),
        DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [status.code()])),
        DataElement::new(
            tags::AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, sop_instance_uid),
        ),
    ]);
    ServiceResponse {
        status,
        command,
        data: None,
    }
}

pub(crate) fn find_rsp(
    request: &FindRequest,
    status: Status,
    data: Option<InMemDicomObject>,
) -> ServiceResponse {
    let data_set_type = if data.is_some() {
        DATA_SET_EXISTS
    } else {
        DATA_SET_MISSING
    };
    let command = InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, request.sop_class_uid.as_str()),
        ),
        DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(U16, [C_FIND_RQ | RSP]),
        ),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            dicom_value!(U16, [request.message_id]),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [data_set_type]),
        ),
        DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [status.code()])),
    ]);
    ServiceResponse {
        status,
        command,
        data,
    }
}

pub(crate) fn move_rsp(
    request: &MoveRequest,
    status: Status,
    counters: SubOpCounters,
) -> ServiceResponse {
    let command = InMemDicomObject::command_from_element_iter([
        DataElement::new(
            tags::AFFECTED_SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, request.sop_class_uid.as_str()),
        ),
        DataElement::new(
            tags::COMMAND_FIELD,
            VR::US,
            dicom_value!(U16, [C_MOVE_RQ | RSP]),
        ),
        DataElement::new(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            VR::US,
            dicom_value!(U16, [request.message_id]),
        ),
        DataElement::new(
            tags::COMMAND_DATA_SET_TYPE,
            VR::US,
            dicom_value!(U16, [DATA_SET_MISSING]),
        ),
        DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [status.code()])),
        DataElement::new(
            NUMBER_OF_REMAINING_SUBOPERATIONS,
            VR::US,
            dicom_value!(U16, [counters.remaining]),
        ),
        DataElement::new(
            NUMBER_OF_COMPLETED_SUBOPERATIONS,
            VR::US,
            dicom_value!(U16, [counters.completed]),
        ),
        DataElement::new(
            NUMBER_OF_FAILED_SUBOPERATIONS,
            VR::US,
            dicom_value!(U16, [counters.failed]),
        ),
        DataElement::new(
            NUMBER_OF_WARNING_SUBOPERATIONS,
            VR::US,
            dicom_value!(U16, [counters.warning]),
        ),
    ]);
    ServiceResponse {
        status,
        command,
        data: None,
    }
}

/// The command field of an assembled command set.
pub(crate) fn command_field_of(command: &InMemDicomObject) -> Result<u16, AssociationError> {
    uint16_of(command, tags::COMMAND_FIELD)
}

/// Whether the command announces a data set to follow.
pub(crate) fn announces_data_set(command: &InMemDicomObject) -> bool {
    command
        .element(tags::COMMAND_DATA_SET_TYPE)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .is_some_and(|value| value != DATA_SET_MISSING)
}

/// A matching-key value read from an identifier for log records.
/// A missing or non-string key reads as empty.
pub(crate) fn search_key(identifier: &InMemDicomObject, tag: Tag) -> String {
    identifier
        .element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|value| {
            value
                .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
                .to_string()
        })
        .unwrap_or_default()
}

fn uint16_of(obj: &InMemDicomObject, tag: Tag) -> Result<u16, AssociationError> {
    obj.element(tag)
        .map_err(|_| AssociationError::MissingTag(tag))?
        .to_int()
        .map_err(|_| AssociationError::InvalidNumber(tag))
}

/// UID and AE values may arrive padded; trim before use.
fn str_of(obj: &InMemDicomObject, tag: Tag) -> Result<String, AssociationError> {
    let value = obj
        .element(tag)
        .map_err(|_| AssociationError::MissingTag(tag))?
        .to_str()
        .map_err(|_| AssociationError::CouldNotRetrieve(tag))?;
    Ok(value
        .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string())
}
